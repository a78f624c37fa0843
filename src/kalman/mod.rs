// Kalman filter module
// Provides state estimation for the tracked ball

pub mod filter;
pub mod model;
pub mod state;

pub use filter::Estimator;
pub use model::{DynamicsModel, CONTROL_DIM, OBS_DIM, STATE_DIM};
pub use state::{Estimate, KinematicState, Measurement, TickIndex};
