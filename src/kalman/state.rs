// Kinematic state snapshots and per-tick estimates

use nalgebra as na;
use na::{DMatrix, DVector, Point2};
use serde::Serialize;

/// Discrete time step index, one per processed frame
pub type TickIndex = usize;

/// Detected target position in pixel space
pub type Measurement = Point2<f64>;

/// Snapshot of the estimated ball state
///
/// Ordering of the underlying filter vector is `[x, y, vy, vx]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KinematicState {
    /// Horizontal position (px)
    pub x: f64,
    /// Vertical position (px)
    pub y: f64,
    /// Vertical rate (px/tick)
    pub vy: f64,
    /// Horizontal rate (px/tick)
    pub vx: f64,
}

impl KinematicState {
    pub fn new(x: f64, y: f64, vy: f64, vx: f64) -> Self {
        KinematicState { x, y, vy, vx }
    }

    pub(crate) fn from_vector(v: &DVector<f64>) -> Self {
        KinematicState {
            x: v[0],
            y: v[1],
            vy: v[2],
            vx: v[3],
        }
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// Stored estimate for one tick
#[derive(Debug, Clone)]
pub struct Estimate {
    pub state: DVector<f64>,
    pub covariance: DMatrix<f64>,
    /// False when the measurement update was skipped and this is the a-priori estimate
    pub corrected: bool,
}

impl Estimate {
    pub fn snapshot(&self) -> KinematicState {
        KinematicState::from_vector(&self.state)
    }
}
