
pub mod constants;
pub mod error;
pub mod kalman;
pub mod predictor;
pub mod crossing;
pub mod boundary;
pub mod tracker;
pub mod input;
pub mod output;
pub mod config;
