// Error types for estimator setup, per-tick updates and session I/O

use std::io;
use thiserror::Error;

use crate::kalman::TickIndex;

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Errors raised by the estimator, the session plumbing and its inputs
#[derive(Error, Debug)]
pub enum TrackerError {
    /// A model matrix or vector does not have the fixed 4-state / 2-observation / 1-control shape
    #[error("Dimension mismatch for {what}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Innovation covariance C·P·Cᵗ + R could not be inverted
    #[error("Singular innovation covariance at tick {tick}")]
    SingularInnovationCovariance { tick: TickIndex },

    /// Session parameters that are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON record (line is 1-based, 0 for whole-file documents)
    #[error("Parse error on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
