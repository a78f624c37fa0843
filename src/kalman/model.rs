// Linear dynamics model for the ball
//
// x[k+1] = A·x[k] + B·u + G·w,   w ~ N(0, Q)
// z[k]   = C·x[k] + D·u + H·v,   v ~ N(0, R)

use nalgebra as na;
use na::{DMatrix, DVector};

use crate::constants;
use crate::error::{TrackerError, TrackerResult};

/// Number of state components: [x, y, vy, vx]
pub const STATE_DIM: usize = 4;
/// Number of observed components: [x, y]
pub const OBS_DIM: usize = 2;
/// Number of control inputs
pub const CONTROL_DIM: usize = 1;

/// Fixed system matrices for one session
///
/// Shapes are not enforced by the type; [`DynamicsModel::validate`] checks them
/// and the estimator refuses to start on a mismatch.
#[derive(Debug, Clone)]
pub struct DynamicsModel {
    /// State transition (4x4)
    pub a: DMatrix<f64>,
    /// Control (4x1)
    pub b: DMatrix<f64>,
    /// Observation (2x4)
    pub c: DMatrix<f64>,
    /// Feedthrough (2x1)
    pub d: DMatrix<f64>,
    /// Process noise input (4x4)
    pub g: DMatrix<f64>,
    /// Measurement noise input (2x2)
    pub h: DMatrix<f64>,
    /// Process noise covariance (4x4, diagonal)
    pub q: DMatrix<f64>,
    /// Measurement noise covariance (2x2, diagonal)
    pub r: DMatrix<f64>,
}

/// Rig model with `D = 0`, `G = I` and `H = I`; the rig's tuned noise
/// inputs (`G = diag(0.2, 0.2, 0.1, 0.1)`, `H = [[0.1, 0.1], [0.2, 0.2]]`)
/// can be restored through a model file.
impl Default for DynamicsModel {
    fn default() -> Self {
        DynamicsModel {
            a: DMatrix::from_row_slice(STATE_DIM, STATE_DIM, &constants::TRANSITION),
            b: DMatrix::from_row_slice(STATE_DIM, CONTROL_DIM, &constants::CONTROL),
            c: DMatrix::from_row_slice(OBS_DIM, STATE_DIM, &constants::OBSERVATION),
            d: DMatrix::zeros(OBS_DIM, CONTROL_DIM),
            g: DMatrix::identity(STATE_DIM, STATE_DIM),
            h: DMatrix::identity(OBS_DIM, OBS_DIM),
            q: DMatrix::from_diagonal(&DVector::from_row_slice(&constants::PROCESS_NOISE)),
            r: DMatrix::from_diagonal(&DVector::from_row_slice(&constants::MEASUREMENT_NOISE)),
        }
    }
}

impl DynamicsModel {
    /// Check every matrix against the 4-state / 2-observation / 1-control layout
    pub fn validate(&self) -> TrackerResult<()> {
        expect_shape("transition matrix A", &self.a, (STATE_DIM, STATE_DIM))?;
        expect_shape("control matrix B", &self.b, (STATE_DIM, CONTROL_DIM))?;
        expect_shape("observation matrix C", &self.c, (OBS_DIM, STATE_DIM))?;
        expect_shape("feedthrough matrix D", &self.d, (OBS_DIM, CONTROL_DIM))?;
        expect_shape("process noise input G", &self.g, (STATE_DIM, STATE_DIM))?;
        expect_shape("measurement noise input H", &self.h, (OBS_DIM, OBS_DIM))?;
        expect_shape("process noise Q", &self.q, (STATE_DIM, STATE_DIM))?;
        expect_shape("measurement noise R", &self.r, (OBS_DIM, OBS_DIM))?;

        expect_diagonal_psd("process noise Q", &self.q)?;
        expect_diagonal_psd("measurement noise R", &self.r)?;
        Ok(())
    }

    /// G·Q·Gᵗ
    pub fn process_noise(&self) -> DMatrix<f64> {
        &self.g * &self.q * self.g.transpose()
    }

    /// H·R·Hᵗ
    pub fn measurement_noise(&self) -> DMatrix<f64> {
        &self.h * &self.r * self.h.transpose()
    }

    /// A·x + B·u
    pub fn transition(&self, state: &DVector<f64>, input: &DVector<f64>) -> DVector<f64> {
        &self.a * state + &self.b * input
    }

    /// C·x + D·u
    pub fn observe(&self, state: &DVector<f64>, input: &DVector<f64>) -> DVector<f64> {
        &self.c * state + &self.d * input
    }
}

/// Fail with `DimensionMismatch` unless `m` is `expected` rows x cols
pub(crate) fn expect_shape(
    what: &'static str,
    m: &DMatrix<f64>,
    expected: (usize, usize),
) -> TrackerResult<()> {
    let actual = m.shape();
    if actual != expected {
        return Err(TrackerError::DimensionMismatch { what, expected, actual });
    }
    Ok(())
}

fn expect_diagonal_psd(what: &'static str, m: &DMatrix<f64>) -> TrackerResult<()> {
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            let v = m[(i, j)];
            if !v.is_finite() {
                return Err(TrackerError::InvalidConfig(format!("{} has a non-finite entry", what)));
            }
            if i != j && v != 0.0 {
                return Err(TrackerError::InvalidConfig(format!("{} must be diagonal", what)));
            }
            if i == j && v < 0.0 {
                return Err(TrackerError::InvalidConfig(format!(
                    "{} has a negative variance at ({}, {})",
                    what, i, i
                )));
            }
        }
    }
    Ok(())
}
