// Linear Kalman filter over the ball state with a constant gravity input
//
// One Estimator owns the working estimate and the per-tick history. Ticks at
// or before the current one are read back from history; later ticks are
// computed on demand by pure prediction without touching storage.

use nalgebra as na;
use na::{DMatrix, DVector};
use tracing::{debug, warn};

use super::model::{expect_shape, DynamicsModel, CONTROL_DIM, STATE_DIM};
use super::state::{Estimate, KinematicState, Measurement, TickIndex};
use crate::error::{TrackerError, TrackerResult};

/// Kalman filter state for the tracked ball
#[derive(Debug, Clone)]
pub struct Estimator {
    model: DynamicsModel,
    input: DVector<f64>,
    // Working estimate: a-priori after predict_step, a-posteriori after update_step
    state: DVector<f64>,
    cov: DMatrix<f64>,
    // Append-only, index is the tick
    history: Vec<Estimate>,
}

impl Estimator {
    /// Validate the model, then fuse `initial_measurement` into the a-priori
    /// initial state; the result is the estimate for tick 0.
    pub fn initialize(
        model: DynamicsModel,
        initial_covariance: DMatrix<f64>,
        initial_state: DVector<f64>,
        control_input: DVector<f64>,
        initial_measurement: Measurement,
    ) -> TrackerResult<Self> {
        model.validate()?;
        expect_shape("initial covariance", &initial_covariance, (STATE_DIM, STATE_DIM))?;
        expect_len("initial state", &initial_state, STATE_DIM)?;
        expect_len("control input", &control_input, CONTROL_DIM)?;

        let mut estimator = Estimator {
            model,
            input: control_input,
            state: initial_state,
            cov: initial_covariance,
            history: Vec::new(),
        };

        let corrected = match estimator.update_step(&initial_measurement) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}; starting from the a-priori estimate", e);
                false
            }
        };
        estimator.commit(corrected);

        Ok(estimator)
    }

    /// Advance the working estimate by one tick without a measurement
    ///
    /// state' = A·state + B·u
    /// P'     = A·P·Aᵗ + G·Q·Gᵗ
    pub fn predict_step(&mut self) {
        self.state = self.model.transition(&self.state, &self.input);
        self.cov = &self.model.a * &self.cov * self.model.a.transpose() + self.model.process_noise();
    }

    /// Correct the working estimate with a measurement
    ///
    /// K = P·Cᵗ·(C·P·Cᵗ + R)⁻¹
    /// state = state + K·(z − C·state − D·u)
    /// P = (I − K·C)·P·(I − K·C)ᵗ + K·R·Kᵗ   (Joseph form)
    ///
    /// On a singular innovation covariance the working estimate is left as is.
    pub fn update_step(&mut self, measurement: &Measurement) -> TrackerResult<()> {
        let c = &self.model.c;
        let r = self.model.measurement_noise();

        let innovation_cov = c * &self.cov * c.transpose() + &r;
        let innovation_cov_inv = innovation_cov
            .try_inverse()
            .ok_or(TrackerError::SingularInnovationCovariance { tick: self.history.len() })?;

        let gain = &self.cov * c.transpose() * innovation_cov_inv;

        let z = DVector::from_vec(vec![measurement.x, measurement.y]);
        let innovation = z - self.model.observe(&self.state, &self.input);
        debug!(
            "tick {}: innovation ({:.2}, {:.2})",
            self.history.len(),
            innovation[0],
            innovation[1]
        );

        self.state += &gain * innovation;

        let i_kc = DMatrix::<f64>::identity(STATE_DIM, STATE_DIM) - &gain * c;
        self.cov = &i_kc * &self.cov * i_kc.transpose() + &gain * r * gain.transpose();

        Ok(())
    }

    /// Predict, correct with `measurement` and record the result as the next tick
    ///
    /// A singular innovation covariance is logged and the a-priori estimate is
    /// recorded for the tick instead.
    pub fn add_output(&mut self, measurement: &Measurement) -> KinematicState {
        self.rewind();
        self.predict_step();
        let corrected = match self.update_step(measurement) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}; keeping the a-priori estimate", e);
                false
            }
        };
        self.commit(corrected)
    }

    /// Record a predict-only tick (target not observable this frame)
    pub fn coast(&mut self) -> KinematicState {
        self.rewind();
        self.predict_step();
        self.commit(false)
    }

    /// Estimated state at `tick`
    ///
    /// Past and current ticks come from history. Later ticks are rolled
    /// forward from the current a-posteriori state with no measurement update.
    pub fn state_at(&self, tick: TickIndex) -> KinematicState {
        let current = self.current_tick();
        if tick <= current {
            return self.history[tick].snapshot();
        }

        let mut state = self.latest().state.clone();
        for _ in current..tick {
            state = self.transition(&state);
        }
        KinematicState::from_vector(&state)
    }

    pub fn current_tick(&self) -> TickIndex {
        self.history.len() - 1
    }

    /// Stored estimate for a past or current tick
    pub fn estimate(&self, tick: TickIndex) -> Option<&Estimate> {
        self.history.get(tick)
    }

    /// Estimate for the current tick
    pub fn latest(&self) -> &Estimate {
        &self.history[self.history.len() - 1]
    }

    pub fn model(&self) -> &DynamicsModel {
        &self.model
    }

    pub fn control_input(&self) -> &DVector<f64> {
        &self.input
    }

    /// One application of the transition equation
    pub(crate) fn transition(&self, state: &DVector<f64>) -> DVector<f64> {
        self.model.transition(state, &self.input)
    }

    /// Restart the working estimate from the last recorded tick
    fn rewind(&mut self) {
        if let Some(last) = self.history.last() {
            self.state = last.state.clone();
            self.cov = last.covariance.clone();
        }
    }

    fn commit(&mut self, corrected: bool) -> KinematicState {
        let estimate = Estimate {
            state: self.state.clone(),
            covariance: self.cov.clone(),
            corrected,
        };
        let snapshot = estimate.snapshot();
        self.history.push(estimate);
        snapshot
    }
}

fn expect_len(what: &'static str, v: &DVector<f64>, expected: usize) -> TrackerResult<()> {
    if v.len() != expected {
        return Err(TrackerError::DimensionMismatch {
            what,
            expected: (expected, 1),
            actual: (v.len(), 1),
        });
    }
    Ok(())
}
