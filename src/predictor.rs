// Open-loop trajectory rollout from the current estimate
//
// A rollout repeatedly applies the transition equation to the current
// a-posteriori state. It borrows the estimator immutably, so it can never
// alter history, and calling `rollout` again restarts from the same state.

use nalgebra::DVector;

use crate::kalman::{Estimator, KinematicState, TickIndex};

/// One forecast sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedState {
    pub tick: TickIndex,
    pub state: KinematicState,
}

/// Lazy sequence of `stateAt(current+1) ..= stateAt(current+horizon)`
#[derive(Debug, Clone)]
pub struct Rollout<'a> {
    estimator: &'a Estimator,
    state: DVector<f64>,
    tick: TickIndex,
    remaining: usize,
}

/// Forecast `horizon` ticks ahead of the estimator's current tick
pub fn rollout(estimator: &Estimator, horizon: usize) -> Rollout<'_> {
    Rollout {
        estimator,
        state: estimator.latest().state.clone(),
        tick: estimator.current_tick(),
        remaining: horizon,
    }
}

impl<'a> Rollout<'a> {
    /// The state the rollout starts from (not part of the sequence)
    pub fn origin(&self) -> PredictedState {
        PredictedState {
            tick: self.estimator.current_tick(),
            state: self.estimator.latest().snapshot(),
        }
    }
}

impl<'a> Iterator for Rollout<'a> {
    type Item = PredictedState;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.state = self.estimator.transition(&self.state);
        self.tick += 1;
        Some(PredictedState {
            tick: self.tick,
            state: KinematicState::from_vector(&self.state),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> ExactSizeIterator for Rollout<'a> {}
