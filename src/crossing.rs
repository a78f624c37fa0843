// Reference-line crossing detection and actuator command generation

use serde::Serialize;
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};
use crate::kalman::{Estimator, KinematicState, TickIndex};
use crate::predictor::{rollout, PredictedState};

/// Horizontal span the actuator can reach
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActuatorRange {
    pub min: f64,
    pub max: f64,
}

impl ActuatorRange {
    pub fn new(min: f64, max: f64) -> TrackerResult<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(TrackerError::InvalidConfig(format!(
                "actuator range [{}, {}] is not finite",
                min, max
            )));
        }
        if min > max {
            return Err(TrackerError::InvalidConfig(format!(
                "actuator range minimum {} exceeds maximum {}",
                min, max
            )));
        }
        Ok(ActuatorRange { min, max })
    }

    /// Saturate `value` into [min, max]
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.min {
            return self.min;
        }
        if value > self.max {
            return self.max;
        }
        value
    }
}

/// Where and when the ball is predicted to meet the reference line
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActuatorCommand {
    /// Tick at which the crossing is predicted
    pub tick: TickIndex,
    /// Clamped horizontal target for the actuator
    pub position: f64,
    /// Predicted horizontal coordinate before clamping
    pub raw_position: f64,
    /// Midpoint of the bracketing vertical samples, for drawing only
    pub marker_y: f64,
}

/// A predicted downward pass through the reference line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingEvent {
    pub tick: TickIndex,
    pub x: f64,
    pub y_before: f64,
    pub y_after: f64,
}

impl CrossingEvent {
    pub fn marker_y(&self) -> f64 {
        (self.y_before + self.y_after) / 2.0
    }
}

/// Iterator over every crossing in a predicted sequence
#[derive(Debug, Clone)]
pub struct Crossings<I> {
    reference: f64,
    prev_y: f64,
    samples: I,
}

/// Walk `samples` starting from `origin_y` and yield each strict
/// was-above / now-at-or-below transition through `reference`
pub fn crossings<I>(reference: f64, origin_y: f64, samples: I) -> Crossings<I::IntoIter>
where
    I: IntoIterator<Item = PredictedState>,
{
    Crossings {
        reference,
        prev_y: origin_y,
        samples: samples.into_iter(),
    }
}

impl<I> Iterator for Crossings<I>
where
    I: Iterator<Item = PredictedState>,
{
    type Item = CrossingEvent;

    fn next(&mut self) -> Option<Self::Item> {
        for p in self.samples.by_ref() {
            let prev = std::mem::replace(&mut self.prev_y, p.state.y);
            if prev > self.reference && p.state.y <= self.reference {
                return Some(CrossingEvent {
                    tick: p.tick,
                    x: p.state.x,
                    y_before: prev,
                    y_after: p.state.y,
                });
            }
        }
        None
    }
}

/// Turns a forecast into at most one actuator command per rollout
#[derive(Debug, Clone)]
pub struct CrossingDetector {
    pub reference_height: f64,
    pub range: ActuatorRange,
}

impl CrossingDetector {
    pub fn new(reference_height: f64, range: ActuatorRange) -> Self {
        CrossingDetector { reference_height, range }
    }

    /// First crossing after `origin`, later ones in the same sequence are ignored
    pub fn first_crossing<I>(&self, origin: &KinematicState, samples: I) -> Option<CrossingEvent>
    where
        I: IntoIterator<Item = PredictedState>,
    {
        crossings(self.reference_height, origin.y, samples).next()
    }

    pub fn command(&self, event: &CrossingEvent) -> ActuatorCommand {
        ActuatorCommand {
            tick: event.tick,
            position: self.range.clamp(event.x),
            raw_position: event.x,
            marker_y: event.marker_y(),
        }
    }

    /// Roll the estimator forward `horizon` ticks and command the actuator to
    /// the first predicted crossing, if any
    pub fn detect(&self, estimator: &Estimator, horizon: usize) -> Option<ActuatorCommand> {
        let forecast = rollout(estimator, horizon);
        let origin = forecast.origin();
        let event = self.first_crossing(&origin.state, forecast)?;
        let command = self.command(&event);
        debug!(
            "tick {}: crossing predicted at tick {} x={:.1} -> {:.1}",
            origin.tick, command.tick, command.raw_position, command.position
        );
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(ys: &[f64]) -> Vec<PredictedState> {
        ys.iter()
            .enumerate()
            .map(|(i, &y)| PredictedState {
                tick: i + 1,
                state: KinematicState::new(100.0 + 10.0 * i as f64, y, 0.0, 0.0),
            })
            .collect()
    }

    fn detector() -> CrossingDetector {
        CrossingDetector::new(100.0, ActuatorRange::new(90.0, 540.0).unwrap())
    }

    #[test]
    fn test_single_crossing_between_first_and_second() {
        // Sequence [120, 80, 40]: the first value is the current estimate
        let origin = KinematicState::new(0.0, 120.0, 0.0, 0.0);
        let found: Vec<CrossingEvent> = crossings(100.0, origin.y, samples(&[80.0, 40.0])).collect();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tick, 1);
        assert_eq!(found[0].y_before, 120.0);
        assert_eq!(found[0].y_after, 80.0);
        assert_eq!(found[0].marker_y(), 100.0);
    }

    #[test]
    fn test_no_crossing_below_reference() {
        let origin = KinematicState::new(0.0, 50.0, 0.0, 0.0);
        assert!(detector().first_crossing(&origin, samples(&[40.0, 30.0])).is_none());
    }

    #[test]
    fn test_landing_exactly_on_line_counts() {
        let origin = KinematicState::new(0.0, 101.0, 0.0, 0.0);
        let event = detector().first_crossing(&origin, samples(&[100.0])).unwrap();
        assert_eq!(event.tick, 1);
    }

    #[test]
    fn test_starting_on_line_does_not_count() {
        let origin = KinematicState::new(0.0, 100.0, 0.0, 0.0);
        assert!(detector().first_crossing(&origin, samples(&[90.0, 80.0])).is_none());
    }

    #[test]
    fn test_upward_pass_ignored() {
        let origin = KinematicState::new(0.0, 60.0, 0.0, 0.0);
        assert!(detector().first_crossing(&origin, samples(&[90.0, 130.0])).is_none());
    }

    #[test]
    fn test_only_first_crossing_commands() {
        let origin = KinematicState::new(0.0, 120.0, 0.0, 0.0);
        let seq = samples(&[80.0, 120.0, 80.0]);
        assert_eq!(crossings(100.0, origin.y, seq.clone()).count(), 2);

        let event = detector().first_crossing(&origin, seq).unwrap();
        assert_eq!(event.tick, 1);
    }

    #[test]
    fn test_command_clamps_position() {
        let d = detector();
        let event = CrossingEvent { tick: 7, x: 20.0, y_before: 110.0, y_after: 90.0 };
        let cmd = d.command(&event);
        assert_eq!(cmd.tick, 7);
        assert_eq!(cmd.position, 90.0);
        assert_eq!(cmd.raw_position, 20.0);
        assert_eq!(cmd.marker_y, 100.0);

        let event = CrossingEvent { x: 1000.0, ..event };
        assert_eq!(d.command(&event).position, 540.0);
    }

    #[test]
    fn test_clamp_idempotent_and_bounded() {
        let range = ActuatorRange::new(90.0, 540.0).unwrap();
        let values = [
            f64::NEG_INFINITY, -1e9, -1.0, 0.0, 89.999, 90.0, 300.0, 540.0, 540.001, 1e12, f64::INFINITY,
        ];
        for v in values {
            let c = range.clamp(v);
            assert_eq!(range.clamp(c), c);
            assert!(c >= range.min && c <= range.max);
        }
        assert_eq!(range.clamp(300.0), 300.0);
    }

    #[test]
    fn test_invalid_range() {
        assert!(ActuatorRange::new(10.0, 5.0).is_err());
        assert!(ActuatorRange::new(f64::NAN, 5.0).is_err());
        assert!(ActuatorRange::new(5.0, 5.0).is_ok());
    }
}
