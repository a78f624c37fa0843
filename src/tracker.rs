// Ball tracking session
//
// Owns the estimator, crossing detector and boundary calibrator for one run
// and turns each frame's vision output into a tick report or a calibration.

use nalgebra as na;
use na::{DMatrix, DVector};
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::boundary::{BoundaryCalibrator, LineSegment};
use crate::constants;
use crate::crossing::{ActuatorCommand, ActuatorRange, CrossingDetector};
use crate::error::{TrackerError, TrackerResult};
use crate::kalman::{DynamicsModel, Estimator, KinematicState, Measurement, TickIndex};

/// Everything fixed at session start
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub model: DynamicsModel,
    pub initial_covariance: DMatrix<f64>,
    pub initial_state: DVector<f64>,
    pub control_input: DVector<f64>,
    pub initial_measurement: Measurement,
    /// Height of the interception line (px)
    pub reference_height: f64,
    /// Height calibration lines are intersected with (px)
    pub boundary_height: f64,
    pub actuator_min: f64,
    pub actuator_max: f64,
    /// Rollout length in ticks
    pub horizon: usize,
    pub min_segment_length: f64,
    pub cluster_threshold: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            model: DynamicsModel::default(),
            initial_covariance: DMatrix::from_row_slice(4, 4, &constants::INITIAL_COVARIANCE),
            initial_state: DVector::from_row_slice(&constants::INITIAL_STATE),
            control_input: DVector::from_element(1, constants::CONTROL_INPUT),
            initial_measurement: Measurement::new(
                constants::INITIAL_MEASUREMENT[0],
                constants::INITIAL_MEASUREMENT[1],
            ),
            reference_height: constants::REFERENCE_HEIGHT,
            boundary_height: constants::BOUNDARY_HEIGHT,
            actuator_min: constants::ACTUATOR_MIN,
            actuator_max: constants::ACTUATOR_MAX,
            horizon: constants::PREDICTION_HORIZON,
            min_segment_length: constants::MIN_SEGMENT_LENGTH,
            cluster_threshold: constants::CLUSTER_THRESHOLD,
        }
    }
}

/// What the vision frontend produced for one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Nothing usable in the frame
    Missing,
    /// Frame was usable but the ball is hidden
    Occluded,
    Point(Measurement),
    Lines(Vec<LineSegment>),
}

/// Per-tick branch of the tracking path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickAction {
    /// Skip the tick: no predict, no update, no tick advance
    NoObservation,
    /// Predict, correct and advance
    Update(Measurement),
    /// Predict and advance without correction
    PredictOnly,
}

impl TickAction {
    /// Tracking branch for a frame, `None` for calibration frames
    pub fn select(observation: &Observation) -> Option<TickAction> {
        match observation {
            Observation::Missing => Some(TickAction::NoObservation),
            Observation::Occluded => Some(TickAction::PredictOnly),
            Observation::Point(m) => Some(TickAction::Update(*m)),
            Observation::Lines(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TickAction::NoObservation => "skip",
            TickAction::Update(_) => "update",
            TickAction::PredictOnly => "predict",
        }
    }
}

// Reports carry the branch name only; the measurement is already in the estimate
impl Serialize for TickAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Result of one tracking tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub action: TickAction,
    /// Estimator tick after processing
    pub tick: TickIndex,
    /// Estimate for `tick`; absent when the tick was skipped
    pub estimate: Option<KinematicState>,
    /// False when the stored estimate is a-priori only
    pub corrected: bool,
    pub command: Option<ActuatorCommand>,
}

/// Output of handling one frame
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Tick(TickReport),
    Calibration(Vec<f64>),
}

/// One tracking run
#[derive(Debug, Clone)]
pub struct Session {
    estimator: Estimator,
    detector: CrossingDetector,
    calibrator: BoundaryCalibrator,
    horizon: usize,
    boundaries: Option<Vec<f64>>,
}

impl Session {
    /// Build all components; any shape or range problem aborts the start
    pub fn start(settings: SessionSettings) -> TrackerResult<Self> {
        if !settings.reference_height.is_finite() {
            return Err(TrackerError::InvalidConfig("reference height must be finite".to_string()));
        }
        let range = ActuatorRange::new(settings.actuator_min, settings.actuator_max)?;
        let calibrator = BoundaryCalibrator::new(
            settings.boundary_height,
            settings.min_segment_length,
            settings.cluster_threshold,
        )?;
        let estimator = Estimator::initialize(
            settings.model,
            settings.initial_covariance,
            settings.initial_state,
            settings.control_input,
            settings.initial_measurement,
        )?;

        info!(
            "Session started: reference height {}, actuator range [{}, {}], horizon {} ticks",
            settings.reference_height, range.min, range.max, settings.horizon
        );
        info!(
            "Calibration: boundary height {}, min segment {}, cluster threshold {}",
            calibrator.reference_height, calibrator.min_segment_length, calibrator.cluster_threshold
        );

        Ok(Session {
            estimator,
            detector: CrossingDetector::new(settings.reference_height, range),
            calibrator,
            horizon: settings.horizon,
            boundaries: None,
        })
    }

    /// Dispatch one frame to the tracking or the calibration path
    pub fn handle(&mut self, observation: Observation) -> SessionEvent {
        if let Observation::Lines(segments) = &observation {
            return match self.calibrate(segments) {
                Some(boundaries) => SessionEvent::Calibration(boundaries),
                None => SessionEvent::Tick(self.step(TickAction::NoObservation)),
            };
        }
        let action = TickAction::select(&observation).unwrap_or(TickAction::NoObservation);
        SessionEvent::Tick(self.step(action))
    }

    /// Run one tracking tick
    pub fn step(&mut self, action: TickAction) -> TickReport {
        let estimate = match action {
            TickAction::NoObservation => {
                debug!("tick {}: no observation, skipped", self.estimator.current_tick());
                return TickReport {
                    action,
                    tick: self.estimator.current_tick(),
                    estimate: None,
                    corrected: false,
                    command: None,
                };
            }
            TickAction::Update(m) => self.estimator.add_output(&m),
            TickAction::PredictOnly => self.estimator.coast(),
        };

        let command = self.detector.detect(&self.estimator, self.horizon);
        TickReport {
            action,
            tick: self.estimator.current_tick(),
            estimate: Some(estimate),
            corrected: self.estimator.latest().corrected,
            command,
        }
    }

    /// Boundary positions for one frame of line segments
    ///
    /// A frame without a usable segment leaves the previous result in place
    /// and gives `None`.
    pub fn calibrate(&mut self, segments: &[LineSegment]) -> Option<Vec<f64>> {
        let boundaries = self.calibrator.calibrate(segments);
        if boundaries.is_empty() {
            debug!("calibration: no usable segments in {}, keeping previous boundaries", segments.len());
            return None;
        }
        self.boundaries = Some(boundaries.clone());
        Some(boundaries)
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn detector(&self) -> &CrossingDetector {
        &self.detector
    }

    /// Result of the most recent calibration pass
    pub fn boundaries(&self) -> Option<&[f64]> {
        self.boundaries.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn settings_at(x: f64, y: f64) -> SessionSettings {
        SessionSettings {
            initial_state: DVector::from_vec(vec![x, y, 0.0, 0.0]),
            initial_measurement: Measurement::new(x, y),
            ..SessionSettings::default()
        }
    }

    #[test]
    fn test_start_with_defaults() {
        let session = Session::start(SessionSettings::default()).unwrap();
        assert_eq!(session.estimator().current_tick(), 0);
        assert!(session.boundaries().is_none());
    }

    #[test]
    fn test_start_rejects_bad_model() {
        let mut settings = SessionSettings::default();
        settings.model.a = DMatrix::identity(3, 3);
        assert!(matches!(
            Session::start(settings),
            Err(TrackerError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_start_rejects_inverted_range() {
        let settings = SessionSettings {
            actuator_min: 600.0,
            actuator_max: 100.0,
            ..SessionSettings::default()
        };
        assert!(matches!(Session::start(settings), Err(TrackerError::InvalidConfig(_))));
    }

    #[test]
    fn test_action_selection() {
        let m = Measurement::new(1.0, 2.0);
        assert_eq!(TickAction::select(&Observation::Missing), Some(TickAction::NoObservation));
        assert_eq!(TickAction::select(&Observation::Occluded), Some(TickAction::PredictOnly));
        assert_eq!(TickAction::select(&Observation::Point(m)), Some(TickAction::Update(m)));
        assert_eq!(TickAction::select(&Observation::Lines(vec![])), None);
    }

    #[test]
    fn test_missing_observation_skips_tick() {
        let mut session = Session::start(SessionSettings::default()).unwrap();
        let before = session.estimator().state_at(0);

        let report = session.step(TickAction::NoObservation);
        assert_eq!(report.action, TickAction::NoObservation);
        assert_eq!(report.tick, 0);
        assert!(report.estimate.is_none());
        assert!(report.command.is_none());
        assert_eq!(session.estimator().current_tick(), 0);
        assert_eq!(session.estimator().state_at(0), before);
    }

    #[test]
    fn test_update_advances_and_commands() {
        let mut session = Session::start(SessionSettings::default()).unwrap();
        let report = session.step(TickAction::Update(Measurement::new(300.0, 200.0)));

        assert!(matches!(report.action, TickAction::Update(_)));
        assert_eq!(report.tick, 1);
        assert!(report.corrected);
        // Ball falls under the gravity input and meets the line within the horizon
        let cmd = report.command.expect("falling ball should cross the reference line");
        assert!(cmd.tick > 1 && cmd.tick <= 1 + constants::PREDICTION_HORIZON);
        assert!(cmd.position >= constants::ACTUATOR_MIN && cmd.position <= constants::ACTUATOR_MAX);
    }

    #[test]
    fn test_predict_only_advances_without_correction() {
        let mut session = Session::start(SessionSettings::default()).unwrap();
        let expected = session.estimator().state_at(1);

        let report = session.step(TickAction::PredictOnly);
        assert_eq!(report.action, TickAction::PredictOnly);
        assert_eq!(report.tick, 1);
        assert!(!report.corrected);
        assert_eq!(report.estimate, Some(expected));
    }

    #[test]
    fn test_command_is_clamped() {
        let mut session = Session::start(settings_at(600.0, 200.0)).unwrap();
        let report = session.step(TickAction::PredictOnly);

        let cmd = report.command.unwrap();
        assert_eq!(cmd.position, constants::ACTUATOR_MAX);
        assert!((cmd.raw_position - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_command_when_already_below_line() {
        let mut session = Session::start(settings_at(300.0, 30.0)).unwrap();
        let report = session.step(TickAction::Update(Measurement::new(300.0, 30.0)));
        assert!(report.command.is_none());
    }

    #[test]
    fn test_lines_frame_calibrates() {
        let mut session = Session::start(SessionSettings::default()).unwrap();
        let segments = vec![
            LineSegment::new(Point2::new(90.0, 100.0), Point2::new(90.0, 400.0)),
            LineSegment::new(Point2::new(540.0, 100.0), Point2::new(540.0, 400.0)),
        ];

        match session.handle(Observation::Lines(segments)) {
            SessionEvent::Calibration(b) => assert_eq!(b, vec![90.0, 540.0]),
            other => panic!("Expected calibration, got {:?}", other),
        }
        assert_eq!(session.boundaries(), Some(&[90.0, 540.0][..]));
        // Calibration does not touch the tracking path
        assert_eq!(session.estimator().current_tick(), 0);
    }

    #[test]
    fn test_empty_lines_frame_keeps_previous_boundaries() {
        let mut session = Session::start(SessionSettings::default()).unwrap();
        let edge = vec![LineSegment::new(Point2::new(90.0, 100.0), Point2::new(90.0, 400.0))];
        assert_eq!(session.calibrate(&edge), Some(vec![90.0]));

        match session.handle(Observation::Lines(vec![])) {
            SessionEvent::Tick(report) => {
                assert_eq!(report.action, TickAction::NoObservation);
                assert_eq!(report.tick, 0);
                assert!(report.estimate.is_none());
            }
            other => panic!("Expected a skipped tick, got {:?}", other),
        }
        assert_eq!(session.boundaries(), Some(&[90.0][..]));

        // Only short and horizontal segments: nothing usable either
        let unusable = vec![
            LineSegment::new(Point2::new(300.0, 0.0), Point2::new(300.0, 10.0)),
            LineSegment::new(Point2::new(0.0, 240.0), Point2::new(640.0, 240.0)),
        ];
        assert_eq!(session.calibrate(&unusable), None);
        assert_eq!(session.boundaries(), Some(&[90.0][..]));
        assert_eq!(session.estimator().current_tick(), 0);
    }

    #[test]
    fn test_report_serializes_action_name() {
        let mut session = Session::start(SessionSettings::default()).unwrap();
        let report = session.step(TickAction::PredictOnly);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["action"], "predict");
    }
}
