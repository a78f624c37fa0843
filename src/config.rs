use std::path::Path;
use std::time::Duration;

use clap::Parser;
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use crate::constants;
use crate::error::{TrackerError, TrackerResult};
use crate::kalman::Measurement;
use crate::tracker::SessionSettings;

/// Ball interception tracker configuration
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// JSON-lines file with one vision frontend record per frame.
    #[arg(long, value_name = "FILE")]
    pub frames: String,

    /// JSON file overriding the dynamics model and filter start values.
    #[arg(long, value_name = "FILE")]
    pub model: Option<String>,

    /// Height of the interception line in pixels.
    #[arg(long, default_value_t = constants::REFERENCE_HEIGHT)]
    pub reference_height: f64,

    /// Height that calibration lines are intersected with, in pixels.
    #[arg(long, default_value_t = constants::BOUNDARY_HEIGHT)]
    pub boundary_height: f64,

    /// Leftmost reachable actuator position.
    #[arg(long, default_value_t = constants::ACTUATOR_MIN, allow_hyphen_values = true)]
    pub min_position: f64,

    /// Rightmost reachable actuator position.
    #[arg(long, default_value_t = constants::ACTUATOR_MAX, allow_hyphen_values = true)]
    pub max_position: f64,

    /// Number of ticks to forecast when looking for a crossing.
    #[arg(long, default_value_t = constants::PREDICTION_HORIZON)]
    pub horizon: usize,

    /// Line segments shorter than this are ignored during calibration.
    #[arg(long, default_value_t = constants::MIN_SEGMENT_LENGTH)]
    pub min_segment_length: f64,

    /// Maximum distance between an intercept and its boundary cluster.
    #[arg(long, default_value_t = constants::CLUSTER_THRESHOLD)]
    pub cluster_threshold: f64,

    /// Tick period in milliseconds.
    #[arg(long, default_value_t = constants::TICK_MS)]
    pub tick_ms: u64,

    /// Pace the replay on the tick clock instead of running as fast as possible.
    #[arg(long, default_value_t = false)]
    pub realtime: bool,

    /// Write actuator commands and calibrations in CSV format to a local file.
    #[arg(long, value_name = "FILE")]
    pub write_csv: Vec<String>,

    /// Write every tick report and calibration as JSON lines to a local file.
    #[arg(long, value_name = "FILE")]
    pub write_json: Vec<String>,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Session settings from the defaults, the model file and the command line
    pub fn session_settings(&self) -> TrackerResult<SessionSettings> {
        let mut settings = SessionSettings::default();
        if let Some(path) = &self.model {
            ModelFile::load(path)?.apply(&mut settings)?;
        }
        settings.reference_height = self.reference_height;
        settings.boundary_height = self.boundary_height;
        settings.actuator_min = self.min_position;
        settings.actuator_max = self.max_position;
        settings.horizon = self.horizon;
        settings.min_segment_length = self.min_segment_length;
        settings.cluster_threshold = self.cluster_threshold;
        Ok(settings)
    }

    pub fn tick_period(&self) -> TrackerResult<Duration> {
        if self.tick_ms == 0 {
            return Err(TrackerError::InvalidConfig("tick period must be at least 1 ms".to_string()));
        }
        Ok(Duration::from_millis(self.tick_ms))
    }
}

type Rows = Vec<Vec<f64>>;

/// Model override file, matrices given row-major
///
/// ```json
/// { "transition": [[1,0,0,0.1677],[0,1,0.1677,0],[0,0,1,0],[0,0,0,1]],
///   "measurement_noise": [[10,0],[0,10]],
///   "control_input": [-4] }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelFile {
    pub transition: Option<Rows>,
    pub control: Option<Rows>,
    pub observation: Option<Rows>,
    pub feedthrough: Option<Rows>,
    pub process_noise_input: Option<Rows>,
    pub measurement_noise_input: Option<Rows>,
    pub process_noise: Option<Rows>,
    pub measurement_noise: Option<Rows>,
    pub initial_covariance: Option<Rows>,
    pub initial_state: Option<Vec<f64>>,
    pub control_input: Option<Vec<f64>>,
    pub initial_measurement: Option<[f64; 2]>,
}

impl ModelFile {
    pub fn load<P: AsRef<Path>>(path: P) -> TrackerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> TrackerResult<Self> {
        serde_json::from_str(contents).map_err(|source| TrackerError::Parse {
            line: source.line(),
            source,
        })
    }

    /// Replace the matching parts of `settings`; shapes are checked when the
    /// estimator is initialized
    pub fn apply(self, settings: &mut SessionSettings) -> TrackerResult<()> {
        let model = &mut settings.model;
        let matrices = [
            ("transition", self.transition, &mut model.a),
            ("control", self.control, &mut model.b),
            ("observation", self.observation, &mut model.c),
            ("feedthrough", self.feedthrough, &mut model.d),
            ("process_noise_input", self.process_noise_input, &mut model.g),
            ("measurement_noise_input", self.measurement_noise_input, &mut model.h),
            ("process_noise", self.process_noise, &mut model.q),
            ("measurement_noise", self.measurement_noise, &mut model.r),
            ("initial_covariance", self.initial_covariance, &mut settings.initial_covariance),
        ];
        for (what, rows, target) in matrices {
            if let Some(rows) = rows {
                *target = rows_to_matrix(what, &rows)?;
            }
        }

        if let Some(v) = self.initial_state {
            settings.initial_state = DVector::from_vec(v);
        }
        if let Some(v) = self.control_input {
            settings.control_input = DVector::from_vec(v);
        }
        if let Some([x, y]) = self.initial_measurement {
            settings.initial_measurement = Measurement::new(x, y);
        }
        Ok(())
    }
}

fn rows_to_matrix(what: &str, rows: &[Vec<f64>]) -> TrackerResult<DMatrix<f64>> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, |r| r.len());
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(TrackerError::InvalidConfig(format!("{} has rows of different lengths", what)));
    }
    Ok(DMatrix::from_row_iterator(nrows, ncols, rows.iter().flatten().copied()))
}
