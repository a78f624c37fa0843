// Default session constants for the ball/cart rig
// Pixel coordinates, one tick per processed camera frame

/// Nominal tick period (ms).
pub const TICK_MS: u64 = 16;

/// Height of the line the cart intercepts the ball on (px).
pub const REFERENCE_HEIGHT: f64 = 50.0;

/// Height the calibration lines are intersected with (frame rows - REFERENCE_HEIGHT on a 480 row camera).
pub const BOUNDARY_HEIGHT: f64 = 430.0;

/// Leftmost cart position reachable by the actuator (px).
pub const ACTUATOR_MIN: f64 = 90.0;

/// Rightmost cart position reachable by the actuator (px).
pub const ACTUATOR_MAX: f64 = 540.0;

/// Number of ticks rolled out when looking for a crossing (~1.6 s).
pub const PREDICTION_HORIZON: usize = 100;

/// Segments shorter than this are treated as edge noise (px).
pub const MIN_SEGMENT_LENGTH: f64 = 30.0;

/// Maximum gap between an intercept and its cluster representative (px).
pub const CLUSTER_THRESHOLD: f64 = 10.0;

// --- Dynamics model (row-major) ---

/// State transition, state is [x, y, vy, vx].
pub const TRANSITION: [f64; 16] = [
    1.0, 0.0, 0.0, 0.1677,
    0.0, 1.0, 0.1677, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Control input matrix; gravity enters through y and vy.
pub const CONTROL: [f64; 4] = [0.0, 0.0001406, 4.0 * 0.1677, 0.0];

/// Observation matrix, the camera sees x and y.
pub const OBSERVATION: [f64; 8] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
];

/// Process noise variances (diagonal).
pub const PROCESS_NOISE: [f64; 4] = [0.2, 0.2, 1.0, 1.0];

/// Measurement noise variances (diagonal).
pub const MEASUREMENT_NOISE: [f64; 2] = [10.0, 10.0];

/// Constant control input (gravity-like acceleration).
pub const CONTROL_INPUT: f64 = -4.0;

/// A-priori error covariance used to start the filter.
pub const INITIAL_COVARIANCE: [f64; 16] = [
    1.0, 0.0, 2.0, 0.0,
    0.0, 1.0, 0.0, 2.0,
    2.0, 0.0, 1.0, 0.0,
    0.0, 2.0, 0.0, 1.0,
];

/// A-priori state used to start the filter.
pub const INITIAL_STATE: [f64; 4] = [300.0, 200.0, 0.0, 0.0];

/// Measurement fused at tick 0.
pub const INITIAL_MEASUREMENT: [f64; 2] = [300.0, 200.0];
