//! Constants used by the beacon tracking engine
//! Default tuning values, sentinels and proximity thresholds.

/// Calibrated signal strength at 1 meter, in dBm
pub const DEFAULT_REFERENCE_POWER_AT_1M: i32 = -59;

/// Path-loss exponent for free space
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 2.0;

/// Weight given to a new distance sample in the moving average
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.35;

/// A tracked beacon older than this is dropped, in milliseconds
pub const DEFAULT_STALENESS_WINDOW_MS: u64 = 5000;

/// Interval of the prune tick run when no batches arrive, in milliseconds
pub const DEFAULT_PRUNE_TICK_MS: u64 = 1000;

/// Smallest distance a tracked beacon may be seeded with, in meters
pub const MIN_SMOOTHED_DISTANCE: f64 = 0.01;

/// Returned by the estimator when no distance can be computed
pub const UNKNOWN_DISTANCE: f64 = -1.0;

/// Signal strength value meaning "unavailable"
pub const UNAVAILABLE_SIGNAL_STRENGTH: i32 = 0;

/// Upper bound of the immediate proximity bucket, in meters
pub const IMMEDIATE_THRESHOLD_M: f64 = 0.5;

/// Upper bound of the near proximity bucket, in meters
pub const NEAR_THRESHOLD_M: f64 = 3.0;

/// Capacity of the event channel feeding the ranging worker
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
