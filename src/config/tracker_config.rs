use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::core::beacon::constants::{DEFAULT_PRUNE_TICK_MS, DEFAULT_SMOOTHING_FACTOR, DEFAULT_STALENESS_WINDOW_MS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Weight of a new distance sample in the moving average, in (0, 1].
    /// Smaller values smooth harder but react slower.
    pub smoothing_factor: f64,

    /// How long a beacon stays tracked after its last observation, in milliseconds.
    pub staleness_window_ms: u64,

    /// Interval of the prune pass run when no batches arrive, in milliseconds.
    pub prune_tick_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            staleness_window_ms: DEFAULT_STALENESS_WINDOW_MS,
            prune_tick_ms: DEFAULT_PRUNE_TICK_MS,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(ConfigError::InvalidSmoothingFactor(self.smoothing_factor));
        }
        if self.staleness_window_ms == 0 {
            return Err(ConfigError::NonPositive("staleness_window_ms"));
        }
        self.staleness_window()?;
        if self.prune_tick_ms == 0 {
            return Err(ConfigError::NonPositive("prune_tick_ms"));
        }
        Ok(())
    }

    /// The staleness window as a signed duration
    pub fn staleness_window(&self) -> Result<TimeDelta, ConfigError> {
        i64::try_from(self.staleness_window_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .ok_or(ConfigError::TooLarge("staleness_window_ms"))
    }
}
