use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::core::beacon::constants::{DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_REFERENCE_POWER_AT_1M};
use crate::core::beacon::estimator::DistanceEstimator;

/// Path-loss model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Signal strength measured 1 meter from the beacon (dBm)
    pub reference_power_at_1m: i32,
    /// 2.0 in free space, 2.7 to 4.0 in buildings
    pub path_loss_exponent: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            reference_power_at_1m: DEFAULT_REFERENCE_POWER_AT_1M,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.path_loss_exponent > 0.0) {
            return Err(ConfigError::NonPositive("path_loss_exponent"));
        }
        Ok(())
    }

    pub fn estimator(&self) -> DistanceEstimator {
        DistanceEstimator::new(self.reference_power_at_1m, self.path_loss_exponent)
    }
}
