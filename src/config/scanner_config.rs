use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::core::bluetooth::constants::DEFAULT_SCAN_CYCLE_MS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Length of one scan cycle in milliseconds. Observations are batched per cycle.
    pub scan_cycle_ms: u64,
    /// Advertisements weaker than this are ignored (dBm). `None` keeps everything.
    pub min_rssi: Option<i16>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            scan_cycle_ms: DEFAULT_SCAN_CYCLE_MS,
            min_rssi: None,
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_cycle_ms == 0 {
            return Err(ConfigError::NonPositive("scan_cycle_ms"));
        }
        Ok(())
    }
}
