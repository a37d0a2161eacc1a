pub mod estimator_config;
pub mod region_config;
pub mod scanner_config;
pub mod tracker_config;

use std::path::Path;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::config::estimator_config::EstimatorConfig;
use crate::config::region_config::{RegionConfig, default_regions};
use crate::config::scanner_config::ScannerConfig;
use crate::config::tracker_config::TrackerConfig;
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "beacon_ranger.json";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Smoothing factor must be in (0, 1], got {0}")]
    InvalidSmoothingFactor(f64),
    #[error("'{0}' must be positive")]
    NonPositive(&'static str),
    #[error("'{0}' is too large")]
    TooLarge(&'static str),
    #[error("Config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            tracker: TrackerConfig::default(),
            estimator: EstimatorConfig::default(),
            scanner: ScannerConfig::default(),
            regions: default_regions(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()?;
        self.estimator.validate()?;
        self.scanner.validate()?;
        Ok(())
    }

    /// Loads the config from `file_path`, falling back to defaults when the file is missing.
    pub async fn load_config(file_path: &Path) -> Result<Self, ConfigError> {
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;
        config.validate()?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the current config to `file_path`, creating its directory if needed.
    pub async fn save_config(&self, file_path: &Path) -> Result<(), ConfigError> {
        if let Some(config_dir) = file_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;
        info!("Config saved to {:?}", file_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_config(&dir.path().join(CONFIG_FILE_NAME)).await.unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.tracker.smoothing_factor = 0.5;
        config.regions = vec![RegionConfig::new("lobby", "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0")];
        config.save_config(&path).await.unwrap();

        let loaded = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "tracker": { "smoothing_factor": 0.2 } }"#).await.unwrap();

        let loaded = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(loaded.tracker.smoothing_factor, 0.2);
        assert_eq!(loaded.tracker.staleness_window_ms, 5000);
        assert_eq!(loaded.estimator, EstimatorConfig::default());
        assert_eq!(loaded.regions, default_regions());
    }

    #[tokio::test]
    async fn test_out_of_range_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "tracker": { "smoothing_factor": 1.5 } }"#).await.unwrap();
        assert!(matches!(
            AppConfig::load_config(&path).await,
            Err(ConfigError::InvalidSmoothingFactor(_))
        ));

        fs::write(&path, r#"{ "estimator": { "path_loss_exponent": 0.0 } }"#).await.unwrap();
        assert!(matches!(
            AppConfig::load_config(&path).await,
            Err(ConfigError::NonPositive("path_loss_exponent"))
        ));
    }
}
