//! Application state management
//! Bundles the running ranging task with the handles used to feed and observe it.

use std::time::Duration;

use anyhow::Result;
use log::info;

use crate::config::AppConfig;
use crate::core::beacon::{BeaconTracker, RangingManager, RangingSender, RegionSet, SnapshotPublisher};

/// Global application state
pub struct AppState {
    pub config: AppConfig,
    /// Validated identity filters from the configuration
    pub regions: RegionSet,
    /// The ranging task
    pub ranging_manager: RangingManager,
}

impl AppState {
    /// Validates the configuration and starts the ranging task, which hands
    /// every changed snapshot to `publisher`.
    pub fn new<P>(config: AppConfig, publisher: P) -> Result<Self>
    where
        P: SnapshotPublisher + 'static,
    {
        config.validate()?;
        let regions = RegionSet::from_config(&config.regions);
        info!("Tracking {} region(s).", regions.len());

        let tracker = BeaconTracker::new(&config.tracker, config.estimator.estimator())?;
        let ranging_manager = RangingManager::start(
            tracker,
            publisher,
            Duration::from_millis(config.tracker.prune_tick_ms),
        );

        Ok(Self {
            config,
            regions,
            ranging_manager,
        })
    }

    /// Gets a handle for pushing ranging events
    pub fn sender(&self) -> RangingSender {
        self.ranging_manager.sender()
    }
}
