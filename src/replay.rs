//! Replays recorded scan cycles into the ranging engine
//!
//! A recording is a JSON document listing scan cycles in order:
//!
//! ```json
//! { "cycles": [
//!     { "offset_ms": 0, "region": "lobby", "observations": [
//!         { "identity": "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0-1-2", "rssi": -63, "accuracy": 1.4, "proximity": "near" }
//!     ] },
//!     { "offset_ms": 1000, "region": "lobby", "error": "scan aborted" }
//! ] }
//! ```
//!
//! Observations whose identity cannot be parsed are dropped.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::beacon::constants::UNKNOWN_DISTANCE;
use crate::core::beacon::{BeaconIdentity, Proximity, RangingSender, RawObservation, RegionSet};
use crate::core::source::ObservationSource;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read recording: {0}")]
    Io(#[from] std::io::Error),
    #[error("Recording is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedObservation {
    /// Beacon key in the form `{uuid}-{major}-{minor}`
    pub identity: String,
    #[serde(default)]
    pub rssi: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proximity: Option<String>,
}

impl RecordedObservation {
    /// Converts to a raw observation, or `None` if the identity is malformed
    pub fn to_observation(&self) -> Option<RawObservation> {
        let identity = match self.identity.parse::<BeaconIdentity>() {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Dropping recorded observation: {}", e);
                return None;
            }
        };
        let proximity = self
            .proximity
            .as_deref()
            .and_then(|p| p.parse::<Proximity>().ok())
            .unwrap_or_default();
        Some(RawObservation::new(
            identity,
            self.rssi,
            self.accuracy.unwrap_or(UNKNOWN_DISTANCE),
            proximity,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCycle {
    /// Time since the start of the recording, in milliseconds
    pub offset_ms: u64,
    /// Identifier of the region the batch was ranged under
    pub region: String,
    #[serde(default)]
    pub observations: Vec<RecordedObservation>,
    /// Set when ranging failed for this region during the cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub cycles: Vec<RecordedCycle>,
}

impl Recording {
    pub async fn load(file_path: &Path) -> Result<Self, ReplayError> {
        let json = fs::read_to_string(file_path).await?;
        let recording: Self = serde_json::from_str(&json)?;
        info!(
            "Loaded recording with {} cycle(s) from {:?}",
            recording.cycles.len(),
            file_path
        );
        Ok(recording)
    }
}

/// Feeds a [`Recording`] to the engine in real time
pub struct Replay {
    recording: Recording,
    regions: RegionSet,
}

impl Replay {
    pub fn new(recording: Recording, regions: RegionSet) -> Self {
        Self { recording, regions }
    }

    async fn play_cycle(&self, cycle: &RecordedCycle, now: DateTime<Utc>, sender: &RangingSender) -> Result<()> {
        let Some(filter) = self.regions.by_identifier(&cycle.region) else {
            warn!("Skipping cycle for unknown region '{}'", cycle.region);
            return Ok(());
        };

        if let Some(error) = &cycle.error {
            return sender.ranging_failed(filter.clone(), error.clone()).await;
        }

        let observations = cycle
            .observations
            .iter()
            .filter_map(RecordedObservation::to_observation)
            .collect();
        sender.batch_ranged(filter.clone(), now, observations).await
    }
}

/// Wall clock deadline and event timestamp of a cycle, or `None` if the offset
/// cannot be represented
fn cycle_timing(offset_ms: u64, started_at: Instant, base: DateTime<Utc>) -> Option<(Instant, DateTime<Utc>)> {
    let deadline = started_at.checked_add(Duration::from_millis(offset_ms))?;
    let offset = i64::try_from(offset_ms).ok().and_then(TimeDelta::try_milliseconds)?;
    let now = base.checked_add_signed(offset)?;
    Some((deadline, now))
}

#[async_trait::async_trait]
impl ObservationSource for Replay {
    async fn run(&mut self, sender: RangingSender, cancel_token: CancellationToken) -> Result<()> {
        let started_at = Instant::now();
        let base = Utc::now();

        for cycle in &self.recording.cycles {
            let Some((deadline, now)) = cycle_timing(cycle.offset_ms, started_at, base) else {
                warn!("Skipping cycle with out of range offset {} ms", cycle.offset_ms);
                continue;
            };
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Replay cancelled.");
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {}
            }
            self.play_cycle(cycle, now, &sender).await?;
        }

        info!("Replay finished.");
        sender.stopped().await
    }
}
