use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Result, anyhow};
use bluest::{Adapter, AdapterEvent, AdvertisingDevice};
use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::scanner_config::ScannerConfig;
use crate::core::beacon::constants::{UNAVAILABLE_SIGNAL_STRENGTH, UNKNOWN_DISTANCE};
use crate::core::beacon::estimator::{DistanceEstimator, classify_proximity};
use crate::core::beacon::{BeaconIdentity, IdentityFilter, RangingSender, RawObservation, RegionSet};
use crate::core::bluetooth::ibeacon::{IBeaconFrame, parse_ibeacon};
use crate::core::source::ObservationSource;

/// Signal readings for one beacon collected during a scan cycle
#[derive(Debug, Clone, Copy)]
struct Readings {
    measured_power: i8,
    rssi_sum: i64,
    rssi_count: u32,
}

/// Groups the advertisements heard during one scan cycle by identity filter.
/// Each beacon yields one observation per cycle with its mean signal strength.
pub struct CycleBuffer {
    regions: RegionSet,
    readings: Vec<BTreeMap<BeaconIdentity, Readings>>,
}

impl CycleBuffer {
    pub fn new(regions: RegionSet) -> Self {
        let readings = vec![BTreeMap::new(); regions.len()];
        Self { regions, readings }
    }

    /// Records one advertisement. Returns false if no filter covers the beacon.
    pub fn push(&mut self, frame: IBeaconFrame, rssi: Option<i16>) -> bool {
        let Some(index) = self.regions.position(&frame.identity) else {
            return false;
        };

        let entry = self.readings[index].entry(frame.identity).or_insert(Readings {
            measured_power: frame.measured_power,
            rssi_sum: 0,
            rssi_count: 0,
        });
        entry.measured_power = frame.measured_power;
        if let Some(rssi) = rssi.filter(|rssi| i32::from(*rssi) != UNAVAILABLE_SIGNAL_STRENGTH) {
            entry.rssi_sum += i64::from(rssi);
            entry.rssi_count += 1;
        }
        true
    }

    /// Takes every filter's batch for the finished cycle, empty batches included
    pub fn drain(&mut self, estimator: &DistanceEstimator) -> Vec<(IdentityFilter, Vec<RawObservation>)> {
        self.regions
            .filters()
            .iter()
            .zip(self.readings.iter_mut())
            .map(|(filter, readings)| {
                let observations = std::mem::take(readings)
                    .into_iter()
                    .map(|(identity, readings)| Self::observation(identity, readings, estimator))
                    .collect();
                (filter.clone(), observations)
            })
            .collect()
    }

    fn observation(identity: BeaconIdentity, readings: Readings, estimator: &DistanceEstimator) -> RawObservation {
        let signal_strength = if readings.rssi_count == 0 {
            UNAVAILABLE_SIGNAL_STRENGTH
        } else {
            (readings.rssi_sum as f64 / f64::from(readings.rssi_count)).round() as i32
        };

        // A frame without calibration leaves distance to the tracker's own estimator.
        let reported_distance = if readings.measured_power == 0 {
            UNKNOWN_DISTANCE
        } else {
            estimator.estimate_with_reference(signal_strength, i32::from(readings.measured_power))
        };

        RawObservation::new(identity, signal_strength, reported_distance, classify_proximity(reported_distance))
    }
}

/// Ranges iBeacons with the host Bluetooth adapter
pub struct BeaconScanner {
    adapter: Adapter,
    regions: RegionSet,
    estimator: DistanceEstimator,
    config: ScannerConfig,
}

impl BeaconScanner {
    pub fn new(adapter: Adapter, regions: RegionSet, estimator: DistanceEstimator, config: ScannerConfig) -> Self {
        Self {
            adapter,
            regions,
            estimator,
            config,
        }
    }

    /// Opens the default adapter and waits until it is powered on
    pub async fn with_default_adapter(
        regions: RegionSet,
        estimator: DistanceEstimator,
        config: ScannerConfig,
    ) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");
        Ok(Self::new(adapter, regions, estimator, config))
    }

    fn frame_from(&self, discovered: &AdvertisingDevice) -> Option<(IBeaconFrame, Option<i16>)> {
        let manufacturer_data = discovered.adv_data.manufacturer_data.as_ref()?;
        let frame = parse_ibeacon(manufacturer_data.company_id, &manufacturer_data.data[..])?;

        if let (Some(min_rssi), Some(rssi)) = (self.config.min_rssi, discovered.rssi) {
            if rssi < min_rssi {
                debug!("Ignoring {} below RSSI threshold: {}", frame.identity, rssi);
                return None;
            }
        }
        Some((frame, discovered.rssi))
    }

    async fn report_failure(&self, sender: &RangingSender, error: &str) -> Result<()> {
        for filter in self.regions.filters() {
            sender.ranging_failed(filter.clone(), error).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObservationSource for BeaconScanner {
    async fn run(&mut self, sender: RangingSender, cancel_token: CancellationToken) -> Result<()> {
        if self.regions.is_empty() {
            return Err(anyhow!("No valid regions to range"));
        }
        for filter in self.regions.filters() {
            info!("Ranging beacons in region {}", filter);
        }

        let mut scan_stream = match self.adapter.scan(&[]).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start Bluetooth scan: {}", e);
                self.report_failure(&sender, &e.to_string()).await?;
                return Err(e.into());
            }
        };
        let mut adapter_events = match self.adapter.events().await {
            Ok(events) => Some(events),
            Err(e) => {
                warn!("Adapter state events unavailable: {}", e);
                None
            }
        };
        let mut adapter_events_open = adapter_events.is_some();

        let mut buffer = CycleBuffer::new(self.regions.clone());
        let mut cycle = tokio::time::interval(Duration::from_millis(self.config.scan_cycle_ms));
        cycle.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and would flush an empty cycle.
        cycle.tick().await;

        info!("Beacon scan started.");
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    break;
                }
                _ = cycle.tick() => {
                    let batches = buffer.drain(&self.estimator);
                    sender.cycle_ranged(Utc::now(), batches).await?;
                }
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            if let Some((frame, rssi)) = self.frame_from(&discovered) {
                                if !buffer.push(frame, rssi) {
                                    debug!("Ignoring beacon {} outside configured regions", frame.identity);
                                }
                            }
                        }
                        None => {
                            error!("Bluetooth scan stream has ended.");
                            self.report_failure(&sender, "scan stream ended").await?;
                            break;
                        }
                    }
                }
                event = async {
                    match adapter_events.as_mut() {
                        Some(events) => events.next().await,
                        None => None,
                    }
                }, if adapter_events_open => {
                    match event {
                        Some(Ok(AdapterEvent::Available)) => sender.authorization_changed(true).await?,
                        Some(Ok(AdapterEvent::Unavailable)) => sender.authorization_changed(false).await?,
                        Some(Err(e)) => warn!("Adapter event error: {}", e),
                        None => adapter_events_open = false,
                    }
                }
            }
        }

        info!("Beacon scan stopped.");
        sender.stopped().await
    }
}
