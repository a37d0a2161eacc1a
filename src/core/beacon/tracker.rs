//! Beacon tracking engine
//! Merges per-cycle observation batches into a keyed table of tracked beacons,
//! smooths each beacon's distance with an exponential moving average, prunes
//! stale entries and produces an ordered snapshot that is only republished when
//! it changes.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};

use crate::config::ConfigError;
use crate::config::tracker_config::TrackerConfig;
use crate::core::beacon::constants::MIN_SMOOTHED_DISTANCE;
use crate::core::beacon::estimator::DistanceEstimator;
use crate::core::beacon::region::IdentityFilter;
use crate::core::beacon::types::{BeaconIdentity, RawObservation, TrackedBeacon};

/// The stateful core of the ranging pipeline.
///
/// Not thread safe by itself; one batch must be fully processed before the next.
/// [`crate::core::beacon::RangingManager`] provides that serialization.
pub struct BeaconTracker {
    /// Weight of a new distance sample, in (0, 1]
    smoothing_factor: f64,
    /// Maximum age of a tracked beacon
    staleness_window: TimeDelta,
    /// Used when an observation carries no usable distance
    estimator: DistanceEstimator,
    /// One record per identity
    beacons: HashMap<BeaconIdentity, TrackedBeacon>,
    /// The snapshot handed out by the last publishing update
    last_published: Option<Vec<TrackedBeacon>>,
}

impl BeaconTracker {
    /// Creates a tracker, rejecting out-of-range configuration
    pub fn new(config: &TrackerConfig, estimator: DistanceEstimator) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            smoothing_factor: config.smoothing_factor,
            staleness_window: config.staleness_window()?,
            estimator,
            beacons: HashMap::new(),
            last_published: None,
        })
    }

    /// Processes one batch of observations reported under `scope`.
    ///
    /// Observations outside the scope are dropped. After merging, every entry
    /// older than the staleness window is pruned. Returns the new snapshot when
    /// it differs from the last published one.
    pub fn update(
        &mut self,
        observations: &[RawObservation],
        scope: &IdentityFilter,
        now: DateTime<Utc>,
    ) -> Option<Vec<TrackedBeacon>> {
        self.merge(observations, scope, now);
        self.prune(now);
        self.publish_if_changed()
    }

    /// Processes the batches of every filter from one scan cycle, pruning and
    /// publishing once after all of them have been merged.
    pub fn update_cycle(
        &mut self,
        batches: &[(IdentityFilter, Vec<RawObservation>)],
        now: DateTime<Utc>,
    ) -> Option<Vec<TrackedBeacon>> {
        for (scope, observations) in batches {
            self.merge(observations, scope, now);
        }
        self.prune(now);
        self.publish_if_changed()
    }

    /// Prunes stale entries without new observations
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Vec<TrackedBeacon>> {
        self.prune(now);
        self.publish_if_changed()
    }

    /// Records a ranging failure for `scope`. Tracked state is left to age out.
    pub fn report_failure(&self, scope: &IdentityFilter, error: &str) {
        let affected = self.beacons.keys().filter(|identity| scope.matches(identity)).count();
        warn!(
            "Ranging failed for region {}: {}. {} tracked beacon(s) left to age out.",
            scope, error, affected
        );
    }

    /// Drops every tracked beacon and forgets the last published snapshot.
    /// Returns true if a non-empty snapshot had been published before.
    pub fn reset(&mut self) -> bool {
        let had_published = self.last_published.as_ref().is_some_and(|snapshot| !snapshot.is_empty());
        self.beacons.clear();
        self.last_published = None;
        info!("Beacon tracker reset.");
        had_published
    }

    /// Removes every entry last seen more than the staleness window before `now`
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let window = self.staleness_window;
        let before = self.beacons.len();
        self.beacons.retain(|identity, beacon| {
            let keep = now - beacon.last_seen <= window;
            if !keep {
                debug!("Pruning stale beacon {} last seen at {}", identity, beacon.last_seen);
            }
            keep
        });
        before - self.beacons.len()
    }

    /// All tracked beacons ordered by UUID, then by smoothed distance
    pub fn snapshot(&self) -> Vec<TrackedBeacon> {
        let mut snapshot: Vec<TrackedBeacon> = self.beacons.values().cloned().collect();
        snapshot.sort_by(compare_for_display);
        snapshot
    }

    pub fn get(&self, identity: &BeaconIdentity) -> Option<&TrackedBeacon> {
        self.beacons.get(identity)
    }

    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    pub fn last_published(&self) -> Option<&[TrackedBeacon]> {
        self.last_published.as_deref()
    }

    fn merge(&mut self, observations: &[RawObservation], scope: &IdentityFilter, now: DateTime<Utc>) {
        for observation in observations {
            if !scope.matches(&observation.identity) {
                debug!(
                    "Dropping observation {} outside of region {}",
                    observation.identity, scope
                );
                continue;
            }
            self.apply(observation, now);
        }
    }

    fn apply(&mut self, observation: &RawObservation, now: DateTime<Utc>) {
        let candidate = self.candidate_distance(observation);
        let alpha = self.smoothing_factor;

        match self.beacons.get_mut(&observation.identity) {
            Some(beacon) => {
                // An unknown candidate would drag the average below zero.
                if candidate > 0.0 {
                    beacon.smoothed_distance = alpha * candidate + (1.0 - alpha) * beacon.smoothed_distance;
                }
                beacon.signal_strength = observation.signal_strength;
                beacon.raw_distance = observation.reported_distance;
                beacon.proximity = observation.proximity;
                beacon.last_seen = now;
                debug!(
                    "Updated beacon {}: rssi {} candidate {:.3} m smoothed {:.3} m",
                    observation.identity, observation.signal_strength, candidate, beacon.smoothed_distance
                );
            }
            None => {
                let beacon = TrackedBeacon {
                    identity: observation.identity,
                    signal_strength: observation.signal_strength,
                    raw_distance: observation.reported_distance,
                    smoothed_distance: candidate.max(MIN_SMOOTHED_DISTANCE),
                    proximity: observation.proximity,
                    last_seen: now,
                };
                debug!(
                    "Tracking new beacon {}: rssi {} seeded at {:.3} m",
                    observation.identity, observation.signal_strength, beacon.smoothed_distance
                );
                self.beacons.insert(observation.identity, beacon);
            }
        }
    }

    fn candidate_distance(&self, observation: &RawObservation) -> f64 {
        observation
            .usable_distance()
            .unwrap_or_else(|| self.estimator.estimate(observation.signal_strength))
    }

    fn publish_if_changed(&mut self) -> Option<Vec<TrackedBeacon>> {
        let snapshot = self.snapshot();
        let previous = self.last_published.as_deref().unwrap_or(&[]);
        if previous == snapshot.as_slice() {
            return None;
        }
        self.last_published = Some(snapshot.clone());
        Some(snapshot)
    }
}

fn compare_for_display(a: &TrackedBeacon, b: &TrackedBeacon) -> Ordering {
    a.identity
        .uuid
        .cmp(&b.identity.uuid)
        .then_with(|| a.smoothed_distance.total_cmp(&b.smoothed_distance))
        .then_with(|| a.identity.cmp(&b.identity))
}
