//! Snapshot publication
//! The output side of the engine: the sorted list of tracked beacons is handed
//! to a publisher whenever it changes, along with any ranging failures.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::core::beacon::region::IdentityFilter;
use crate::core::beacon::types::TrackedBeacon;

/// A ranging failure as seen by consumers of the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangingFailure {
    pub region: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Receives snapshots and failures from the ranging worker
pub trait SnapshotPublisher: Send {
    /// Replaces any prior snapshot
    fn publish(&mut self, snapshot: &[TrackedBeacon]);

    fn ranging_failed(&mut self, filter: &IdentityFilter, error: &str);
}

/// Publishes into a `watch` channel so readers always see the latest snapshot
pub struct WatchPublisher {
    snapshot_tx: watch::Sender<Vec<TrackedBeacon>>,
    failure_tx: mpsc::UnboundedSender<RangingFailure>,
}

/// Consumer half of a [`WatchPublisher`]
pub struct SnapshotReceiver {
    pub snapshots: watch::Receiver<Vec<TrackedBeacon>>,
    pub failures: mpsc::UnboundedReceiver<RangingFailure>,
}

impl WatchPublisher {
    pub fn new() -> (Self, SnapshotReceiver) {
        let (snapshot_tx, snapshots) = watch::channel(Vec::new());
        let (failure_tx, failures) = mpsc::unbounded_channel();
        (
            Self {
                snapshot_tx,
                failure_tx,
            },
            SnapshotReceiver { snapshots, failures },
        )
    }
}

impl SnapshotPublisher for WatchPublisher {
    fn publish(&mut self, snapshot: &[TrackedBeacon]) {
        // send_replace keeps working with no receiver attached
        self.snapshot_tx.send_replace(snapshot.to_vec());
    }

    fn ranging_failed(&mut self, filter: &IdentityFilter, error: &str) {
        let failure = RangingFailure {
            region: filter.identifier.clone(),
            error: error.to_string(),
            at: Utc::now(),
        };
        if self.failure_tx.send(failure).is_err() {
            warn!("No listener for ranging failures of region {}", filter);
        }
    }
}

/// Writes snapshots and failures to the log.
/// A snapshot that renders the same as the previous one is not logged again.
#[derive(Debug, Default)]
pub struct LogPublisher {
    last_rendered: Option<String>,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotPublisher for LogPublisher {
    fn publish(&mut self, snapshot: &[TrackedBeacon]) {
        let rendered = render_snapshot(snapshot);
        if self.last_rendered.as_deref() == Some(rendered.as_str()) {
            return;
        }
        info!("Beacons in range:\n{}", rendered);
        self.last_rendered = Some(rendered);
    }

    fn ranging_failed(&mut self, filter: &IdentityFilter, error: &str) {
        warn!("Ranging failed in region {}: {}", filter, error);
    }
}

/// Formats a snapshot as a fixed-width table for log output
pub fn render_snapshot(snapshot: &[TrackedBeacon]) -> String {
    if snapshot.is_empty() {
        return "no beacons in range".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<36} {:>5} {:>5} {:>5} {:>8} {:>9}",
        "UUID", "MAJOR", "MINOR", "RSSI", "DIST(m)", "PROXIMITY"
    );
    for beacon in snapshot {
        let _ = writeln!(
            out,
            "{:<36} {:>5} {:>5} {:>5} {:>8.2} {:>9}",
            beacon.identity.uuid.hyphenated().to_string().to_uppercase(),
            beacon.identity.major,
            beacon.identity.minor,
            beacon.signal_strength,
            beacon.smoothed_distance,
            beacon.proximity.to_string(),
        );
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::beacon::types::{BeaconIdentity, Proximity};
    use uuid::Uuid;

    fn beacon(minor: u16, distance: f64) -> TrackedBeacon {
        TrackedBeacon {
            identity: BeaconIdentity::new(Uuid::nil(), 1, minor),
            signal_strength: -61,
            raw_distance: -1.0,
            smoothed_distance: distance,
            proximity: Proximity::Near,
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn test_watch_publisher_replaces_snapshot() {
        let (mut publisher, receiver) = WatchPublisher::new();
        publisher.publish(&[beacon(1, 1.0), beacon(2, 2.0)]);
        publisher.publish(&[beacon(3, 0.5)]);

        let latest = receiver.snapshots.borrow().clone();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].identity.minor, 3);
    }

    #[test]
    fn test_failures_are_observable() {
        let (mut publisher, mut receiver) = WatchPublisher::new();
        let filter = IdentityFilter::new("lobby", Uuid::nil());
        publisher.ranging_failed(&filter, "radio off");

        let failure = receiver.failures.try_recv().unwrap();
        assert_eq!(failure.region, "lobby");
        assert_eq!(failure.error, "radio off");
    }

    #[test]
    fn test_log_publisher_skips_identical_tables() {
        let mut publisher = LogPublisher::new();
        publisher.publish(&[beacon(7, 1.234)]);
        let first = publisher.last_rendered.clone().unwrap();
        assert!(first.contains("1.23"));

        // Differs only past the rendered precision.
        publisher.publish(&[beacon(7, 1.2341)]);
        assert_eq!(publisher.last_rendered.as_deref(), Some(first.as_str()));

        publisher.publish(&[]);
        assert_eq!(publisher.last_rendered.as_deref(), Some("no beacons in range"));

        publisher.ranging_failed(&IdentityFilter::new("lobby", Uuid::nil()), "radio off");
        assert_eq!(publisher.last_rendered.as_deref(), Some("no beacons in range"));
    }

    #[test]
    fn test_render_snapshot() {
        assert_eq!(render_snapshot(&[]), "no beacons in range");
        let table = render_snapshot(&[beacon(7, 1.234)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("00000000-0000-0000-0000-000000000000"));
        assert!(lines[1].contains("1.23"));
        assert!(lines[1].ends_with("near"));
    }
}
