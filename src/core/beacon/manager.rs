//! Ranging manager
//! Owns the tracker on a dedicated task. Scanners push [`RangingEvent`]s through
//! a clonable [`RangingSender`]; the task handles them one at a time, so a batch
//! is always fully processed before the next one starts.

use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::beacon::constants::EVENT_CHANNEL_CAPACITY;
use crate::core::beacon::events::RangingEvent;
use crate::core::beacon::publisher::SnapshotPublisher;
use crate::core::beacon::region::IdentityFilter;
use crate::core::beacon::tracker::BeaconTracker;
use crate::core::beacon::types::{RawObservation, TrackedBeacon};

/// A clonable handle that sends events to the ranging task.
#[derive(Clone)]
pub struct RangingSender {
    tx: mpsc::Sender<RangingEvent>,
}

impl RangingSender {
    /// Creates a sender together with the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RangingEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send(&self, event: RangingEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow!("Ranging task is no longer running"))
    }

    pub async fn batch_ranged(
        &self,
        filter: IdentityFilter,
        now: DateTime<Utc>,
        observations: Vec<RawObservation>,
    ) -> Result<()> {
        self.send(RangingEvent::BatchRanged {
            filter,
            now,
            observations,
        })
        .await
    }

    pub async fn cycle_ranged(
        &self,
        now: DateTime<Utc>,
        batches: Vec<(IdentityFilter, Vec<RawObservation>)>,
    ) -> Result<()> {
        self.send(RangingEvent::CycleRanged { now, batches }).await
    }

    pub async fn ranging_failed(&self, filter: IdentityFilter, error: impl Into<String>) -> Result<()> {
        self.send(RangingEvent::RangingFailed {
            filter,
            error: error.into(),
        })
        .await
    }

    pub async fn authorization_changed(&self, authorized: bool) -> Result<()> {
        self.send(RangingEvent::AuthorizationChanged { authorized }).await
    }

    pub async fn stopped(&self) -> Result<()> {
        self.send(RangingEvent::Stopped).await
    }
}

/// The state driven by the ranging task.
pub struct RangingWorker<P: SnapshotPublisher> {
    tracker: BeaconTracker,
    publisher: P,
    authorized: bool,
}

impl<P: SnapshotPublisher> RangingWorker<P> {
    pub fn new(tracker: BeaconTracker, publisher: P) -> Self {
        Self {
            tracker,
            publisher,
            authorized: true,
        }
    }

    pub fn tracker(&self) -> &BeaconTracker {
        &self.tracker
    }

    pub fn handle(&mut self, event: RangingEvent) {
        match event {
            RangingEvent::BatchRanged {
                filter,
                now,
                observations,
            } => {
                if !self.authorized {
                    debug!("Ignoring batch for {} while unauthorized", filter);
                    return;
                }
                let published = self.tracker.update(&observations, &filter, now);
                self.publish(published);
            }
            RangingEvent::CycleRanged { now, batches } => {
                if !self.authorized {
                    debug!("Ignoring scan cycle while unauthorized");
                    return;
                }
                let published = self.tracker.update_cycle(&batches, now);
                self.publish(published);
            }
            RangingEvent::RangingFailed { filter, error } => {
                self.tracker.report_failure(&filter, &error);
                self.publisher.ranging_failed(&filter, &error);
            }
            RangingEvent::Tick { now } => self.tick(now),
            RangingEvent::AuthorizationChanged { authorized } => {
                if self.authorized == authorized {
                    return;
                }
                self.authorized = authorized;
                if authorized {
                    info!("Ranging authorized, tracking resumes.");
                } else {
                    warn!("Ranging authorization revoked, discarding tracked beacons.");
                    self.reset();
                }
            }
            RangingEvent::Stopped => {
                info!("Scanning stopped, discarding tracked beacons.");
                self.reset();
            }
        }
    }

    fn tick(&mut self, now: DateTime<Utc>) {
        let published = self.tracker.tick(now);
        self.publish(published);
    }

    fn reset(&mut self) {
        if self.tracker.reset() {
            self.publisher.publish(&[]);
        }
    }

    fn publish(&mut self, published: Option<Vec<TrackedBeacon>>) {
        if let Some(snapshot) = published {
            debug!("Publishing snapshot with {} beacon(s)", snapshot.len());
            self.publisher.publish(&snapshot);
        }
    }
}

/// Runs a [`RangingWorker`] on a tokio task
pub struct RangingManager {
    sender: RangingSender,
    cancel_token: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl RangingManager {
    /// Spawns the ranging task. Must be called inside a tokio runtime.
    pub fn start<P>(tracker: BeaconTracker, publisher: P, prune_tick: Duration) -> Self
    where
        P: SnapshotPublisher + 'static,
    {
        let (sender, rx) = RangingSender::channel(EVENT_CHANNEL_CAPACITY);
        let cancel_token = CancellationToken::new();
        let worker = RangingWorker::new(tracker, publisher);

        let handle = tokio::spawn(Self::run(worker, rx, prune_tick, cancel_token.clone()));
        info!("Ranging task started.");

        Self {
            sender,
            cancel_token,
            task_handle: Some(handle),
        }
    }

    pub fn sender(&self) -> RangingSender {
        self.sender.clone()
    }

    /// Stops the task after it has drained the events already queued.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Stopping ranging task.");
        self.cancel_token.cancel();

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(()) => info!("Ranging task finished."),
                Err(e) if e.is_cancelled() => info!("Ranging task was cancelled."),
                Err(e) => {
                    error!("Ranging task finished with an unexpected join error: {:?}", e);
                    return Err(e.into());
                }
            }
        } else {
            info!("No active ranging task to wait for.");
        }
        Ok(())
    }

    async fn run<P: SnapshotPublisher>(
        mut worker: RangingWorker<P>,
        mut rx: mpsc::Receiver<RangingEvent>,
        prune_tick: Duration,
        cancel_token: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(prune_tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                event = rx.recv() => {
                    match event {
                        Some(event) => worker.handle(event),
                        None => {
                            info!("All ranging senders dropped.");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    worker.handle(RangingEvent::Tick { now: Utc::now() });
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tracker_config::TrackerConfig;
    use crate::core::beacon::estimator::DistanceEstimator;
    use crate::core::beacon::publisher::{SnapshotReceiver, WatchPublisher};
    use crate::core::beacon::types::BeaconIdentity;
    use chrono::TimeDelta;
    use uuid::Uuid;

    fn filter() -> IdentityFilter {
        IdentityFilter::new("lobby", Uuid::from_u128(0xe2c56db5_dffb_48d2_b060_d0f5a71096e0))
    }

    fn observation(minor: u16, rssi: i32) -> RawObservation {
        RawObservation::from_signal(BeaconIdentity::new(filter().uuid, 1, minor), rssi)
    }

    fn worker() -> (RangingWorker<WatchPublisher>, SnapshotReceiver) {
        let tracker = BeaconTracker::new(&TrackerConfig::default(), DistanceEstimator::default()).unwrap();
        let (publisher, receiver) = WatchPublisher::new();
        (RangingWorker::new(tracker, publisher), receiver)
    }

    fn batch(now: DateTime<Utc>, observations: Vec<RawObservation>) -> RangingEvent {
        RangingEvent::BatchRanged {
            filter: filter(),
            now,
            observations,
        }
    }

    #[test]
    fn test_batch_publishes_snapshot() {
        let (mut worker, receiver) = worker();
        worker.handle(batch(Utc::now(), vec![observation(1, -59), observation(2, -70)]));

        let snapshot = receiver.snapshots.borrow().clone();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].smoothed_distance, 1.0);
    }

    #[test]
    fn test_unchanged_snapshot_not_republished() {
        let (mut worker, mut receiver) = worker();
        let now = Utc::now();
        worker.handle(batch(now, vec![observation(1, -59)]));
        receiver.snapshots.mark_unchanged();

        worker.handle(batch(now + TimeDelta::seconds(1), vec![]));
        worker.handle(RangingEvent::Tick {
            now: now + TimeDelta::seconds(2),
        });
        assert!(!receiver.snapshots.has_changed().unwrap());

        worker.handle(RangingEvent::Tick {
            now: now + TimeDelta::seconds(6),
        });
        assert!(receiver.snapshots.has_changed().unwrap());
        assert!(receiver.snapshots.borrow_and_update().is_empty());
    }

    #[test]
    fn test_tick_follows_event_clock() {
        let (mut worker, receiver) = worker();
        let start = DateTime::from_timestamp_millis(0).unwrap();
        worker.handle(batch(start, vec![observation(1, -59)]));

        worker.handle(RangingEvent::Tick {
            now: start + TimeDelta::milliseconds(5000),
        });
        assert_eq!(worker.tracker().len(), 1);

        worker.handle(RangingEvent::Tick {
            now: start + TimeDelta::milliseconds(5001),
        });
        assert!(worker.tracker().is_empty());
        assert!(receiver.snapshots.borrow().is_empty());
    }

    #[test]
    fn test_failure_leaves_tracked_beacons() {
        let (mut worker, mut receiver) = worker();
        worker.handle(batch(Utc::now(), vec![observation(1, -59)]));
        receiver.snapshots.mark_unchanged();

        worker.handle(RangingEvent::RangingFailed {
            filter: filter(),
            error: "scan aborted".to_string(),
        });

        assert_eq!(worker.tracker().len(), 1);
        assert!(!receiver.snapshots.has_changed().unwrap());
        assert_eq!(receiver.failures.try_recv().unwrap().error, "scan aborted");
    }

    #[test]
    fn test_stop_clears_and_publishes_empty() {
        let (mut worker, mut receiver) = worker();
        worker.handle(batch(Utc::now(), vec![observation(1, -59)]));
        receiver.snapshots.mark_unchanged();

        worker.handle(RangingEvent::Stopped);
        assert!(worker.tracker().is_empty());
        assert!(receiver.snapshots.has_changed().unwrap());
        assert!(receiver.snapshots.borrow_and_update().is_empty());
    }

    #[test]
    fn test_revoked_authorization_resets_and_ignores_batches() {
        let (mut worker, receiver) = worker();
        let now = Utc::now();
        worker.handle(batch(now, vec![observation(1, -59)]));

        worker.handle(RangingEvent::AuthorizationChanged { authorized: false });
        assert!(worker.tracker().is_empty());
        assert!(receiver.snapshots.borrow().is_empty());

        worker.handle(batch(now, vec![observation(2, -59)]));
        assert!(worker.tracker().is_empty());

        worker.handle(RangingEvent::AuthorizationChanged { authorized: true });
        worker.handle(batch(now, vec![observation(2, -59)]));
        assert_eq!(worker.tracker().len(), 1);
    }

    #[tokio::test]
    async fn test_manager_serializes_events() {
        let tracker = BeaconTracker::new(&TrackerConfig::default(), DistanceEstimator::default()).unwrap();
        let (publisher, mut receiver) = WatchPublisher::new();
        let mut manager = RangingManager::start(tracker, publisher, Duration::from_secs(60));

        let sender = manager.sender();
        let now = Utc::now();
        sender.batch_ranged(filter(), now, vec![observation(1, -59)]).await.unwrap();
        sender
            .batch_ranged(filter(), now + TimeDelta::milliseconds(100), vec![observation(1, -69)])
            .await
            .unwrap();

        let expected = 0.35 * crate::core::beacon::estimator::estimate(-69, -59, 2.0) + (1.0 - 0.35) * 1.0;
        let snapshot = receiver
            .snapshots
            .wait_for(|snapshot| snapshot.first().is_some_and(|beacon| beacon.signal_strength == -69))
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].smoothed_distance, expected);

        sender.stopped().await.unwrap();
        receiver.snapshots.wait_for(|snapshot| snapshot.is_empty()).await.unwrap();

        manager.shutdown().await.unwrap();
        assert!(sender.stopped().await.is_err());
    }
}
