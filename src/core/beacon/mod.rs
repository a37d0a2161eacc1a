//! Beacon tracking engine
//! Turns noisy per-cycle observations into a deduplicated, pruned and
//! smoothed list of the beacons currently in range.

pub mod constants;
pub mod estimator;
mod events;
mod manager;
mod publisher;
mod region;
mod tracker;
mod types;

// Re-export types that should be publicly accessible
pub use estimator::{DistanceEstimator, classify_proximity, estimate};
pub use events::RangingEvent;
pub use manager::{RangingManager, RangingSender, RangingWorker};
pub use publisher::{
    LogPublisher, RangingFailure, SnapshotPublisher, SnapshotReceiver, WatchPublisher, render_snapshot,
};
pub use region::{IdentityFilter, RegionSet};
pub use tracker::BeaconTracker;
pub use types::{BeaconIdentity, ParseError, Proximity, RawObservation, TrackedBeacon};
