//! Core functionality for the beacon ranger
//! The tracking engine and the sources that feed it.

pub mod beacon;
pub mod bluetooth;
pub mod source;

// Re-export commonly used types
pub use beacon::{BeaconTracker, RangingManager};
pub use source::ObservationSource;
