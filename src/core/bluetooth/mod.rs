//! Bluetooth functionality for the beacon ranger
//! This module scans for iBeacon advertisements with the host adapter and
//! feeds them to the tracking engine once per scan cycle.

pub mod constants;
mod ibeacon;
mod scanner;

// Re-export types that should be publicly accessible
pub use ibeacon::{IBeaconFrame, parse_ibeacon};
pub use scanner::{BeaconScanner, CycleBuffer};
