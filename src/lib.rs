//! Beacon Ranger library
//! Ranges nearby iBeacons, estimates and smooths their distance, and keeps a
//! live sorted list of the beacons currently in range.

// Module declarations
pub mod config;
pub mod core;
pub mod logging;
pub mod replay;
pub mod state;
pub mod utils;
