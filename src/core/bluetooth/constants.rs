//! Constants used by the Bluetooth scanner
//! The iBeacon advertisement layout and scan timing.

/// Apple company identifier carried in iBeacon manufacturer data
pub const IBEACON_COMPANY_ID: u16 = 0x004C;

/// iBeacon advertisement type byte
pub const IBEACON_TYPE: u8 = 0x02;

/// Length of the iBeacon payload following the type and length bytes
pub const IBEACON_PAYLOAD_LEN: u8 = 0x15;

/// Length of the manufacturer data block without the company identifier
pub const IBEACON_FRAME_LEN: usize = 23;

/// Scan cycle length in milliseconds
pub const DEFAULT_SCAN_CYCLE_MS: u64 = 1000;
