//! iBeacon advertisement parsing
//! Layout of the manufacturer data following the company identifier:
//! type (0x02), length (0x15), 16 byte proximity UUID, big-endian major,
//! big-endian minor, signed measured power at 1 meter.

use uuid::Uuid;

use crate::core::bluetooth::constants::{IBEACON_COMPANY_ID, IBEACON_FRAME_LEN, IBEACON_PAYLOAD_LEN, IBEACON_TYPE};
use crate::core::beacon::BeaconIdentity;

/// A decoded iBeacon advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IBeaconFrame {
    pub identity: BeaconIdentity,
    /// Calibrated signal strength at 1 meter, in dBm
    pub measured_power: i8,
}

/// Decodes manufacturer data into an iBeacon frame, or `None` if it is not one
pub fn parse_ibeacon(company_id: u16, data: &[u8]) -> Option<IBeaconFrame> {
    if company_id != IBEACON_COMPANY_ID || data.len() < IBEACON_FRAME_LEN {
        return None;
    }
    if data[0] != IBEACON_TYPE || data[1] != IBEACON_PAYLOAD_LEN {
        return None;
    }

    let uuid_bytes: [u8; 16] = data[2..18].try_into().ok()?;
    let major = u16::from_be_bytes([data[18], data[19]]);
    let minor = u16::from_be_bytes([data[20], data[21]]);
    let measured_power = data[22] as i8;

    Some(IBeaconFrame {
        identity: BeaconIdentity::new(Uuid::from_bytes(uuid_bytes), major, minor),
        measured_power,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes() -> Vec<u8> {
        let mut data = vec![0x02, 0x15];
        data.extend_from_slice(&[
            0xE2, 0xC5, 0x6D, 0xB5, 0xDF, 0xFB, 0x48, 0xD2, 0xB0, 0x60, 0xD0, 0xF5, 0xA7, 0x10, 0x96, 0xE0,
        ]);
        data.extend_from_slice(&[0x00, 0x01, 0x01, 0x02, 0xC5]);
        data
    }

    #[test]
    fn test_parse_ibeacon() {
        let frame = parse_ibeacon(0x004C, &frame_bytes()).unwrap();
        assert_eq!(
            frame.identity.uuid,
            Uuid::from_u128(0xe2c56db5_dffb_48d2_b060_d0f5a71096e0)
        );
        assert_eq!(frame.identity.major, 1);
        assert_eq!(frame.identity.minor, 258);
        assert_eq!(frame.measured_power, -59);
    }

    #[test]
    fn test_rejects_other_frames() {
        assert!(parse_ibeacon(0x0059, &frame_bytes()).is_none());
        assert!(parse_ibeacon(0x004C, &frame_bytes()[..20]).is_none());

        let mut wrong_type = frame_bytes();
        wrong_type[0] = 0x10;
        assert!(parse_ibeacon(0x004C, &wrong_type).is_none());

        let mut wrong_len = frame_bytes();
        wrong_len[1] = 0x05;
        assert!(parse_ibeacon(0x004C, &wrong_len).is_none());
    }
}
