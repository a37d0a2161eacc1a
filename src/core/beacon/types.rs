//! Defines shared data structures for the beacon module.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::beacon::constants::UNKNOWN_DISTANCE;

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12})-(\d{1,5})-(\d{1,5})$")
        .expect("beacon key pattern is valid")
});

/// Errors raised while parsing beacon identities or classifications from text
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Malformed beacon key: {0}")]
    MalformedKey(String),
    #[error("Invalid UUID '{0}'")]
    InvalidUuid(String),
    #[error("Value {0} out of range for major/minor")]
    OutOfRange(String),
    #[error("Unknown proximity '{0}'")]
    UnknownProximity(String),
}

/// The (UUID, major, minor) triple identifying one beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeaconIdentity {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
}

impl BeaconIdentity {
    pub fn new(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self { uuid, major, minor }
    }
}

/// Composite key in the form `{uuid}-{major}-{minor}`
impl fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.uuid.hyphenated(), self.major, self.minor)
    }
}

impl FromStr for BeaconIdentity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = KEY_PATTERN
            .captures(s.trim())
            .ok_or_else(|| ParseError::MalformedKey(s.to_string()))?;

        let uuid = Uuid::parse_str(&caps[1]).map_err(|_| ParseError::InvalidUuid(caps[1].to_string()))?;
        let major = caps[2]
            .parse::<u16>()
            .map_err(|_| ParseError::OutOfRange(caps[2].to_string()))?;
        let minor = caps[3]
            .parse::<u16>()
            .map_err(|_| ParseError::OutOfRange(caps[3].to_string()))?;

        Ok(Self::new(uuid, major, minor))
    }
}

/// Coarse distance bucket reported alongside each observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proximity {
    Immediate,
    Near,
    Far,
    #[default]
    Unknown,
}

impl fmt::Display for Proximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Immediate => "immediate",
            Self::Near => "near",
            Self::Far => "far",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for Proximity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "near" => Ok(Self::Near),
            "far" => Ok(Self::Far),
            "unknown" => Ok(Self::Unknown),
            other => Err(ParseError::UnknownProximity(other.to_string())),
        }
    }
}

/// A single scan result as delivered by the scanning subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub identity: BeaconIdentity,
    /// Received signal strength in dBm, 0 when unavailable
    pub signal_strength: i32,
    /// Device reported distance in meters, negative when unavailable
    pub reported_distance: f64,
    pub proximity: Proximity,
}

impl RawObservation {
    pub fn new(identity: BeaconIdentity, signal_strength: i32, reported_distance: f64, proximity: Proximity) -> Self {
        Self {
            identity,
            signal_strength,
            reported_distance,
            proximity,
        }
    }

    /// An observation that carries only a signal strength reading
    pub fn from_signal(identity: BeaconIdentity, signal_strength: i32) -> Self {
        Self::new(identity, signal_strength, UNKNOWN_DISTANCE, Proximity::Unknown)
    }

    /// The reported distance, if it is a usable positive number
    pub fn usable_distance(&self) -> Option<f64> {
        (self.reported_distance.is_finite() && self.reported_distance > 0.0).then_some(self.reported_distance)
    }
}

/// The engine's record for one beacon currently in range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedBeacon {
    pub identity: BeaconIdentity,
    /// Last observed signal strength in dBm
    pub signal_strength: i32,
    /// Last device reported distance, kept for diagnostics
    pub raw_distance: f64,
    /// Exponentially smoothed distance in meters, always positive
    pub smoothed_distance: f64,
    pub proximity: Proximity,
    pub last_seen: DateTime<Utc>,
}
