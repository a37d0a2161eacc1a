use serde::{Deserialize, Serialize};

/// One identity filter as written in the configuration file.
/// The UUID is kept as text so a malformed entry can be reported and skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub identifier: String,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor: Option<u16>,
}

impl RegionConfig {
    pub fn new(identifier: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            uuid: uuid.into(),
            major: None,
            minor: None,
        }
    }
}

/// Well known beacon UUIDs used when no regions are configured
pub fn default_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig::new("Radius Networks", "2F234454-CF6D-4A0F-ADF2-F4911BA9FFA6"),
        RegionConfig::new("Estimote", "B9407F30-F5F8-466E-AFF9-25556B57FE6D"),
        RegionConfig::new("AirLocate", "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0"),
    ]
}
