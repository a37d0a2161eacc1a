//! Identity filters
//! The fixed set of beacon identities the engine is willing to track.

use std::fmt;

use log::warn;
use uuid::Uuid;

use crate::config::region_config::RegionConfig;
use crate::core::beacon::types::BeaconIdentity;

/// A criterion the scanner uses to report only matching beacons
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityFilter {
    /// Human readable name of the filter
    pub identifier: String,
    pub uuid: Uuid,
    /// Narrows the filter to one major value
    pub major: Option<u16>,
    /// Narrows the filter to one minor value, only meaningful with a major
    pub minor: Option<u16>,
}

impl IdentityFilter {
    pub fn new(identifier: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            identifier: identifier.into(),
            uuid,
            major: None,
            minor: None,
        }
    }

    pub fn with_major(mut self, major: u16) -> Self {
        self.major = Some(major);
        self
    }

    pub fn with_minor(mut self, minor: u16) -> Self {
        self.minor = Some(minor);
        self
    }

    /// Returns true if the identity falls under this filter
    pub fn matches(&self, identity: &BeaconIdentity) -> bool {
        identity.uuid == self.uuid
            && self.major.is_none_or(|major| major == identity.major)
            && self.minor.is_none_or(|minor| minor == identity.minor)
    }
}

impl fmt::Display for IdentityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.identifier, self.uuid.hyphenated())?;
        if let Some(major) = self.major {
            write!(f, " major {}", major)?;
        }
        if let Some(minor) = self.minor {
            write!(f, " minor {}", minor)?;
        }
        write!(f, ")")
    }
}

/// The validated list of filters supplied at startup
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    filters: Vec<IdentityFilter>,
}

impl RegionSet {
    pub fn new(filters: Vec<IdentityFilter>) -> Self {
        Self { filters }
    }

    /// Builds the set from configuration, skipping entries with a malformed UUID
    pub fn from_config(regions: &[RegionConfig]) -> Self {
        let filters = regions
            .iter()
            .filter_map(|region| match Uuid::parse_str(region.uuid.trim()) {
                Ok(uuid) => {
                    if region.minor.is_some() && region.major.is_none() {
                        warn!(
                            "Region '{}' sets a minor without a major, ignoring the minor.",
                            region.identifier
                        );
                    }
                    Some(IdentityFilter {
                        identifier: region.identifier.clone(),
                        uuid,
                        major: region.major,
                        minor: region.major.and(region.minor),
                    })
                }
                Err(e) => {
                    warn!(
                        "Excluding region '{}' with malformed UUID {:?}: {}",
                        region.identifier, region.uuid, e
                    );
                    None
                }
            })
            .collect();
        Self { filters }
    }

    pub fn filters(&self) -> &[IdentityFilter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Index of the first filter that covers the identity
    pub fn position(&self, identity: &BeaconIdentity) -> Option<usize> {
        self.filters.iter().position(|filter| filter.matches(identity))
    }

    pub fn by_identifier(&self, identifier: &str) -> Option<&IdentityFilter> {
        self.filters.iter().find(|filter| filter.identifier == identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID_A: &str = "e2c56db5-dffb-48d2-b060-d0f5a71096e0";
    const UUID_B: &str = "f7826da6-4fa2-4e98-8024-bc5b71e0893e";

    fn region(identifier: &str, uuid: &str, major: Option<u16>, minor: Option<u16>) -> RegionConfig {
        RegionConfig {
            identifier: identifier.to_string(),
            uuid: uuid.to_string(),
            major,
            minor,
        }
    }

    #[test]
    fn test_malformed_uuid_is_excluded() {
        let set = RegionSet::from_config(&[
            region("a", UUID_A, None, None),
            region("broken", "not-a-uuid", None, None),
            region("b", UUID_B, Some(3), None),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.filters()[0].identifier, "a");
        assert_eq!(set.filters()[1].major, Some(3));
    }

    #[test]
    fn test_minor_without_major_is_dropped() {
        let set = RegionSet::from_config(&[region("a", UUID_A, None, Some(9))]);
        assert_eq!(set.filters()[0].minor, None);
    }

    #[test]
    fn test_matching() {
        let uuid_a = Uuid::parse_str(UUID_A).unwrap();
        let uuid_b = Uuid::parse_str(UUID_B).unwrap();
        let any_a = IdentityFilter::new("a", uuid_a);
        let exact_b = IdentityFilter::new("b", uuid_b).with_major(1).with_minor(2);

        assert!(any_a.matches(&BeaconIdentity::new(uuid_a, 7, 8)));
        assert!(!any_a.matches(&BeaconIdentity::new(uuid_b, 7, 8)));
        assert!(exact_b.matches(&BeaconIdentity::new(uuid_b, 1, 2)));
        assert!(!exact_b.matches(&BeaconIdentity::new(uuid_b, 1, 3)));

        let set = RegionSet::new(vec![any_a, exact_b]);
        assert_eq!(set.position(&BeaconIdentity::new(uuid_b, 1, 2)), Some(1));
        assert_eq!(set.position(&BeaconIdentity::new(uuid_a, 1, 2)), Some(0));
        assert_eq!(set.position(&BeaconIdentity::new(uuid_b, 2, 2)), None);
        assert_eq!(set.by_identifier("b").map(|f| f.uuid), Some(uuid_b));
        assert!(set.by_identifier("c").is_none());
    }
}
