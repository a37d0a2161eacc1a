//! Messages pushed by the scanning side into the ranging worker

use chrono::{DateTime, Utc};

use crate::core::beacon::region::IdentityFilter;
use crate::core::beacon::types::RawObservation;

#[derive(Debug, Clone)]
pub enum RangingEvent {
    /// One scan cycle's observations for a single filter
    BatchRanged {
        filter: IdentityFilter,
        now: DateTime<Utc>,
        observations: Vec<RawObservation>,
    },
    /// Every filter's observations for one scan cycle, pruned once
    CycleRanged {
        now: DateTime<Utc>,
        batches: Vec<(IdentityFilter, Vec<RawObservation>)>,
    },
    /// The scanner could not range for `filter`
    RangingFailed { filter: IdentityFilter, error: String },
    /// Prune pass at `now` with no new observations
    Tick { now: DateTime<Utc> },
    /// Permission to use the radio was granted or revoked
    AuthorizationChanged { authorized: bool },
    /// Scanning stopped; tracked state is discarded
    Stopped,
}
