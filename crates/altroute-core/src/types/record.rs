use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::CACHE_FRESHNESS_HOURS;

/// A proxy hostname advertised by a DoH provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedRecord {
    /// Proxy hostname
    pub host: String,

    /// Advertised time-to-live in seconds.
    ///
    /// Kept for diagnostics only; cache freshness uses a fixed window.
    pub ttl: u32,
}

impl ResolvedRecord {
    /// Create a new record
    #[must_use]
    pub fn new(host: impl Into<String>, ttl: u32) -> Self {
        Self {
            host: host.into(),
            ttl,
        }
    }
}

// Two records naming the same host are the same candidate.
impl PartialEq for ResolvedRecord {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
    }
}

impl Eq for ResolvedRecord {}

impl Hash for ResolvedRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
    }
}

/// A cached record together with the time it was fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The resolved record
    pub record: ResolvedRecord,

    /// When the resolution round that produced it finished
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry fetched at `fetched_at`
    #[must_use]
    pub const fn new(record: ResolvedRecord, fetched_at: DateTime<Utc>) -> Self {
        Self { record, fetched_at }
    }

    /// The freshness window applied to every entry
    #[must_use]
    pub const fn freshness() -> TimeDelta {
        TimeDelta::hours(CACHE_FRESHNESS_HOURS)
    }

    /// Returns true while the entry is younger than the freshness window
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < Self::freshness()
    }
}
