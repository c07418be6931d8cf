//! In-memory proxy domain cache.

use altroute_core::{CacheEntry, KnownHost, ResolvedRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Proxy domains discovered per known host.
///
/// Every read and write goes through one mutex, pruning included, so a
/// round's merge can never interleave with an eviction from another
/// in-flight failure.
#[derive(Debug, Default)]
pub struct ProxyCache {
    entries: Mutex<HashMap<KnownHost, Vec<CacheEntry>>>,
}

impl ProxyCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<KnownHost, Vec<CacheEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The first usable entry for `host`, after pruning expired ones
    pub fn first_usable(&self, host: KnownHost, now: DateTime<Utc>) -> Option<CacheEntry> {
        let mut entries = self.lock();
        let list = entries.get_mut(&host)?;
        prune(list, now);
        list.first().cloned()
    }

    /// Returns true if `host` has at least one usable entry
    pub fn has_usable(&self, host: KnownHost, now: DateTime<Utc>) -> bool {
        self.first_usable(host, now).is_some()
    }

    /// Merge freshly resolved records for `host`, in the given order.
    ///
    /// A record naming an already cached hostname replaces that entry in
    /// place, taking the new fetch time.
    pub fn merge(&self, host: KnownHost, records: Vec<ResolvedRecord>, now: DateTime<Utc>) {
        let mut entries = self.lock();
        let list = entries.entry(host).or_default();
        prune(list, now);

        for record in records {
            let entry = CacheEntry::new(record, now);
            match list.iter_mut().find(|e| e.record == entry.record) {
                Some(existing) => *existing = entry,
                None => list.push(entry),
            }
        }

        trace!(host = %host, count = list.len(), "merged proxy records");
    }

    /// Remove `proxy_host` from the entries of `host`.
    ///
    /// Returns how many usable entries remain.
    pub fn evict(&self, host: KnownHost, proxy_host: &str, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let Some(list) = entries.get_mut(&host) else {
            return 0;
        };

        list.retain(|e| !e.record.host.eq_ignore_ascii_case(proxy_host));
        prune(list, now);
        list.len()
    }

    /// Every known host that has `proxy_host` cached, in declaration order
    pub fn owners_of(&self, proxy_host: &str, now: DateTime<Utc>) -> Vec<KnownHost> {
        let mut entries = self.lock();
        let mut owners: Vec<KnownHost> = entries
            .iter_mut()
            .filter_map(|(host, list)| {
                prune(list, now);
                list.iter()
                    .any(|e| e.record.host.eq_ignore_ascii_case(proxy_host))
                    .then_some(*host)
            })
            .collect();
        owners.sort();
        owners
    }

    /// Every usable proxy hostname, across all known hosts
    pub fn proxy_hosts(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut entries = self.lock();
        let mut hosts = Vec::new();
        for list in entries.values_mut() {
            prune(list, now);
            for entry in list.iter() {
                if !hosts.contains(&entry.record.host) {
                    hosts.push(entry.record.host.clone());
                }
            }
        }
        hosts
    }

    /// Snapshot of the usable entries for `host`, in cache order
    pub fn entries(&self, host: KnownHost, now: DateTime<Utc>) -> Vec<CacheEntry> {
        let mut entries = self.lock();
        entries.get_mut(&host).map_or_else(Vec::new, |list| {
            prune(list, now);
            list.clone()
        })
    }

    /// Number of usable entries for `host`
    pub fn len(&self, host: KnownHost, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        entries.get_mut(&host).map_or(0, |list| {
            prune(list, now);
            list.len()
        })
    }

    /// Returns true if no known host has a usable entry
    pub fn is_empty(&self, now: DateTime<Utc>) -> bool {
        let mut entries = self.lock();
        entries.values_mut().all(|list| {
            prune(list, now);
            list.is_empty()
        })
    }

    /// Drop everything
    pub fn clear(&self) {
        self.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, host: KnownHost, entry: CacheEntry) {
        self.lock().entry(host).or_default().push(entry);
    }
}

fn prune(list: &mut Vec<CacheEntry>, now: DateTime<Utc>) {
    list.retain(|e| e.is_usable(now));
}
