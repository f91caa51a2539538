//! In-memory store backend.
//!
//! The reference backend: a capacity-bounded map behind an `RwLock`,
//! with every capability configurable so one backend can stand in for
//! the whole range of real ones (key-aware or not, native TTL or not,
//! lockable or not). Production deployments use it for request- and
//! process-local tiers; tests use it for everything.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::RwLock;

use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;

use crate::keys::StoreKey;
use crate::sync::{rw_read, rw_write};
use crate::telemetry::METRIC_STORE_EVICT_TOTAL;

use super::{CacheStore, StoreCapabilities, StoredValue};

const SOURCE: &str = "store::memory";

const DEFAULT_CAPACITY: usize = 10_000;

/// Configuration for a [`MemoryStore`] instance.
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Backend label for diagnostics and metrics.
    pub name: String,
    /// Maximum number of entries before least-recently-used eviction.
    pub capacity: usize,
    /// Expire entries in the store itself, using this TTL in seconds.
    /// `None` leaves expiry to the loader's wrapper simulation.
    pub ttl: Option<i64>,
    pub native_ttl: bool,
    pub key_aware: bool,
    pub native_locking: bool,
    pub multi_identifiers: bool,
    pub dereferences_values: bool,
    pub searchable: bool,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            capacity: DEFAULT_CAPACITY,
            ttl: None,
            native_ttl: false,
            key_aware: true,
            native_locking: false,
            multi_identifiers: false,
            dereferences_values: false,
            searchable: true,
        }
    }
}

impl MemoryStoreConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

struct Entry {
    value: StoredValue,
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// Capacity-bounded in-memory backend.
pub struct MemoryStore {
    config: MemoryStoreConfig,
    capabilities: StoreCapabilities,
    entries: RwLock<LruCache<String, Entry>>,
    locks: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        let capabilities = StoreCapabilities {
            native_ttl: config.native_ttl,
            key_aware: config.key_aware,
            native_locking: config.native_locking,
            multi_identifiers: config.multi_identifiers,
            dereferences_values: config.dereferences_values,
            searchable: config.searchable,
        };
        let capacity = config.capacity_non_zero();
        Self {
            config,
            capabilities,
            entries: RwLock::new(LruCache::new(capacity)),
            locks: RwLock::new(HashMap::new()),
        }
    }

    fn wallclock(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    fn record_eviction(&self) {
        counter!(METRIC_STORE_EVICT_TOTAL, "store" => self.config.name.clone()).increment(1);
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn get(&self, key: &StoreKey) -> Option<StoredValue> {
        let flat = key.flatten().into_owned();
        let now = self.wallclock();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        if entries.peek(&flat).is_some_and(|entry| entry.is_expired(now)) {
            entries.pop(&flat);
            return None;
        }
        entries.get(&flat).map(|entry| entry.value.clone())
    }

    fn set(&self, key: &StoreKey, value: StoredValue) -> bool {
        let flat = key.flatten().into_owned();
        let expires_at = match (self.capabilities.native_ttl, self.config.ttl) {
            (true, Some(ttl)) => Some(self.wallclock() + ttl),
            _ => None,
        };
        let evicted = rw_write(&self.entries, SOURCE, "set").push(
            flat.clone(),
            Entry { value, expires_at },
        );
        if let Some((evicted_key, _)) = evicted
            && evicted_key != flat
        {
            self.record_eviction();
        }
        true
    }

    fn delete(&self, key: &StoreKey) -> bool {
        rw_write(&self.entries, SOURCE, "delete")
            .pop(key.flatten().as_ref())
            .is_some()
    }

    fn has(&self, key: &StoreKey) -> bool {
        let now = self.wallclock();
        rw_read(&self.entries, SOURCE, "has")
            .peek(key.flatten().as_ref())
            .is_some_and(|entry| !entry.is_expired(now))
    }

    fn purge(&self) -> bool {
        rw_write(&self.entries, SOURCE, "purge").clear();
        true
    }

    fn acquire_lock(&self, key: &StoreKey, owner: &str) -> bool {
        let flat = key.flatten().into_owned();
        let mut locks = rw_write(&self.locks, SOURCE, "acquire_lock");
        match locks.get(&flat) {
            Some(holder) => holder == owner,
            None => {
                locks.insert(flat, owner.to_string());
                true
            }
        }
    }

    fn release_lock(&self, key: &StoreKey, owner: &str) -> bool {
        let flat = key.flatten().into_owned();
        let mut locks = rw_write(&self.locks, SOURCE, "release_lock");
        if locks.get(&flat).is_some_and(|holder| holder == owner) {
            locks.remove(&flat);
            true
        } else {
            false
        }
    }

    fn check_lock_state(&self, key: &StoreKey, owner: &str) -> Option<bool> {
        rw_read(&self.locks, SOURCE, "check_lock_state")
            .get(key.flatten().as_ref())
            .map(|holder| holder == owner)
    }

    fn find_by_prefix(&self, prefix: &str) -> Vec<String> {
        let now = self.wallclock();
        rw_read(&self.entries, SOURCE, "find_by_prefix")
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CacheValue;

    fn flat(key: &str) -> StoreKey {
        StoreKey::Flat(key.to_string())
    }

    fn plain(value: i64) -> StoredValue {
        StoredValue::Plain(CacheValue::Int(value))
    }

    #[test]
    fn set_get_delete_roundtrip() {
        let store = MemoryStore::new(MemoryStoreConfig::default());

        assert!(store.get(&flat("a")).is_none());
        assert!(store.set(&flat("a"), plain(1)));
        assert_eq!(store.get(&flat("a")), Some(plain(1)));
        assert!(store.has(&flat("a")));

        assert!(store.delete(&flat("a")));
        assert!(!store.delete(&flat("a")));
        assert!(store.get(&flat("a")).is_none());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let store = MemoryStore::new(MemoryStoreConfig {
            capacity: 2,
            ..Default::default()
        });

        store.set(&flat("a"), plain(1));
        store.set(&flat("b"), plain(2));
        store.set(&flat("c"), plain(3));

        assert!(store.get(&flat("a")).is_none());
        assert!(store.get(&flat("b")).is_some());
        assert!(store.get(&flat("c")).is_some());
    }

    #[test]
    fn purge_clears_everything() {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        store.set(&flat("a"), plain(1));
        store.set(&flat("b"), plain(2));

        assert!(store.purge());
        assert!(store.get(&flat("a")).is_none());
        assert!(store.get(&flat("b")).is_none());
    }

    #[test]
    fn lock_is_exclusive_and_reentrant() {
        let store = MemoryStore::new(MemoryStoreConfig {
            native_locking: true,
            ..Default::default()
        });
        let key = flat("k");

        assert!(store.acquire_lock(&key, "alice"));
        assert!(store.acquire_lock(&key, "alice"));
        assert!(!store.acquire_lock(&key, "bob"));

        assert_eq!(store.check_lock_state(&key, "alice"), Some(true));
        assert_eq!(store.check_lock_state(&key, "bob"), Some(false));

        assert!(!store.release_lock(&key, "bob"));
        assert!(store.release_lock(&key, "alice"));
        assert_eq!(store.check_lock_state(&key, "alice"), None);
        assert!(store.acquire_lock(&key, "bob"));
    }

    #[test]
    fn prefix_search_matches_flattened_keys() {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        store.set(&flat("u1_s1_a"), plain(1));
        store.set(&flat("u1_s1_b"), plain(2));
        store.set(&flat("u2_s1_a"), plain(3));

        let mut found = store.find_by_prefix("u1_s1");
        found.sort();
        assert_eq!(found, vec!["u1_s1_a".to_string(), "u1_s1_b".to_string()]);
    }

    #[test]
    fn parts_keys_flatten_consistently() {
        let store = MemoryStore::new(MemoryStoreConfig {
            multi_identifiers: true,
            ..Default::default()
        });
        let key = StoreKey::Parts {
            identifiers: vec![("lang".to_string(), "en".to_string())],
            key: "greeting".to_string(),
        };

        store.set(&key, plain(1));
        assert_eq!(store.get(&key), Some(plain(1)));
        assert!(store.has(&StoreKey::Flat("lang=en/greeting".to_string())));
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let config = MemoryStoreConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}
