//! Store adapter interface.
//!
//! Backends expose one uniform surface plus an explicit capability
//! record. The loader probes capabilities once at construction and
//! branches on them at every decision point; a backend's capabilities
//! are data it declares, never something inferred at call time.

mod memory;

pub use memory::{MemoryStore, MemoryStoreConfig};

use crate::keys::StoreKey;
use crate::ttl::TtlWrapper;
use crate::value::{CacheValue, ObjectEnvelope};

/// An unwrapped cache payload: either a plain value or the compact
/// envelope of a cacheable object.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Plain(CacheValue),
    Object(ObjectEnvelope),
}

impl Payload {
    /// True when the payload can never share structure with anything.
    /// Object envelopes count: their compact form is reference-free by
    /// contract.
    pub fn is_reference_free(&self) -> bool {
        match self {
            Payload::Plain(value) => value.is_scalar(),
            Payload::Object(_) => true,
        }
    }
}

/// The physical envelope a store holds for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Plain(CacheValue),
    Object(ObjectEnvelope),
    Ttl(TtlWrapper),
}

impl From<Payload> for StoredValue {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Plain(value) => StoredValue::Plain(value),
            Payload::Object(envelope) => StoredValue::Object(envelope),
        }
    }
}

/// What a backend can do, declared once at registration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// The store expires entries itself; no wrapper simulation needed.
    pub native_ttl: bool,
    /// `has` can answer without fetching the value.
    pub key_aware: bool,
    /// The store implements the lock operations directly.
    pub native_locking: bool,
    /// The store understands structured identifier-part keys.
    pub multi_identifiers: bool,
    /// Values returned by the store are already safe from external
    /// mutation; the loader can skip defensive copying.
    pub dereferences_values: bool,
    /// `find_by_prefix` is implemented. Required for session stores.
    pub searchable: bool,
}

/// Uniform surface over heterogeneous cache backends.
///
/// `get_many`/`set_many`/`delete_many` results align positionally with
/// their input slices. Locking methods are only called on stores whose
/// capabilities declare `native_locking`; the defaults refuse.
pub trait CacheStore: Send + Sync {
    /// Short backend label, used for diagnostics and metric labels.
    fn name(&self) -> &str;

    fn capabilities(&self) -> StoreCapabilities;

    fn get(&self, key: &StoreKey) -> Option<StoredValue>;

    fn get_many(&self, keys: &[StoreKey]) -> Vec<Option<StoredValue>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    fn set(&self, key: &StoreKey, value: StoredValue) -> bool;

    fn set_many(&self, items: Vec<(StoreKey, StoredValue)>) -> usize {
        items
            .into_iter()
            .map(|(key, value)| self.set(&key, value))
            .filter(|ok| *ok)
            .count()
    }

    fn delete(&self, key: &StoreKey) -> bool;

    fn delete_many(&self, keys: &[StoreKey]) -> usize {
        keys.iter().filter(|key| self.delete(key)).count()
    }

    fn has(&self, key: &StoreKey) -> bool;

    fn has_all(&self, keys: &[StoreKey]) -> bool {
        keys.iter().all(|key| self.has(key))
    }

    fn has_any(&self, keys: &[StoreKey]) -> bool {
        keys.iter().any(|key| self.has(key))
    }

    /// Drop every entry. Must not fail partially within this store.
    fn purge(&self) -> bool;

    /// Try to take the advisory lock for `key` on behalf of `owner`.
    /// Re-entrant for the same owner. Single attempt, no blocking.
    fn acquire_lock(&self, _key: &StoreKey, _owner: &str) -> bool {
        false
    }

    fn release_lock(&self, _key: &StoreKey, _owner: &str) -> bool {
        false
    }

    /// `Some(true)` when `owner` holds the lock, `Some(false)` when
    /// another owner does, `None` when the key is unlocked.
    fn check_lock_state(&self, _key: &StoreKey, _owner: &str) -> Option<bool> {
        None
    }

    /// Flattened keys currently stored under `prefix`. Only meaningful
    /// when the store declares `searchable`.
    fn find_by_prefix(&self, _prefix: &str) -> Vec<String> {
        Vec::new()
    }
}
