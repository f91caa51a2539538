//! Static acceleration table.
//!
//! An in-process map consulted before the backing store, keyed by the
//! caller-supplied logical key so lookups stay independent of the
//! physical key scheme. Entries that are neither scalar nor covered by a
//! definition's simple-data promise are pre-serialized to JSON, so two
//! callers can never end up holding the same container.
//!
//! Eviction is by insertion order. A read moves the key to the
//! most-recently-used end; a write to an existing key replaces the entry
//! in place without touching the order.

use std::collections::{HashMap, VecDeque};

use tracing::warn;

use crate::keys::CacheKey;
use crate::store::Payload;
use crate::value::{CacheValue, ObjectEnvelope};

enum Slot {
    /// Scalar or simple-data value, stored as provided.
    Value(CacheValue),
    /// Pre-serialized container.
    Serialized(String),
    /// Object envelope, reference-free by contract.
    Object(ObjectEnvelope),
}

pub(crate) struct AccelerationTable {
    entries: HashMap<CacheKey, Slot>,
    /// Insertion order; maintained only when `max_size` is set.
    order: VecDeque<CacheKey>,
    max_size: Option<usize>,
}

impl AccelerationTable {
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Payload> {
        let decoded = match self.entries.get(key)? {
            Slot::Value(value) => Some(Payload::Plain(value.clone())),
            Slot::Object(envelope) => Some(Payload::Object(envelope.clone())),
            Slot::Serialized(json) => match serde_json::from_str(json) {
                Ok(value) => Some(Payload::Plain(value)),
                Err(err) => {
                    warn!(%key, error = %err, "Dropping undecodable accelerated entry");
                    None
                }
            },
        };
        match decoded {
            Some(payload) => {
                self.promote(key);
                Some(payload)
            }
            None => {
                self.delete(key);
                None
            }
        }
    }

    pub fn has(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn set(&mut self, key: CacheKey, payload: &Payload, simple_data: bool) {
        let slot = match payload {
            Payload::Object(envelope) => Slot::Object(envelope.clone()),
            Payload::Plain(value) if value.is_scalar() || simple_data => {
                Slot::Value(value.clone())
            }
            Payload::Plain(value) => match serde_json::to_string(value) {
                Ok(json) => Slot::Serialized(json),
                Err(err) => {
                    warn!(%key, error = %err, "Accelerated entry not serializable, storing as-is");
                    Slot::Value(value.clone())
                }
            },
        };

        let replaced = self.entries.insert(key.clone(), slot).is_some();
        if let Some(max) = self.max_size {
            if replaced {
                // Rewrites keep their eviction position.
                return;
            }
            self.order.push_back(key);
            if self.order.len() > max
                && let Some(evicted) = self.order.pop_front()
            {
                self.entries.remove(&evicted);
            }
        }
    }

    pub fn delete(&mut self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed && self.max_size.is_some() {
            self.order.retain(|queued| queued != key);
        }
        removed
    }

    pub fn purge(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Move a just-read key to the most-recently-used end so hot keys
    /// are not the next eviction candidates.
    fn promote(&mut self, key: &CacheKey) {
        if self.max_size.is_none_or(|max| max <= 1) || self.order.len() <= 1 {
            return;
        }
        if self.order.back() == Some(key) {
            return;
        }
        if let Some(position) = self.order.iter().position(|queued| queued == key) {
            self.order.remove(position);
            self.order.push_back(key.clone());
        }
    }
}
