//! Application-tier cache.
//!
//! The shared-across-processes variant. On top of the base chain it
//! enforces the definition's locking demands: writes take the advisory
//! lock for their key and give up immediately (returning `false`) when
//! another owner holds it; reads under read-locking report contended
//! keys as misses. Locks never outlive the operation they guard.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use metrics::counter;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::context::RequestContext;
use crate::error::CacheError;
use crate::keys::CacheKey;
use crate::loader::{Cache, CacheLoader, Strictness};
use crate::lock::CacheLock;
use crate::telemetry::METRIC_CACHE_LOCK_DENIED_TOTAL;
use crate::value::{CacheValue, Cacheable};

/// Distinguishes loader instances created within one process; folded
/// into the owner token so two handles of the same definition can still
/// contend with each other.
static LOCK_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

const OWNER_TAG: &str = "application";

/// Base chain plus advisory locking.
pub struct ApplicationCache {
    inner: Cache,
    require_locking_read: bool,
    require_locking_write: bool,
    native_locking: bool,
    lock_backend: Arc<dyn CacheLock>,
    owner: OnceLock<String>,
}

impl ApplicationCache {
    /// Wrap a chain. `lock_backend` is only consulted when the primary
    /// store cannot lock natively.
    pub fn new(inner: Cache, lock_backend: Arc<dyn CacheLock>) -> Self {
        let locking = inner.definition().locking();
        let native_locking = inner.capabilities.native_locking;
        Self {
            inner,
            require_locking_read: locking.requires_read(),
            require_locking_write: locking.requires_write(),
            native_locking,
            lock_backend,
            owner: OnceLock::new(),
        }
    }

    pub fn inner(&self) -> &Cache {
        &self.inner
    }

    /// Owner token for this loader instance: hash of definition hash,
    /// session key and a process-wide instance counter. Reproducible
    /// enough to diagnose, unique enough to never collide.
    fn owner(&self, ctx: &RequestContext) -> &str {
        self.owner.get_or_init(|| {
            let instance = LOCK_INSTANCE_COUNTER.fetch_add(1, Ordering::SeqCst);
            let mut hasher = Sha256::new();
            hasher.update(self.inner.definition().hash().as_bytes());
            hasher.update(ctx.session_key.as_bytes());
            hasher.update(instance.to_le_bytes());
            hasher.update(OWNER_TAG.as_bytes());
            hex::encode(hasher.finalize())
        })
    }

    /// Single non-blocking attempt to take the lock for `key`.
    pub fn acquire_lock(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        let parsed = self.inner.parse_key(key);
        let owner = self.owner(ctx);
        let acquired = if self.native_locking {
            self.inner.store.acquire_lock(&parsed, owner)
        } else {
            self.lock_backend.lock(&parsed, owner)
        };
        if !acquired {
            counter!(METRIC_CACHE_LOCK_DENIED_TOTAL, "area" => self.inner.definition().id())
                .increment(1);
        }
        acquired
    }

    /// `Some(true)` when this instance holds the lock, `Some(false)`
    /// when another owner does, `None` when the key is unlocked.
    pub fn check_lock_state(&self, ctx: &RequestContext, key: &CacheKey) -> Option<bool> {
        let parsed = self.inner.parse_key(key);
        let owner = self.owner(ctx);
        if self.native_locking {
            self.inner.store.check_lock_state(&parsed, owner)
        } else {
            self.lock_backend.check_state(&parsed, owner)
        }
    }

    pub fn release_lock(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        let parsed = self.inner.parse_key(key);
        let owner = self.owner(ctx);
        if self.native_locking {
            self.inner.store.release_lock(&parsed, owner)
        } else {
            self.lock_backend.unlock(&parsed, owner)
        }
    }

    fn release_after(&self, ctx: &RequestContext, key: &CacheKey, op: &'static str) {
        if !self.release_lock(ctx, key) {
            warn!(op, %key, "Failed to release cache lock; another owner may stall");
        }
    }

    /// Store a value that knows its own compact cache form, under the
    /// same write-locking rules as `set`.
    pub fn set_cacheable<T: Cacheable>(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        object: &T,
    ) -> bool {
        if self.require_locking_write && !self.acquire_lock(ctx, key) {
            return false;
        }
        let stored = self.inner.set_cacheable(ctx, key, object);
        if self.require_locking_write {
            self.release_after(ctx, key, "set_cacheable");
        }
        stored
    }

    /// Fetch and rebuild a value stored through `set_cacheable`.
    pub fn get_cacheable<T: Cacheable>(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
    ) -> Option<T> {
        if self.require_locking_read && self.check_lock_state(ctx, key) == Some(false) {
            return None;
        }
        self.inner.get_cacheable(ctx, key)
    }

    /// `has` that additionally tries the fallback tiers, caching here
    /// on success.
    pub fn has_with_load(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        self.inner.has_with_load(ctx, key)
    }
}

impl CacheLoader for ApplicationCache {
    fn get_with(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        strictness: Strictness,
    ) -> Result<Option<CacheValue>, CacheError> {
        if self.require_locking_read && self.check_lock_state(ctx, key) == Some(false) {
            // Someone else holds the lock: the data is not currently
            // available, which is a miss rather than an error.
            return match strictness {
                Strictness::IgnoreMissing => Ok(None),
                Strictness::MustExist => Err(CacheError::LockDenied {
                    key: key.to_string(),
                }),
            };
        }
        self.inner.get_with(ctx, key, strictness)
    }

    fn get_many_with(
        &self,
        ctx: &RequestContext,
        keys: &[CacheKey],
        strictness: Strictness,
    ) -> Result<HashMap<CacheKey, Option<CacheValue>>, CacheError> {
        if !self.require_locking_read {
            return self.inner.get_many_with(ctx, keys, strictness);
        }

        let mut locked = Vec::new();
        for key in keys {
            if self.acquire_lock(ctx, key) {
                locked.push(key.clone());
            } else if strictness == Strictness::MustExist {
                for held in &locked {
                    self.release_after(ctx, held, "get_many");
                }
                return Err(CacheError::LockDenied {
                    key: key.to_string(),
                });
            }
            // Under IgnoreMissing a contended key is simply not read.
        }

        let result = self.inner.get_many_with(ctx, &locked, strictness);
        for held in &locked {
            self.release_after(ctx, held, "get_many");
        }
        result
    }

    fn set(&self, ctx: &RequestContext, key: &CacheKey, value: CacheValue) -> bool {
        if self.require_locking_write && !self.acquire_lock(ctx, key) {
            return false;
        }
        let stored = self.inner.set(ctx, key, value);
        if self.require_locking_write {
            self.release_after(ctx, key, "set");
        }
        stored
    }

    fn set_many(&self, ctx: &RequestContext, items: Vec<(CacheKey, CacheValue)>) -> usize {
        if !self.require_locking_write {
            return self.inner.set_many(ctx, items);
        }

        let mut locked = Vec::new();
        let mut writable = Vec::new();
        for (key, value) in items {
            if self.acquire_lock(ctx, &key) {
                locked.push(key.clone());
                writable.push((key, value));
            }
        }
        let written = self.inner.set_many(ctx, writable);
        for held in &locked {
            self.release_after(ctx, held, "set_many");
        }
        written
    }

    fn delete(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        if self.require_locking_write && !self.acquire_lock(ctx, key) {
            return false;
        }
        let deleted = self.inner.delete(ctx, key);
        if self.require_locking_write {
            self.release_after(ctx, key, "delete");
        }
        deleted
    }

    fn delete_many(&self, ctx: &RequestContext, keys: &[CacheKey]) -> usize {
        if !self.require_locking_write {
            return self.inner.delete_many(ctx, keys);
        }

        let mut locked = Vec::new();
        for key in keys {
            if self.acquire_lock(ctx, key) {
                locked.push(key.clone());
            }
        }
        let deleted = self.inner.delete_many(ctx, &locked);
        for held in &locked {
            self.release_after(ctx, held, "delete_many");
        }
        deleted
    }

    fn has(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        self.inner.has(ctx, key)
    }

    fn has_all(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        self.inner.has_all(ctx, keys)
    }

    fn has_any(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        self.inner.has_any(ctx, keys)
    }

    fn purge(&self, ctx: &RequestContext) -> bool {
        self.inner.purge(ctx)
    }

    fn set_identifiers(&self, identifiers: BTreeMap<String, String>) {
        self.inner.set_identifiers(identifiers);
    }

    fn invalidation_events(&self) -> Vec<String> {
        self.inner.invalidation_events()
    }
}
