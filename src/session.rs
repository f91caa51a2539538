//! Session-tier cache.
//!
//! Keys are namespaced by the current user and session so one user's
//! entries can never surface for another, and the namespace is
//! re-checked on every operation: when the tracked user changes, the
//! old user's data is purged before the new identity is adopted. The
//! session tier never uses static acceleration; a stale in-process
//! shadow is exactly the bug the namespacing exists to prevent.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::context::RequestContext;
use crate::error::CacheError;
use crate::keys::{CacheKey, StoreKey};
use crate::loader::{Cache, CacheLoader, NextTier, Strictness, Unwrapped};
use crate::store::{Payload, StoredValue};
use crate::sync::{rw_read, rw_write};
use crate::ttl::TtlWrapper;
use crate::value::CacheValue;

const SOURCE: &str = "session";

/// Prefix marking session entries in a shared store.
const KEY_PREFIX: &str = "sess_";

/// Reserved key tracking when this session cache was last touched.
const LAST_ACCESS_KEY: &str = "__lastaccess__";

/// Tracked-user state shared by every session cache of one factory.
pub(crate) type TrackedUser = Arc<RwLock<Option<i64>>>;

/// Base chain plus per-user/session namespacing.
pub struct SessionCache {
    inner: Cache,
    tracked_user: TrackedUser,
    current_user: RwLock<Option<i64>>,
    session_key: RwLock<String>,
}

impl SessionCache {
    /// Wrap a tier. Also stamps the last-access marker, which runs the
    /// first tracked-user check.
    pub(crate) fn new(mut inner: Cache, tracked_user: TrackedUser, ctx: &RequestContext) -> Self {
        inner.strip_acceleration();
        let current = *rw_read(&tracked_user, SOURCE, "new");
        let cache = Self {
            inner,
            tracked_user,
            current_user: RwLock::new(current),
            session_key: RwLock::new(sanitize_session_key(&ctx.session_key)),
        };
        cache.set(
            ctx,
            &CacheKey::from(LAST_ACCESS_KEY),
            CacheValue::Int(ctx.now),
        );
        cache
    }

    pub fn inner(&self) -> &Cache {
        &self.inner
    }

    fn prefix_for(&self, user: Option<i64>) -> String {
        format!(
            "u{}_{}",
            user.unwrap_or(0),
            rw_read(&self.session_key, SOURCE, "prefix")
        )
    }

    fn key_prefix(&self) -> String {
        self.prefix_for(*rw_read(&self.current_user, SOURCE, "key_prefix"))
    }

    /// Physical key: the base codec's output, namespaced by user and
    /// session. The last-access marker sorts outside the namespace so
    /// session housekeeping can find it without knowing any user.
    pub fn parse_key(&self, key: &CacheKey) -> StoreKey {
        let prefix = self.key_prefix();
        if key.as_key_string() == LAST_ACCESS_KEY {
            return StoreKey::Flat(format!("{LAST_ACCESS_KEY}{prefix}"));
        }
        match self.inner.parse_key(key) {
            StoreKey::Flat(hashed) => StoreKey::Flat(format!("{KEY_PREFIX}{prefix}_{hashed}")),
            StoreKey::Parts { identifiers, key } => StoreKey::Parts {
                identifiers,
                key: format!("{KEY_PREFIX}{prefix}_{key}"),
            },
        }
    }

    /// Re-check the namespace against the request's user.
    ///
    /// A change of the globally tracked user purges this cache before
    /// the new identity is adopted. When only this instance is stale
    /// (the global user moved on while this handle was idle), just the
    /// stale user's keys are deleted.
    fn check_tracked_user(&self, ctx: &RequestContext) {
        let new_user = ctx.user_id;
        let mut tracked = rw_write(&self.tracked_user, SOURCE, "check_tracked_user");
        if *tracked != new_user {
            if tracked.is_some() {
                debug!(
                    old_user = ?*tracked,
                    ?new_user,
                    "Tracked user changed, purging session cache"
                );
                self.inner.purge(ctx);
                self.refresh_session_key(ctx);
            }
            *tracked = new_user;
            *rw_write(&self.current_user, SOURCE, "check_tracked_user") = new_user;
        } else {
            let stale = *rw_read(&self.current_user, SOURCE, "check_tracked_user");
            if stale != new_user {
                debug!(?stale, ?new_user, "Instance user out of date, purging its keys");
                self.purge_user_keys(self.prefix_for(stale));
                *rw_write(&self.current_user, SOURCE, "check_tracked_user") = new_user;
                self.refresh_session_key(ctx);
            }
        }
    }

    fn refresh_session_key(&self, ctx: &RequestContext) {
        *rw_write(&self.session_key, SOURCE, "refresh_session_key") =
            sanitize_session_key(&ctx.session_key);
    }

    /// Delete every stored key belonging to the current user.
    pub fn purge_current_user(&self) {
        self.purge_user_keys(self.key_prefix());
    }

    fn purge_user_keys(&self, prefix: String) {
        let found = self
            .inner
            .store
            .find_by_prefix(&format!("{KEY_PREFIX}{prefix}"));
        if found.is_empty() {
            return;
        }
        let keys: Vec<StoreKey> = found.into_iter().map(StoreKey::Flat).collect();
        self.inner.store.delete_many(&keys);
    }

    fn fallback(&self, ctx: &RequestContext, key: &CacheKey) -> Option<Payload> {
        match &self.inner.next {
            NextTier::Loader(loader) => loader.fetch_payload(ctx, key),
            NextTier::Source(source) => source.load_for_cache(key).map(Payload::Plain),
            NextTier::Terminal => None,
        }
    }

    fn write_payload(&self, ctx: &RequestContext, key: &CacheKey, payload: Payload) -> bool {
        self.inner.record_set(1);
        let payload = self.inner.detach_for_store(payload);
        let stored = if self.inner.simulates_ttl() {
            let ttl = self.inner.definition().ttl();
            StoredValue::Ttl(TtlWrapper::new(payload, ttl, ctx.now))
        } else {
            payload.into()
        };
        self.inner.store.set(&self.parse_key(key), stored)
    }

    /// `has` that additionally tries the fallback tiers, caching the
    /// result here on success. The one membership test with a side
    /// effect.
    pub fn has_with_load(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        if self.has(ctx, key) {
            return true;
        }
        match self.fallback(ctx, key) {
            Some(payload) => {
                self.write_payload(ctx, key, payload);
                true
            }
            None => false,
        }
    }
}

impl CacheLoader for SessionCache {
    fn get_with(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        strictness: Strictness,
    ) -> Result<Option<CacheValue>, CacheError> {
        self.check_tracked_user(ctx);
        let parsed = self.parse_key(key);

        let mut found = None;
        if let Some(stored) = self.inner.store.get(&parsed) {
            match self.inner.unwrap_stored(stored, ctx.now) {
                Unwrapped::Expired => {
                    self.inner.store.delete(&parsed);
                }
                Unwrapped::Unusable => {}
                Unwrapped::Payload(payload) => found = Some(payload),
            }
        }

        if found.is_some() {
            self.inner.record_hit(self.inner.store_name(), 1);
        } else {
            self.inner.record_miss(1);
            if let Some(payload) = self.fallback(ctx, key) {
                self.write_payload(ctx, key, payload.clone());
                found = Some(payload);
            }
        }

        if found.is_none() && strictness == Strictness::MustExist {
            return Err(CacheError::MissingKey {
                key: key.to_string(),
            });
        }
        Ok(found.map(|payload| self.inner.finalize(payload)))
    }

    fn get_many_with(
        &self,
        ctx: &RequestContext,
        keys: &[CacheKey],
        strictness: Strictness,
    ) -> Result<HashMap<CacheKey, Option<CacheValue>>, CacheError> {
        self.check_tracked_user(ctx);

        let parsed: Vec<StoreKey> = keys.iter().map(|key| self.parse_key(key)).collect();
        let fetched = self.inner.store.get_many(&parsed);

        let mut payloads: Vec<Option<Payload>> = Vec::with_capacity(keys.len());
        for (key, stored) in keys.iter().zip(fetched) {
            let payload = stored.and_then(|stored| {
                match self.inner.unwrap_stored(stored, ctx.now) {
                    Unwrapped::Expired => {
                        self.delete(ctx, key);
                        None
                    }
                    Unwrapped::Unusable => None,
                    Unwrapped::Payload(payload) => Some(payload),
                }
            });
            payloads.push(payload);
        }

        let missing: Vec<usize> = (0..keys.len()).filter(|&i| payloads[i].is_none()).collect();
        if !missing.is_empty() {
            let missing_keys: Vec<CacheKey> = missing.iter().map(|&i| keys[i].clone()).collect();
            let loaded: Vec<Option<Payload>> = match &self.inner.next {
                NextTier::Loader(loader) => loader.fetch_many_payloads(ctx, &missing_keys),
                NextTier::Source(source) => source
                    .load_many_for_cache(&missing_keys)
                    .into_iter()
                    .map(|value| value.map(Payload::Plain))
                    .collect(),
                NextTier::Terminal => vec![None; missing_keys.len()],
            };
            for (&index, payload) in missing.iter().zip(loaded) {
                if let Some(payload) = payload {
                    self.write_payload(ctx, &keys[index], payload.clone());
                    payloads[index] = Some(payload);
                }
            }
        }

        let mut unresolved = Vec::new();
        let mut results = HashMap::with_capacity(keys.len());
        let mut hits = 0u64;
        for (key, payload) in keys.iter().zip(payloads) {
            match payload {
                Some(payload) => {
                    hits += 1;
                    results.insert(key.clone(), Some(self.inner.finalize(payload)));
                }
                None => {
                    unresolved.push(key.to_string());
                    results.insert(key.clone(), None);
                }
            }
        }
        if hits > 0 {
            self.inner.record_hit(self.inner.store_name(), hits);
        }
        if !unresolved.is_empty() {
            self.inner.record_miss(unresolved.len() as u64);
        }

        if strictness == Strictness::MustExist && !unresolved.is_empty() {
            return Err(CacheError::MissingKeys { keys: unresolved });
        }
        Ok(results)
    }

    fn set(&self, ctx: &RequestContext, key: &CacheKey, value: CacheValue) -> bool {
        self.check_tracked_user(ctx);
        self.write_payload(ctx, key, Payload::Plain(value))
    }

    fn set_many(&self, ctx: &RequestContext, items: Vec<(CacheKey, CacheValue)>) -> usize {
        self.check_tracked_user(ctx);
        let simulate_ttl = self.inner.simulates_ttl();
        let ttl = self.inner.definition().ttl();

        let mut batch = Vec::with_capacity(items.len());
        for (key, value) in items {
            let payload = self.inner.detach_for_store(Payload::Plain(value));
            let stored = if simulate_ttl {
                StoredValue::Ttl(TtlWrapper::new(payload, ttl, ctx.now))
            } else {
                payload.into()
            };
            batch.push((self.parse_key(&key), stored));
        }
        let written = self.inner.store.set_many(batch);
        self.inner.record_set(written as u64);
        written
    }

    fn delete(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        let parsed = self.parse_key(key);
        if let NextTier::Loader(loader) = &self.inner.next {
            loader.delete_with_recurse(ctx, key, true);
        }
        self.inner.store.delete(&parsed)
    }

    fn delete_many(&self, ctx: &RequestContext, keys: &[CacheKey]) -> usize {
        let parsed: Vec<StoreKey> = keys.iter().map(|key| self.parse_key(key)).collect();
        if let NextTier::Loader(loader) = &self.inner.next {
            loader.delete_many_with_recurse(ctx, keys, true);
        }
        self.inner.store.delete_many(&parsed)
    }

    fn has(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        self.check_tracked_user(ctx);
        let parsed = self.parse_key(key);
        if self.inner.simulates_ttl() {
            matches!(
                self.inner.store.get(&parsed),
                Some(StoredValue::Ttl(wrapper)) if !wrapper.has_expired(ctx.now)
            )
        } else if !self.inner.capabilities.key_aware {
            self.inner.store.get(&parsed).is_some()
        } else {
            self.inner.store.has(&parsed)
        }
    }

    fn has_all(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        self.check_tracked_user(ctx);
        if self.inner.simulates_ttl() || !self.inner.capabilities.key_aware {
            return keys.iter().all(|key| self.has(ctx, key));
        }
        let parsed: Vec<StoreKey> = keys.iter().map(|key| self.parse_key(key)).collect();
        self.inner.store.has_all(&parsed)
    }

    fn has_any(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        self.check_tracked_user(ctx);
        if self.inner.simulates_ttl() || !self.inner.capabilities.key_aware {
            return keys.iter().any(|key| self.has(ctx, key));
        }
        let parsed: Vec<StoreKey> = keys.iter().map(|key| self.parse_key(key)).collect();
        self.inner.store.has_any(&parsed)
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

/// Session keys come from transport-level ids; reduce them to a safe
/// store-key alphabet.
fn sanitize_session_key(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
