//! The cache loader.
//!
//! `Cache` is one tier of a loader chain. A lookup resolves through the
//! static acceleration table, then the tier's store, then whatever comes
//! next: another loader, a data source, or nothing. Whatever a lower
//! tier produces is written back into this tier on the way out, so the
//! next lookup hits here. Writes flow through the whole chain
//! unconditionally; the chain is a replication path, not an eviction
//! hierarchy.
//!
//! `CacheLoader` is the operation surface shared by every tier variant;
//! it also carries the invalidation sweep that reconciles a cache with
//! the shared event records at construction time.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::debug;

use crate::acceleration::AccelerationTable;
use crate::context::RequestContext;
use crate::definition::CacheDefinition;
use crate::error::CacheError;
use crate::invalidation::{LAST_INVALIDATION_KEY, plan_sweep};
use crate::keys::{CacheKey, StoreKey, hash_key};
use crate::store::{CacheStore, Payload, StoreCapabilities, StoredValue};
use crate::sync::{rw_read, rw_write};
use crate::telemetry::{
    ACCELERATION_STORE_LABEL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL,
    METRIC_CACHE_SET_TOTAL, METRIC_CACHE_SWEEP_MS,
};
use crate::ttl::TtlWrapper;
use crate::value::{CacheValue, Cacheable, ObjectEnvelope, detach};

const SOURCE: &str = "loader";

/// How a lookup treats a final miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// A miss is an ordinary `None`.
    IgnoreMissing,
    /// A miss after full chain resolution is a caller bug and fails.
    MustExist,
}

/// Ultimate fallback consulted when a key misses every cache tier.
pub trait DataSource: Send + Sync {
    fn load_for_cache(&self, key: &CacheKey) -> Option<CacheValue>;

    /// Results align positionally with `keys`.
    fn load_many_for_cache(&self, keys: &[CacheKey]) -> Vec<Option<CacheValue>> {
        keys.iter().map(|key| self.load_for_cache(key)).collect()
    }
}

/// What a tier falls back to on a miss. A tier has a chained loader, a
/// data source, or nothing; it can never have two fallbacks at once.
pub enum NextTier {
    Loader(Box<Cache>),
    Source(Arc<dyn DataSource>),
    Terminal,
}

// ============================================================================
// Operation surface
// ============================================================================

/// Operations every loader variant exposes to callers.
pub trait CacheLoader {
    fn get_with(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        strictness: Strictness,
    ) -> Result<Option<CacheValue>, CacheError>;

    /// The result map holds every requested key; misses map to `None`.
    fn get_many_with(
        &self,
        ctx: &RequestContext,
        keys: &[CacheKey],
        strictness: Strictness,
    ) -> Result<HashMap<CacheKey, Option<CacheValue>>, CacheError>;

    fn set(&self, ctx: &RequestContext, key: &CacheKey, value: CacheValue) -> bool;

    /// Returns the number of items successfully written to this tier.
    fn set_many(&self, ctx: &RequestContext, items: Vec<(CacheKey, CacheValue)>) -> usize;

    fn delete(&self, ctx: &RequestContext, key: &CacheKey) -> bool;

    fn delete_many(&self, ctx: &RequestContext, keys: &[CacheKey]) -> usize;

    fn has(&self, ctx: &RequestContext, key: &CacheKey) -> bool;

    fn has_all(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool;

    fn has_any(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool;

    /// Drop this cache's data in every tier. Best effort: a failing
    /// tier does not stop the others from purging.
    fn purge(&self, ctx: &RequestContext) -> bool;

    /// Swap the definition's identifier set, discarding accelerated
    /// entries since their keys were minted under the old hash.
    fn set_identifiers(&self, identifiers: BTreeMap<String, String>);

    fn invalidation_events(&self) -> Vec<String>;

    fn get(&self, ctx: &RequestContext, key: &CacheKey) -> Option<CacheValue> {
        self.get_with(ctx, key, Strictness::IgnoreMissing)
            .unwrap_or(None)
    }

    fn get_many(
        &self,
        ctx: &RequestContext,
        keys: &[CacheKey],
    ) -> HashMap<CacheKey, Option<CacheValue>> {
        self.get_many_with(ctx, keys, Strictness::IgnoreMissing)
            .unwrap_or_default()
    }

    /// Reconcile this cache with the shared event records.
    ///
    /// A fresh (or just-purged) cache only stamps its checkpoint. A
    /// cache already swept at this request's frozen now is left alone,
    /// which is what makes repeated sweeps within one request no-ops.
    /// Otherwise every subscribed event record is scanned for keys
    /// stamped at or after the checkpoint; a `"purged"` sentinel purges
    /// the whole cache, anything else is bulk-deleted. Returns true
    /// when the sweep purged or deleted anything.
    fn sweep_invalidation_events(&self, ctx: &RequestContext, events: &Cache) -> bool {
        let subscribed = self.invalidation_events();
        if subscribed.is_empty() {
            return false;
        }

        let checkpoint_key = CacheKey::from(LAST_INVALIDATION_KEY);
        let checkpoint = match self.get(ctx, &checkpoint_key).and_then(|v| v.as_int()) {
            None => {
                // New or globally purged: nothing can predate us.
                self.set(ctx, &checkpoint_key, CacheValue::Int(ctx.now));
                return false;
            }
            Some(stamp) if stamp == ctx.now => return false,
            Some(stamp) => stamp,
        };

        let sweep_started_at = Instant::now();
        let event_keys: Vec<CacheKey> = subscribed.into_iter().map(CacheKey::Str).collect();
        let records = events.get_many(ctx, &event_keys);
        let plan = plan_sweep(&records, checkpoint);

        let acted = if plan.purge_all {
            self.purge(ctx);
            true
        } else if !plan.delete.is_empty() {
            self.delete_many(ctx, &plan.delete);
            true
        } else {
            false
        };

        if acted {
            debug!(
                purged = plan.purge_all,
                deleted = plan.delete.len(),
                "Cache invalidation sweep applied"
            );
            self.set(ctx, &checkpoint_key, CacheValue::Int(ctx.now));
        }
        histogram!(METRIC_CACHE_SWEEP_MS)
            .record(sweep_started_at.elapsed().as_secs_f64() * 1000.0);
        acted
    }
}

// ============================================================================
// Base loader
// ============================================================================

pub(crate) enum Unwrapped {
    /// Physical entry exists but is not usable (wrong envelope shape).
    Unusable,
    /// TTL wrapper past its expiry; the physical entry should go.
    Expired,
    Payload(Payload),
}

/// One tier of a loader chain.
pub struct Cache {
    pub(crate) definition: Arc<RwLock<CacheDefinition>>,
    pub(crate) store: Arc<dyn CacheStore>,
    pub(crate) capabilities: StoreCapabilities,
    pub(crate) next: NextTier,
    acceleration: Option<RwLock<AccelerationTable>>,
    sub_loader: bool,
    store_name: String,
    area_label: String,
}

impl Cache {
    /// A tier owning its definition. Chains that share one definition
    /// across tiers are assembled through [`Cache::from_shared`].
    pub fn new(definition: CacheDefinition, store: Arc<dyn CacheStore>, next: NextTier) -> Self {
        Self::from_shared(Arc::new(RwLock::new(definition)), store, next)
    }

    /// A tier over an already-shared definition. Marks a chained tier
    /// as a sub-loader, which strips its acceleration: only the top of
    /// a chain may keep an in-process shadow of the data.
    pub fn from_shared(
        definition: Arc<RwLock<CacheDefinition>>,
        store: Arc<dyn CacheStore>,
        mut next: NextTier,
    ) -> Self {
        if let NextTier::Loader(loader) = &mut next {
            loader.mark_sub_loader();
        }
        let capabilities = store.capabilities();
        let (acceleration, area_label) = {
            let def = rw_read(&definition, SOURCE, "new");
            let table = def
                .use_static_acceleration()
                .then(|| RwLock::new(AccelerationTable::new(def.static_acceleration_size())));
            (table, def.id())
        };
        let store_name = store.name().to_string();
        Self {
            definition,
            store,
            capabilities,
            next,
            acceleration,
            sub_loader: false,
            store_name,
            area_label,
        }
    }

    fn mark_sub_loader(&mut self) {
        self.sub_loader = true;
        self.acceleration = None;
    }

    /// Drop the acceleration table without marking the tier as a
    /// sub-loader. The session variant needs this: it sits at the top
    /// of its chain but must never keep an in-process shadow.
    pub(crate) fn strip_acceleration(&mut self) {
        self.acceleration = None;
    }

    pub(crate) fn store_name(&self) -> &str {
        &self.store_name
    }

    pub(crate) fn definition(&self) -> RwLockReadGuard<'_, CacheDefinition> {
        rw_read(&self.definition, SOURCE, "definition")
    }

    /// Physical key for a logical key under the current definition.
    pub fn parse_key(&self, key: &CacheKey) -> StoreKey {
        let def = self.definition();
        if self.capabilities.multi_identifiers {
            StoreKey::Parts {
                identifiers: def.identifier_parts(),
                key: key.as_key_string().into_owned(),
            }
        } else {
            StoreKey::Flat(hash_key(key, def.hash()))
        }
    }

    pub(crate) fn simulates_ttl(&self) -> bool {
        self.definition().has_ttl() && !self.capabilities.native_ttl
    }

    fn accelerated<R>(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut AccelerationTable) -> R,
    ) -> Option<R> {
        if self.sub_loader {
            return None;
        }
        self.acceleration
            .as_ref()
            .map(|table| apply(&mut rw_write(table, SOURCE, op)))
    }

    /// Unwrap a physical entry under this tier's TTL rules.
    ///
    /// Any TTL wrapper found is expiry-checked, even if the definition
    /// no longer simulates TTL. Conversely, a bare payload where a
    /// wrapper was expected is unusable and degrades to a miss.
    pub(crate) fn unwrap_stored(&self, stored: StoredValue, now: i64) -> Unwrapped {
        match stored {
            StoredValue::Ttl(wrapper) => {
                if wrapper.has_expired(now) {
                    Unwrapped::Expired
                } else {
                    Unwrapped::Payload(wrapper.into_payload())
                }
            }
            StoredValue::Plain(value) => {
                if self.simulates_ttl() {
                    Unwrapped::Unusable
                } else {
                    Unwrapped::Payload(Payload::Plain(value))
                }
            }
            StoredValue::Object(envelope) => {
                if self.simulates_ttl() {
                    Unwrapped::Unusable
                } else {
                    Unwrapped::Payload(Payload::Object(envelope))
                }
            }
        }
    }

    /// Resolve a key through store and fallback tiers, filling this
    /// tier on the way out. Acceleration is only read by the public
    /// entry points; this path still populates it on store hits, keyed
    /// by the unparsed logical key.
    pub(crate) fn fetch_payload(&self, ctx: &RequestContext, key: &CacheKey) -> Option<Payload> {
        if let Some(Some(hit)) = self.accelerated("fetch", |table| table.get(key)) {
            self.record_hit(ACCELERATION_STORE_LABEL, 1);
            return Some(hit);
        }

        let parsed = self.parse_key(key);
        let mut found = None;
        if let Some(stored) = self.store.get(&parsed) {
            match self.unwrap_stored(stored, ctx.now) {
                Unwrapped::Expired => {
                    // Lazy expiry cleanup: the store could not do it.
                    self.store.delete(&parsed);
                }
                Unwrapped::Unusable => {}
                Unwrapped::Payload(payload) => {
                    let simple = self.definition().uses_simple_data();
                    self.accelerated("fetch_fill", |table| {
                        table.set(key.clone(), &payload, simple);
                    });
                    found = Some(payload);
                }
            }
        }

        if found.is_some() {
            self.record_hit(&self.store_name, 1);
            return found;
        }
        self.record_miss(1);

        let loaded = match &self.next {
            // The next tier parses the original key under its own
            // store's scheme; never hand it a physical key.
            NextTier::Loader(loader) => loader.fetch_payload(ctx, key),
            NextTier::Source(source) => source.load_for_cache(key).map(Payload::Plain),
            NextTier::Terminal => None,
        };
        if let Some(payload) = loaded {
            self.store_payload(ctx, key, payload.clone());
            return Some(payload);
        }
        None
    }

    /// Bulk counterpart of [`Cache::fetch_payload`]; results align with
    /// `keys`.
    pub(crate) fn fetch_many_payloads(
        &self,
        ctx: &RequestContext,
        keys: &[CacheKey],
    ) -> Vec<Option<Payload>> {
        let mut results: Vec<Option<Payload>> = Vec::with_capacity(keys.len());
        let mut wanted: Vec<usize> = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            let hit = self.accelerated("fetch_many", |table| table.get(key)).flatten();
            if hit.is_some() {
                self.record_hit(ACCELERATION_STORE_LABEL, 1);
            } else {
                wanted.push(index);
            }
            results.push(hit);
        }

        if !wanted.is_empty() {
            let parsed: Vec<StoreKey> = wanted.iter().map(|&i| self.parse_key(&keys[i])).collect();
            let simple = self.definition().uses_simple_data();
            for (&index, stored) in wanted.iter().zip(self.store.get_many(&parsed)) {
                let Some(stored) = stored else { continue };
                if let Unwrapped::Payload(payload) = self.unwrap_stored(stored, ctx.now) {
                    self.accelerated("fetch_many_fill", |table| {
                        table.set(keys[index].clone(), &payload, simple);
                    });
                    results[index] = Some(payload);
                }
            }
        }

        let missing: Vec<usize> = (0..keys.len()).filter(|&i| results[i].is_none()).collect();
        if !missing.is_empty() {
            let missing_keys: Vec<CacheKey> = missing.iter().map(|&i| keys[i].clone()).collect();
            let loaded: Vec<Option<Payload>> = match &self.next {
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
                    self.store_payload(ctx, &keys[index], payload.clone());
                    results[index] = Some(payload);
                }
            }
        }

        results
    }

    /// Write a payload into this tier and everything below it.
    pub(crate) fn store_payload(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        payload: Payload,
    ) -> bool {
        self.record_set(1);
        if let NextTier::Loader(loader) = &self.next {
            // Write through before touching this tier; each tier wraps
            // and keys the data under its own rules.
            loader.store_payload(ctx, key, payload.clone());
        }

        let simple = self.definition().uses_simple_data();
        let payload = self.detach_for_store(payload);

        self.accelerated("set", |table| {
            table.set(key.clone(), &payload, simple);
        });

        let stored = if self.simulates_ttl() {
            let ttl = self.definition().ttl();
            StoredValue::Ttl(TtlWrapper::new(payload, ttl, ctx.now))
        } else {
            payload.into()
        };
        self.store.set(&self.parse_key(key), stored)
    }

    /// Break structure a non-dereferencing store could otherwise end up
    /// sharing with the caller, before the payload is written.
    pub(crate) fn detach_for_store(&self, payload: Payload) -> Payload {
        if self.capabilities.dereferences_values || payload.is_reference_free() {
            return payload;
        }
        match payload {
            Payload::Plain(value) => {
                Payload::Plain(detach(&value, self.definition().uses_simple_data()))
            }
            object => object,
        }
    }

    /// Finish a payload for handing to the caller: unwrap envelopes and
    /// break any structure the store may still share with us.
    pub(crate) fn finalize(&self, payload: Payload) -> CacheValue {
        match payload {
            Payload::Object(envelope) => envelope.data,
            Payload::Plain(value) => {
                if !self.capabilities.dereferences_values && !value.is_scalar() {
                    detach(&value, self.definition().uses_simple_data())
                } else {
                    value
                }
            }
        }
    }

    /// Store a value that knows its own compact cache form.
    pub fn set_cacheable<T: Cacheable>(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        object: &T,
    ) -> bool {
        self.store_payload(ctx, key, Payload::Object(ObjectEnvelope::new(object)))
    }

    /// Fetch and rebuild a value stored through [`Cache::set_cacheable`].
    /// A payload the type cannot wake from reads as a miss.
    pub fn get_cacheable<T: Cacheable>(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
    ) -> Option<T> {
        match self.fetch_payload(ctx, key)? {
            Payload::Object(envelope) => envelope.wake(),
            Payload::Plain(value) => T::wake_from_cache(&value),
        }
    }

    /// `has` that additionally tries the fallback tiers, caching the
    /// result here on success. The one membership test with a side
    /// effect.
    pub fn has_with_load(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        if self.has(ctx, key) {
            return true;
        }
        let loaded = match &self.next {
            NextTier::Loader(loader) => loader.fetch_payload(ctx, key),
            NextTier::Source(source) => source.load_for_cache(key).map(Payload::Plain),
            NextTier::Terminal => None,
        };
        match loaded {
            Some(payload) => {
                self.store_payload(ctx, key, payload);
                true
            }
            None => false,
        }
    }

    /// Delete from this tier, optionally from the tiers below first.
    /// Acceleration is always cleared, whatever `recurse` says.
    pub fn delete_with_recurse(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        recurse: bool,
    ) -> bool {
        self.accelerated("delete", |table| table.delete(key));
        if recurse && let NextTier::Loader(loader) = &self.next {
            loader.delete_with_recurse(ctx, key, recurse);
        }
        self.store.delete(&self.parse_key(key))
    }

    pub fn delete_many_with_recurse(
        &self,
        ctx: &RequestContext,
        keys: &[CacheKey],
        recurse: bool,
    ) -> usize {
        self.accelerated("delete_many", |table| {
            for key in keys {
                table.delete(key);
            }
        });
        if recurse && let NextTier::Loader(loader) = &self.next {
            loader.delete_many_with_recurse(ctx, keys, recurse);
        }
        let parsed: Vec<StoreKey> = keys.iter().map(|key| self.parse_key(key)).collect();
        self.store.delete_many(&parsed)
    }

    pub(crate) fn record_hit(&self, store: &str, count: u64) {
        counter!(
            METRIC_CACHE_HIT_TOTAL,
            "store" => store.to_string(),
            "area" => self.area_label.clone()
        )
        .increment(count);
    }

    pub(crate) fn record_miss(&self, count: u64) {
        counter!(
            METRIC_CACHE_MISS_TOTAL,
            "store" => self.store_name.clone(),
            "area" => self.area_label.clone()
        )
        .increment(count);
    }

    pub(crate) fn record_set(&self, count: u64) {
        counter!(
            METRIC_CACHE_SET_TOTAL,
            "store" => self.store_name.clone(),
            "area" => self.area_label.clone()
        )
        .increment(count);
    }
}

impl CacheLoader for Cache {
    fn get_with(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        strictness: Strictness,
    ) -> Result<Option<CacheValue>, CacheError> {
        // Acceleration hits return straight away: the table already
        // hands out independent copies keyed by the logical key.
        if let Some(Some(hit)) = self.accelerated("get", |table| table.get(key)) {
            self.record_hit(ACCELERATION_STORE_LABEL, 1);
            return Ok(Some(match hit {
                Payload::Object(envelope) => envelope.data,
                Payload::Plain(value) => value,
            }));
        }

        let found = self.fetch_payload(ctx, key);
        if found.is_none() && strictness == Strictness::MustExist {
            return Err(CacheError::MissingKey {
                key: key.to_string(),
            });
        }
        Ok(found.map(|payload| self.finalize(payload)))
    }

    fn get_many_with(
        &self,
        ctx: &RequestContext,
        keys: &[CacheKey],
        strictness: Strictness,
    ) -> Result<HashMap<CacheKey, Option<CacheValue>>, CacheError> {
        let payloads = self.fetch_many_payloads(ctx, keys);

        let mut missing = Vec::new();
        let mut results = HashMap::with_capacity(keys.len());
        let mut hits = 0u64;
        for (key, payload) in keys.iter().zip(payloads) {
            match payload {
                Some(payload) => {
                    hits += 1;
                    results.insert(key.clone(), Some(self.finalize(payload)));
                }
                None => {
                    missing.push(key.to_string());
                    results.insert(key.clone(), None);
                }
            }
        }
        if hits > 0 {
            self.record_hit(&self.store_name, hits);
        }
        if !missing.is_empty() {
            self.record_miss(missing.len() as u64);
        }

        if strictness == Strictness::MustExist && !missing.is_empty() {
            return Err(CacheError::MissingKeys { keys: missing });
        }
        Ok(results)
    }

    fn set(&self, ctx: &RequestContext, key: &CacheKey, value: CacheValue) -> bool {
        self.store_payload(ctx, key, Payload::Plain(value))
    }

    fn set_many(&self, ctx: &RequestContext, items: Vec<(CacheKey, CacheValue)>) -> usize {
        if let NextTier::Loader(loader) = &self.next {
            loader.set_many(ctx, items.clone());
        }

        let simple = self.definition().uses_simple_data();
        let simulate_ttl = self.simulates_ttl();
        let ttl = self.definition().ttl();
        let needs_detaching = !self.capabilities.dereferences_values;

        let mut batch = Vec::with_capacity(items.len());
        for (key, value) in items {
            let value = if needs_detaching && !value.is_scalar() {
                detach(&value, simple)
            } else {
                value
            };
            let payload = Payload::Plain(value);
            self.accelerated("set_many", |table| {
                table.set(key.clone(), &payload, simple);
            });
            let stored = if simulate_ttl {
                StoredValue::Ttl(TtlWrapper::new(payload, ttl, ctx.now))
            } else {
                payload.into()
            };
            batch.push((self.parse_key(&key), stored));
        }
        let written = self.store.set_many(batch);
        self.record_set(written as u64);
        written
    }

    fn delete(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        self.delete_with_recurse(ctx, key, true)
    }

    fn delete_many(&self, ctx: &RequestContext, keys: &[CacheKey]) -> usize {
        self.delete_many_with_recurse(ctx, keys, true)
    }

    fn has(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        if self.accelerated("has", |table| table.has(key)) == Some(true) {
            return true;
        }
        let parsed = self.parse_key(key);
        if self.simulates_ttl() {
            // The wrapper must be fetched to check expiry.
            matches!(
                self.store.get(&parsed),
                Some(StoredValue::Ttl(wrapper)) if !wrapper.has_expired(ctx.now)
            )
        } else if !self.capabilities.key_aware {
            self.store.get(&parsed).is_some()
        } else {
            self.store.has(&parsed)
        }
    }

    fn has_all(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        if self.simulates_ttl() || !self.capabilities.key_aware {
            return keys.iter().all(|key| self.has(ctx, key));
        }
        let parsed: Vec<StoreKey> = keys.iter().map(|key| self.parse_key(key)).collect();
        self.store.has_all(&parsed)
    }

    fn has_any(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        if self.simulates_ttl() || !self.capabilities.key_aware {
            return keys.iter().any(|key| self.has(ctx, key));
        }
        if keys
            .iter()
            .any(|key| self.accelerated("has_any", |table| table.has(key)) == Some(true))
        {
            return true;
        }
        let parsed: Vec<StoreKey> = keys.iter().map(|key| self.parse_key(key)).collect();
        self.store.has_any(&parsed)
    }

    fn purge(&self, ctx: &RequestContext) -> bool {
        self.accelerated("purge", |table| table.purge());
        let store_purged = self.store.purge();
        let chain_purged = match &self.next {
            NextTier::Loader(loader) => loader.purge(ctx),
            _ => true,
        };
        store_purged && chain_purged
    }

    fn set_identifiers(&self, identifiers: BTreeMap<String, String>) {
        let changed = rw_write(&self.definition, SOURCE, "set_identifiers")
            .set_identifiers(identifiers);
        if changed {
            // Accelerated entries are keyed by logical key but their
            // stored counterparts were hashed under the old identifier
            // set; keeping them would resurrect stale data.
            self.accelerated("set_identifiers", |table| table.purge());
        }
    }

    fn invalidation_events(&self) -> Vec<String> {
        self.definition().invalidation_events().to_vec()
    }
}
