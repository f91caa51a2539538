//! Cache factory.
//!
//! The factory owns the definition registry, hands out store instances
//! (one per backend and definition, shared across handles of the same
//! definition), assembles loader chains, and hosts the shared pieces the
//! variants need: the lock backend, the tracked-user state, and the
//! event invalidation cache with its writer API.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, RwLock};

use crate::application::ApplicationCache;
use crate::config::CacheSettings;
use crate::context::RequestContext;
use crate::definition::{CacheDefinition, CacheMode};
use crate::error::CacheError;
use crate::invalidation::{PURGED_KEY, merge_event_record};
use crate::keys::CacheKey;
use crate::loader::{Cache, CacheLoader, DataSource, NextTier, Strictness};
use crate::lock::{CacheLock, LocalCacheLock};
use crate::request::RequestCache;
use crate::session::{SessionCache, TrackedUser};
use crate::store::{CacheStore, MemoryStore, MemoryStoreConfig};
use crate::sync::{rw_read, rw_write};
use crate::value::CacheValue;

const SOURCE: &str = "factory";

/// Backend names used when a definition does not bind stores itself.
pub const DEFAULT_APPLICATION_STORE: &str = "default_application";
pub const DEFAULT_SESSION_STORE: &str = "default_session";
pub const DEFAULT_REQUEST_STORE: &str = "default_request";

/// A cache handle as returned by [`CacheFactory::make`]: one of the
/// three loader variants, all sharing the [`CacheLoader`] surface.
pub enum CacheHandle {
    Application(ApplicationCache),
    Session(SessionCache),
    Request(RequestCache),
}

impl CacheHandle {
    pub fn as_application(&self) -> Option<&ApplicationCache> {
        match self {
            CacheHandle::Application(cache) => Some(cache),
            _ => None,
        }
    }

    pub fn as_session(&self) -> Option<&SessionCache> {
        match self {
            CacheHandle::Session(cache) => Some(cache),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&RequestCache> {
        match self {
            CacheHandle::Request(cache) => Some(cache),
            _ => None,
        }
    }
}

impl CacheLoader for CacheHandle {
    fn get_with(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        strictness: Strictness,
    ) -> Result<Option<CacheValue>, CacheError> {
        match self {
            CacheHandle::Application(cache) => cache.get_with(ctx, key, strictness),
            CacheHandle::Session(cache) => cache.get_with(ctx, key, strictness),
            CacheHandle::Request(cache) => cache.get_with(ctx, key, strictness),
        }
    }

    fn get_many_with(
        &self,
        ctx: &RequestContext,
        keys: &[CacheKey],
        strictness: Strictness,
    ) -> Result<HashMap<CacheKey, Option<CacheValue>>, CacheError> {
        match self {
            CacheHandle::Application(cache) => cache.get_many_with(ctx, keys, strictness),
            CacheHandle::Session(cache) => cache.get_many_with(ctx, keys, strictness),
            CacheHandle::Request(cache) => cache.get_many_with(ctx, keys, strictness),
        }
    }

    fn set(&self, ctx: &RequestContext, key: &CacheKey, value: CacheValue) -> bool {
        match self {
            CacheHandle::Application(cache) => cache.set(ctx, key, value),
            CacheHandle::Session(cache) => cache.set(ctx, key, value),
            CacheHandle::Request(cache) => cache.set(ctx, key, value),
        }
    }

    fn set_many(&self, ctx: &RequestContext, items: Vec<(CacheKey, CacheValue)>) -> usize {
        match self {
            CacheHandle::Application(cache) => cache.set_many(ctx, items),
            CacheHandle::Session(cache) => cache.set_many(ctx, items),
            CacheHandle::Request(cache) => cache.set_many(ctx, items),
        }
    }

    fn delete(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        match self {
            CacheHandle::Application(cache) => cache.delete(ctx, key),
            CacheHandle::Session(cache) => cache.delete(ctx, key),
            CacheHandle::Request(cache) => cache.delete(ctx, key),
        }
    }

    fn delete_many(&self, ctx: &RequestContext, keys: &[CacheKey]) -> usize {
        match self {
            CacheHandle::Application(cache) => cache.delete_many(ctx, keys),
            CacheHandle::Session(cache) => cache.delete_many(ctx, keys),
            CacheHandle::Request(cache) => cache.delete_many(ctx, keys),
        }
    }

    fn has(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        match self {
            CacheHandle::Application(cache) => cache.has(ctx, key),
            CacheHandle::Session(cache) => cache.has(ctx, key),
            CacheHandle::Request(cache) => cache.has(ctx, key),
        }
    }

    fn has_all(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        match self {
            CacheHandle::Application(cache) => cache.has_all(ctx, keys),
            CacheHandle::Session(cache) => cache.has_all(ctx, keys),
            CacheHandle::Request(cache) => cache.has_all(ctx, keys),
        }
    }

    fn has_any(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        match self {
            CacheHandle::Application(cache) => cache.has_any(ctx, keys),
            CacheHandle::Session(cache) => cache.has_any(ctx, keys),
            CacheHandle::Request(cache) => cache.has_any(ctx, keys),
        }
    }

    fn purge(&self, ctx: &RequestContext) -> bool {
        match self {
            CacheHandle::Application(cache) => cache.purge(ctx),
            CacheHandle::Session(cache) => cache.purge(ctx),
            CacheHandle::Request(cache) => cache.purge(ctx),
        }
    }

    fn set_identifiers(&self, identifiers: BTreeMap<String, String>) {
        match self {
            CacheHandle::Application(cache) => cache.set_identifiers(identifiers),
            CacheHandle::Session(cache) => cache.set_identifiers(identifiers),
            CacheHandle::Request(cache) => cache.set_identifiers(identifiers),
        }
    }

    fn invalidation_events(&self) -> Vec<String> {
        match self {
            CacheHandle::Application(cache) => cache.invalidation_events(),
            CacheHandle::Session(cache) => cache.invalidation_events(),
            CacheHandle::Request(cache) => cache.invalidation_events(),
        }
    }
}

/// Builds cache handles from registered definitions and backends.
pub struct CacheFactory {
    definitions: RwLock<HashMap<String, CacheDefinition>>,
    backends: RwLock<HashMap<String, MemoryStoreConfig>>,
    shared_stores: RwLock<HashMap<String, Arc<dyn CacheStore>>>,
    instances: RwLock<HashMap<(String, String), Arc<dyn CacheStore>>>,
    lock_backend: Arc<dyn CacheLock>,
    tracked_user: TrackedUser,
    event_cache: OnceLock<Cache>,
}

impl CacheFactory {
    pub fn new() -> Self {
        let factory = Self {
            definitions: RwLock::new(HashMap::new()),
            backends: RwLock::new(HashMap::new()),
            shared_stores: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            lock_backend: Arc::new(LocalCacheLock::new()),
            tracked_user: Arc::new(RwLock::new(None)),
            event_cache: OnceLock::new(),
        };
        factory.register_backend(MemoryStoreConfig::named(DEFAULT_APPLICATION_STORE));
        factory.register_backend(MemoryStoreConfig::named(DEFAULT_SESSION_STORE));
        factory.register_backend(MemoryStoreConfig {
            // Request stores live and die inside one execution context,
            // so handing values back without copies is safe.
            dereferences_values: true,
            ..MemoryStoreConfig::named(DEFAULT_REQUEST_STORE)
        });
        factory
    }

    /// Factory pre-loaded with declaratively configured definitions.
    pub fn with_settings(settings: &CacheSettings) -> Result<Self, CacheError> {
        let factory = Self::new();
        factory.apply_settings(settings)?;
        Ok(factory)
    }

    pub fn apply_settings(&self, settings: &CacheSettings) -> Result<(), CacheError> {
        for definition in settings.build_definitions()? {
            self.register_definition(definition);
        }
        Ok(())
    }

    pub fn register_definition(&self, definition: CacheDefinition) {
        rw_write(&self.definitions, SOURCE, "register_definition")
            .insert(definition.id(), definition);
    }

    /// Register an in-memory backend under its configured name.
    pub fn register_backend(&self, config: MemoryStoreConfig) {
        rw_write(&self.backends, SOURCE, "register_backend").insert(config.name.clone(), config);
    }

    /// Register an externally built store shared as-is across every
    /// definition bound to `name`.
    pub fn register_store(&self, name: impl Into<String>, store: Arc<dyn CacheStore>) {
        rw_write(&self.shared_stores, SOURCE, "register_store").insert(name.into(), store);
    }

    pub fn definition(&self, component: &str, area: &str) -> Option<CacheDefinition> {
        rw_read(&self.definitions, SOURCE, "definition")
            .get(&format!("{component}/{area}"))
            .cloned()
    }

    pub fn make(
        &self,
        ctx: &RequestContext,
        component: &str,
        area: &str,
        identifiers: BTreeMap<String, String>,
    ) -> Result<CacheHandle, CacheError> {
        self.build(ctx, component, area, identifiers, None)
    }

    /// Like [`CacheFactory::make`], with a data source attached to the
    /// innermost tier as the final fallback.
    pub fn make_with_source(
        &self,
        ctx: &RequestContext,
        component: &str,
        area: &str,
        identifiers: BTreeMap<String, String>,
        source: Arc<dyn DataSource>,
    ) -> Result<CacheHandle, CacheError> {
        self.build(ctx, component, area, identifiers, Some(source))
    }

    fn build(
        &self,
        ctx: &RequestContext,
        component: &str,
        area: &str,
        identifiers: BTreeMap<String, String>,
        source: Option<Arc<dyn DataSource>>,
    ) -> Result<CacheHandle, CacheError> {
        let id = format!("{component}/{area}");
        let mut definition = rw_read(&self.definitions, SOURCE, "build")
            .get(&id)
            .cloned()
            .ok_or(CacheError::UnknownDefinition(id))?;
        if !identifiers.is_empty() {
            definition.set_identifiers(identifiers);
        }
        let mode = definition.mode();

        let mut store_names: Vec<String> = definition.stores().to_vec();
        if store_names.is_empty() {
            store_names.push(
                match mode {
                    CacheMode::Application => DEFAULT_APPLICATION_STORE,
                    CacheMode::Session => DEFAULT_SESSION_STORE,
                    CacheMode::Request => DEFAULT_REQUEST_STORE,
                }
                .to_string(),
            );
        }
        if mode == CacheMode::Session {
            // A session cache is a single tier: the user namespace is
            // applied by the session loader's key codec and a chained
            // plain tier would store entries outside it.
            store_names.truncate(1);
        }

        let has_events = definition.has_invalidation_events();
        let shared = Arc::new(RwLock::new(definition.clone()));
        let mut next = match source {
            Some(source) => NextTier::Source(source),
            None => NextTier::Terminal,
        };
        for name in store_names.iter().rev() {
            let store = self.store_instance(name, &definition)?;
            if mode == CacheMode::Session && !store.capabilities().searchable {
                return Err(CacheError::Config(format!(
                    "session store `{name}` must support prefix search"
                )));
            }
            let tier = Cache::from_shared(shared.clone(), store, next);
            next = NextTier::Loader(Box::new(tier));
        }
        let NextTier::Loader(top) = next else {
            return Err(CacheError::Config(
                "definition resolved to no store tiers".to_string(),
            ));
        };

        let handle = match mode {
            CacheMode::Application => {
                CacheHandle::Application(ApplicationCache::new(*top, self.lock_backend.clone()))
            }
            CacheMode::Session => {
                CacheHandle::Session(SessionCache::new(*top, self.tracked_user.clone(), ctx))
            }
            CacheMode::Request => CacheHandle::Request(RequestCache::new(*top)),
        };

        // Request caches never outlive the events that could
        // invalidate them.
        if has_events && mode != CacheMode::Request {
            handle.sweep_invalidation_events(ctx, self.event_cache()?);
        }
        Ok(handle)
    }

    fn store_instance(
        &self,
        name: &str,
        definition: &CacheDefinition,
    ) -> Result<Arc<dyn CacheStore>, CacheError> {
        if let Some(store) = rw_read(&self.shared_stores, SOURCE, "store_instance").get(name) {
            return Ok(store.clone());
        }

        let key = (name.to_string(), definition.id());
        if let Some(store) = rw_read(&self.instances, SOURCE, "store_instance").get(&key) {
            return Ok(store.clone());
        }

        let mut config = rw_read(&self.backends, SOURCE, "store_instance")
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownStore(name.to_string()))?;
        if config.native_ttl && definition.has_ttl() {
            config.ttl = Some(definition.ttl());
        }
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new(config));
        rw_write(&self.instances, SOURCE, "store_instance").insert(key, store.clone());
        Ok(store)
    }

    /// The shared cache holding invalidation event records.
    pub fn event_cache(&self) -> Result<&Cache, CacheError> {
        if let Some(cache) = self.event_cache.get() {
            return Ok(cache);
        }
        let definition = CacheDefinition::builder("core", "eventinvalidation")
            .mode(CacheMode::Application)
            .simple_data()
            .static_acceleration(None)
            .build();
        let store = self.store_instance(DEFAULT_APPLICATION_STORE, &definition)?;
        let cache = Cache::new(definition, store, NextTier::Terminal);
        Ok(self.event_cache.get_or_init(|| cache))
    }

    /// Record keys as invalidated under `event` at the request's frozen
    /// now. Caches subscribed to the event delete them during their
    /// next construction-time sweep.
    pub fn invalidate_by_event(
        &self,
        ctx: &RequestContext,
        event: &str,
        keys: &[CacheKey],
    ) -> Result<(), CacheError> {
        let cache = self.event_cache()?;
        let record_key = CacheKey::from(event);
        let merged = merge_event_record(cache.get(ctx, &record_key).as_ref(), keys, ctx.now);
        cache.set(ctx, &record_key, merged);
        Ok(())
    }

    /// Mark everything subscribed to `event` as purged since now.
    pub fn purge_by_event(&self, ctx: &RequestContext, event: &str) -> Result<(), CacheError> {
        self.invalidate_by_event(ctx, event, &[CacheKey::from(PURGED_KEY)])
    }
}

impl Default for CacheFactory {
    fn default() -> Self {
        Self::new()
    }
}
