//! Event-driven invalidation: construction-time sweeps, checkpoint
//! idempotency, and the purge-everything sentinel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cascata::{
    CacheDefinition, CacheFactory, CacheKey, CacheLoader, CacheMode, CacheStore, CacheValue,
    MemoryStore, MemoryStoreConfig, RequestContext, StoreCapabilities, StoreKey, StoredValue,
};

/// Store wrapper counting how often the delete routines are invoked.
struct CountingStore {
    inner: MemoryStore,
    delete_calls: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(MemoryStoreConfig::named("counted")),
            delete_calls: AtomicUsize::new(0),
        }
    }

    fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

impl CacheStore for CountingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }

    fn get(&self, key: &StoreKey) -> Option<StoredValue> {
        self.inner.get(key)
    }

    fn set(&self, key: &StoreKey, value: StoredValue) -> bool {
        self.inner.set(key, value)
    }

    fn delete(&self, key: &StoreKey) -> bool {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key)
    }

    fn delete_many(&self, keys: &[StoreKey]) -> usize {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_many(keys)
    }

    fn has(&self, key: &StoreKey) -> bool {
        self.inner.has(key)
    }

    fn purge(&self) -> bool {
        self.inner.purge()
    }

    fn find_by_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner.find_by_prefix(prefix)
    }
}

const EVENT: &str = "changesincourse";

fn subscribed_factory(store: Arc<CountingStore>) -> CacheFactory {
    let factory = CacheFactory::new();
    factory.register_store("counted", store);
    factory.register_definition(
        CacheDefinition::builder("core", "coursecat")
            .mode(CacheMode::Application)
            .stores(["counted"])
            .invalidation_events([EVENT])
            .build(),
    );
    factory
}

#[test]
fn fresh_cache_only_stamps_its_checkpoint() {
    let store = Arc::new(CountingStore::new());
    let factory = subscribed_factory(store.clone());
    let ctx = RequestContext::at(1_000);

    let handle = factory
        .make(&ctx, "core", "coursecat", BTreeMap::new())
        .expect("handle");
    assert_eq!(store.delete_calls(), 0);

    // The checkpoint is readable as an ordinary entry.
    assert_eq!(
        handle.get(&ctx, &CacheKey::from("lastinvalidation")),
        Some(CacheValue::Int(1_000))
    );
}

#[test]
fn sweep_deletes_keys_invalidated_since_the_checkpoint() {
    let store = Arc::new(CountingStore::new());
    let factory = subscribed_factory(store.clone());

    let ctx_setup = RequestContext::at(1_000);
    let handle = factory
        .make(&ctx_setup, "core", "coursecat", BTreeMap::new())
        .expect("handle");
    handle.set(&ctx_setup, &CacheKey::from("c1"), CacheValue::Int(1));
    handle.set(&ctx_setup, &CacheKey::from("c2"), CacheValue::Int(2));

    let ctx_event = RequestContext::at(1_010);
    factory
        .invalidate_by_event(&ctx_event, EVENT, &[CacheKey::from("c1")])
        .expect("event recorded");

    let deletes_before = store.delete_calls();
    let ctx_later = RequestContext::at(1_020);
    let fresh_handle = factory
        .make(&ctx_later, "core", "coursecat", BTreeMap::new())
        .expect("handle");

    // The sweep ran exactly one bulk delete and removed only c1.
    assert_eq!(store.delete_calls(), deletes_before + 1);
    assert_eq!(fresh_handle.get(&ctx_later, &CacheKey::from("c1")), None);
    assert_eq!(
        fresh_handle.get(&ctx_later, &CacheKey::from("c2")),
        Some(CacheValue::Int(2))
    );
}

#[test]
fn repeated_sweeps_within_one_request_are_no_ops() {
    let store = Arc::new(CountingStore::new());
    let factory = subscribed_factory(store.clone());

    let ctx_setup = RequestContext::at(1_000);
    let handle = factory
        .make(&ctx_setup, "core", "coursecat", BTreeMap::new())
        .expect("handle");
    handle.set(&ctx_setup, &CacheKey::from("c1"), CacheValue::Int(1));

    factory
        .invalidate_by_event(&RequestContext::at(1_010), EVENT, &[CacheKey::from("c1")])
        .expect("event recorded");

    let ctx_sweep = RequestContext::at(1_020);
    let events = factory.event_cache().expect("event cache");

    let deletes_before = store.delete_calls();
    assert!(handle.sweep_invalidation_events(&ctx_sweep, events));
    assert_eq!(store.delete_calls(), deletes_before + 1);

    // Second pass at the same frozen now: checkpoint equality
    // short-circuits before any deletion.
    assert!(!handle.sweep_invalidation_events(&ctx_sweep, events));
    assert_eq!(store.delete_calls(), deletes_before + 1);
}

#[test]
fn purge_sentinel_purges_the_whole_cache() {
    let store = Arc::new(CountingStore::new());
    let factory = subscribed_factory(store);

    let ctx_setup = RequestContext::at(1_000);
    let handle = factory
        .make(&ctx_setup, "core", "coursecat", BTreeMap::new())
        .expect("handle");
    handle.set(&ctx_setup, &CacheKey::from("c1"), CacheValue::Int(1));
    handle.set(&ctx_setup, &CacheKey::from("c2"), CacheValue::Int(2));

    factory
        .purge_by_event(&RequestContext::at(1_010), EVENT)
        .expect("purge recorded");

    let ctx_later = RequestContext::at(1_020);
    let fresh_handle = factory
        .make(&ctx_later, "core", "coursecat", BTreeMap::new())
        .expect("handle");

    assert_eq!(fresh_handle.get(&ctx_later, &CacheKey::from("c1")), None);
    assert_eq!(fresh_handle.get(&ctx_later, &CacheKey::from("c2")), None);
}

#[test]
fn events_older_than_the_checkpoint_are_ignored() {
    let store = Arc::new(CountingStore::new());
    let factory = subscribed_factory(store.clone());

    // Event recorded before this cache ever existed.
    factory
        .invalidate_by_event(&RequestContext::at(900), EVENT, &[CacheKey::from("c1")])
        .expect("event recorded");

    let ctx_birth = RequestContext::at(1_000);
    let handle = factory
        .make(&ctx_birth, "core", "coursecat", BTreeMap::new())
        .expect("handle");
    handle.set(&ctx_birth, &CacheKey::from("c1"), CacheValue::Int(1));

    let deletes_before = store.delete_calls();
    let ctx_later = RequestContext::at(1_100);
    let fresh_handle = factory
        .make(&ctx_later, "core", "coursecat", BTreeMap::new())
        .expect("handle");

    assert_eq!(store.delete_calls(), deletes_before);
    assert_eq!(
        fresh_handle.get(&ctx_later, &CacheKey::from("c1")),
        Some(CacheValue::Int(1))
    );
}
