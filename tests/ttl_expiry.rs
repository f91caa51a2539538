//! TTL behavior: wrapper simulation for stores without native expiry,
//! lazy cleanup of expired entries, and delegation to stores that can
//! expire entries themselves.

use std::sync::Arc;

use cascata::{
    Cache, CacheDefinition, CacheKey, CacheLoader, CacheStore, CacheValue, MemoryStore,
    MemoryStoreConfig, NextTier, RequestContext, StoredValue,
};

fn ttl_definition(ttl: i64) -> CacheDefinition {
    CacheDefinition::builder("core", "coursemodinfo").ttl(ttl).build()
}

#[test]
fn simulated_ttl_expires_and_lazily_cleans_up() {
    let store = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
    let cache = Cache::new(ttl_definition(60), store.clone(), NextTier::Terminal);
    let key = CacheKey::from("k");

    let ctx = RequestContext::at(1_000);
    cache.set(&ctx, &key, CacheValue::Int(5));
    assert_eq!(cache.get(&ctx, &key), Some(CacheValue::Int(5)));

    // Still live at the expiry boundary.
    let boundary = RequestContext::at(1_060);
    assert_eq!(cache.get(&boundary, &key), Some(CacheValue::Int(5)));

    // Expired afterwards, and the physical entry is deleted on the
    // spot since the store could not do it.
    let later = RequestContext::at(1_061);
    assert_eq!(cache.get(&later, &key), None);
    assert!(store.get(&cache.parse_key(&key)).is_none());
}

#[test]
fn simulated_ttl_wraps_the_physical_entry() {
    let store = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
    let cache = Cache::new(ttl_definition(60), store.clone(), NextTier::Terminal);
    let key = CacheKey::from("k");

    let ctx = RequestContext::at(1_000);
    cache.set(&ctx, &key, CacheValue::Int(5));
    assert!(matches!(
        store.get(&cache.parse_key(&key)),
        Some(StoredValue::Ttl(_))
    ));
}

#[test]
fn has_fetches_the_wrapper_under_simulated_ttl() {
    let store = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
    let cache = Cache::new(ttl_definition(60), store, NextTier::Terminal);
    let key = CacheKey::from("k");

    let ctx = RequestContext::at(1_000);
    cache.set(&ctx, &key, CacheValue::Int(5));

    assert!(cache.has(&ctx, &key));
    assert!(!cache.has(&RequestContext::at(1_100), &key));
}

#[test]
fn native_ttl_stores_are_not_wrapped() {
    let store = Arc::new(MemoryStore::new(MemoryStoreConfig {
        native_ttl: true,
        ttl: Some(60),
        ..Default::default()
    }));
    let cache = Cache::new(ttl_definition(60), store.clone(), NextTier::Terminal);
    let key = CacheKey::from("k");

    let ctx = RequestContext::at(1_000);
    cache.set(&ctx, &key, CacheValue::Int(5));

    // Expiry is the store's job; the loader writes the bare payload.
    assert!(matches!(
        store.get(&cache.parse_key(&key)),
        Some(StoredValue::Plain(_))
    ));
    assert_eq!(cache.get(&ctx, &key), Some(CacheValue::Int(5)));
}

#[test]
fn no_ttl_definition_stores_bare_payloads() {
    let store = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
    let cache = Cache::new(ttl_definition(0), store.clone(), NextTier::Terminal);
    let key = CacheKey::from("k");

    let ctx = RequestContext::at(1_000);
    cache.set(&ctx, &key, CacheValue::Int(5));
    assert!(matches!(
        store.get(&cache.parse_key(&key)),
        Some(StoredValue::Plain(_))
    ));
}

#[test]
fn stray_wrapper_is_still_expiry_checked() {
    // A definition whose TTL was since removed can still meet wrapped
    // entries written earlier; they expire rather than resurface raw.
    let store = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
    let writer = Cache::new(ttl_definition(60), store.clone(), NextTier::Terminal);
    let key = CacheKey::from("k");

    writer.set(&RequestContext::at(1_000), &key, CacheValue::Int(5));

    let reader = Cache::new(ttl_definition(0), store, NextTier::Terminal);
    assert_eq!(
        reader.get(&RequestContext::at(1_030), &key),
        Some(CacheValue::Int(5))
    );
    assert_eq!(reader.get(&RequestContext::at(1_100), &key), None);
}
