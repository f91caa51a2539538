//! Advisory locking on the application tier: read contention reads as
//! a miss, write contention fails the write, and locks never outlive
//! the operation they guard.

use std::sync::Arc;

use cascata::{
    ApplicationCache, Cache, CacheDefinition, CacheError, CacheKey, CacheLoader, CacheLock,
    CacheValue, LocalCacheLock, LockingMode, MemoryStore, MemoryStoreConfig, NextTier,
    RequestContext, Strictness,
};

fn locked_definition(locking: LockingMode) -> CacheDefinition {
    CacheDefinition::builder("core", "coursemodinfo")
        .locking(locking)
        .build()
}

/// Two independent loader instances over the same store and lock
/// backend, as two workers sharing a backend would see it.
fn contending_pair(locking: LockingMode) -> (ApplicationCache, ApplicationCache) {
    let store = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
    let backend: Arc<dyn CacheLock> = Arc::new(LocalCacheLock::new());
    let a = ApplicationCache::new(
        Cache::new(locked_definition(locking), store.clone(), NextTier::Terminal),
        backend.clone(),
    );
    let b = ApplicationCache::new(
        Cache::new(locked_definition(locking), store, NextTier::Terminal),
        backend,
    );
    (a, b)
}

#[test]
fn read_contention_reads_as_a_miss_until_released() {
    let ctx = RequestContext::at(1_000);
    let (a, b) = contending_pair(LockingMode::Read);
    let key = CacheKey::from("k");

    b.set(&ctx, &key, CacheValue::Int(5));
    assert_eq!(b.get(&ctx, &key), Some(CacheValue::Int(5)));

    assert!(a.acquire_lock(&ctx, &key));
    // The data exists, but another owner holds the lock: not
    // currently available.
    assert_eq!(b.get(&ctx, &key), None);

    assert!(a.release_lock(&ctx, &key));
    assert_eq!(b.get(&ctx, &key), Some(CacheValue::Int(5)));
}

#[test]
fn the_lock_holder_still_reads_its_own_data() {
    let ctx = RequestContext::at(1_000);
    let (a, _) = contending_pair(LockingMode::Read);
    let key = CacheKey::from("k");

    a.set(&ctx, &key, CacheValue::Int(5));
    assert!(a.acquire_lock(&ctx, &key));
    assert_eq!(a.get(&ctx, &key), Some(CacheValue::Int(5)));
    assert!(a.release_lock(&ctx, &key));
}

#[test]
fn write_contention_fails_set_and_delete() {
    let ctx = RequestContext::at(1_000);
    let (a, b) = contending_pair(LockingMode::Write);
    let key = CacheKey::from("k");

    assert!(a.acquire_lock(&ctx, &key));
    assert!(!b.set(&ctx, &key, CacheValue::Int(5)));
    assert!(!b.delete(&ctx, &key));

    assert!(a.release_lock(&ctx, &key));
    assert!(b.set(&ctx, &key, CacheValue::Int(5)));
}

#[test]
fn write_locks_are_released_after_each_operation() {
    let ctx = RequestContext::at(1_000);
    let (a, b) = contending_pair(LockingMode::Write);
    let key = CacheKey::from("k");

    assert!(a.set(&ctx, &key, CacheValue::Int(1)));
    // The lock a's set took must be gone, or b could never write.
    assert!(b.set(&ctx, &key, CacheValue::Int(2)));
    assert_eq!(a.get(&ctx, &key), Some(CacheValue::Int(2)));
}

#[test]
fn batch_read_under_must_exist_fails_hard_on_contention() {
    let ctx = RequestContext::at(1_000);
    let (a, b) = contending_pair(LockingMode::Read);
    let free = CacheKey::from("free");
    let held = CacheKey::from("held");

    b.set(&ctx, &free, CacheValue::Int(1));
    b.set(&ctx, &held, CacheValue::Int(2));
    assert!(a.acquire_lock(&ctx, &held));

    let strict = b.get_many_with(
        &ctx,
        &[free.clone(), held.clone()],
        Strictness::MustExist,
    );
    assert!(matches!(strict, Err(CacheError::LockDenied { .. })));

    // Under IgnoreMissing the contended key is simply left out.
    let relaxed = b
        .get_many_with(&ctx, &[free.clone(), held.clone()], Strictness::IgnoreMissing)
        .expect("batch read");
    assert_eq!(relaxed.get(&free), Some(&Some(CacheValue::Int(1))));
    assert!(!relaxed.contains_key(&held));

    // Whatever the batch acquired was released on the way out.
    assert_eq!(b.check_lock_state(&ctx, &free), None);
}

#[test]
fn unlocked_definitions_never_touch_the_lock_backend() {
    let ctx = RequestContext::at(1_000);
    let (a, b) = contending_pair(LockingMode::None);
    let key = CacheKey::from("k");

    // Manual locks still work on demand, but plain operations ignore
    // contention entirely.
    assert!(a.acquire_lock(&ctx, &key));
    assert!(b.set(&ctx, &key, CacheValue::Int(5)));
    assert_eq!(b.get(&ctx, &key), Some(CacheValue::Int(5)));
    assert!(a.release_lock(&ctx, &key));
}
