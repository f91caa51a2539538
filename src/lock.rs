//! Advisory lock backends.
//!
//! Used by the application tier when a definition demands read or write
//! locking and its store cannot lock natively. Every attempt is a
//! single, non-blocking try; contention is the caller's problem to
//! retry, never ours to wait out.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::keys::StoreKey;

/// A dedicated lock backend keyed by physical cache key.
///
/// `check_state` mirrors the store-native contract: `Some(true)` when
/// `owner` holds the lock, `Some(false)` when another owner does,
/// `None` when the key is unlocked.
pub trait CacheLock: Send + Sync {
    fn lock(&self, key: &StoreKey, owner: &str) -> bool;
    fn unlock(&self, key: &StoreKey, owner: &str) -> bool;
    fn check_state(&self, key: &StoreKey, owner: &str) -> Option<bool>;
}

/// Process-shared lock table.
///
/// Coordinates loader instances within one process; deployments whose
/// workers span processes plug in a backend over their shared store
/// instead.
#[derive(Default)]
pub struct LocalCacheLock {
    holders: DashMap<String, String>,
}

impl LocalCacheLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheLock for LocalCacheLock {
    fn lock(&self, key: &StoreKey, owner: &str) -> bool {
        match self.holders.entry(key.flatten().into_owned()) {
            Entry::Occupied(held) => held.get() == owner,
            Entry::Vacant(slot) => {
                slot.insert(owner.to_string());
                true
            }
        }
    }

    fn unlock(&self, key: &StoreKey, owner: &str) -> bool {
        self.holders
            .remove_if(key.flatten().as_ref(), |_, holder| holder == owner)
            .is_some()
    }

    fn check_state(&self, key: &StoreKey, owner: &str) -> Option<bool> {
        self.holders
            .get(key.flatten().as_ref())
            .map(|holder| holder.value() == owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> StoreKey {
        StoreKey::Flat(name.to_string())
    }

    #[test]
    fn first_owner_wins() {
        let locks = LocalCacheLock::new();
        assert!(locks.lock(&key("k"), "a"));
        assert!(!locks.lock(&key("k"), "b"));
        assert!(locks.lock(&key("other"), "b"));
    }

    #[test]
    fn reacquire_by_holder_succeeds() {
        let locks = LocalCacheLock::new();
        assert!(locks.lock(&key("k"), "a"));
        assert!(locks.lock(&key("k"), "a"));
    }

    #[test]
    fn unlock_requires_the_holder() {
        let locks = LocalCacheLock::new();
        locks.lock(&key("k"), "a");

        assert!(!locks.unlock(&key("k"), "b"));
        assert_eq!(locks.check_state(&key("k"), "a"), Some(true));

        assert!(locks.unlock(&key("k"), "a"));
        assert_eq!(locks.check_state(&key("k"), "a"), None);
    }

    #[test]
    fn check_state_distinguishes_owners() {
        let locks = LocalCacheLock::new();
        assert_eq!(locks.check_state(&key("k"), "a"), None);

        locks.lock(&key("k"), "a");
        assert_eq!(locks.check_state(&key("k"), "a"), Some(true));
        assert_eq!(locks.check_state(&key("k"), "b"), Some(false));
    }
}
