//! Cache key definitions.
//!
//! `CacheKey` is the logical key supplied by callers; `StoreKey` is the
//! physical form handed to a store backend. The codec between them is a
//! pure function of the key and the owning definition: multi-identifier
//! stores receive the definition's identifier parts alongside the raw
//! key, every other store receives a single hashed string that folds in
//! the definition hash so two definitions can never collide on a shared
//! backend.

use std::borrow::Cow;
use std::fmt;

use sha2::{Digest, Sha256};

/// Logical key as supplied to get/set/delete.
///
/// Integer and string keys with the same rendering (`42` and `"42"`)
/// address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Int(i64),
    Str(String),
}

impl CacheKey {
    pub fn as_key_string(&self) -> Cow<'_, str> {
        match self {
            CacheKey::Int(n) => Cow::Owned(n.to_string()),
            CacheKey::Str(s) => Cow::Borrowed(s),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Int(n) => write!(f, "{n}"),
            CacheKey::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CacheKey {
    fn from(value: i64) -> Self {
        CacheKey::Int(value)
    }
}

impl From<i32> for CacheKey {
    fn from(value: i32) -> Self {
        CacheKey::Int(i64::from(value))
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        CacheKey::Str(value.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        CacheKey::Str(value)
    }
}

/// Physical key as handed to a store backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Single opaque string; the common case.
    Flat(String),
    /// Structured record for stores that understand identifier parts.
    Parts {
        identifiers: Vec<(String, String)>,
        key: String,
    },
}

impl StoreKey {
    /// Canonical single-string rendering, used by backends that key a
    /// flat map regardless of which form they were handed.
    pub fn flatten(&self) -> Cow<'_, str> {
        match self {
            StoreKey::Flat(s) => Cow::Borrowed(s),
            StoreKey::Parts { identifiers, key } => {
                let mut flat = String::new();
                for (name, value) in identifiers {
                    flat.push_str(name);
                    flat.push('=');
                    flat.push_str(value);
                    flat.push('/');
                }
                flat.push_str(key);
                Cow::Owned(flat)
            }
        }
    }
}

// ============================================================================
// Hash utilities
// ============================================================================

/// Hash a logical key together with its definition hash.
///
/// SHA-256 rather than the std hasher: physical keys must be stable
/// across processes and releases because stores are shared.
pub fn hash_key(key: &CacheKey, definition_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_key_string().as_bytes());
    hasher.update(b"-");
    hasher.update(definition_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash the identity of a definition: component, area and sorted
/// identifier pairs.
pub fn hash_definition<K: AsRef<str>, V: AsRef<str>>(
    component: &str,
    area: &str,
    identifiers: impl Iterator<Item = (K, V)>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(component.as_bytes());
    hasher.update(b"/");
    hasher.update(area.as_bytes());
    for (name, value) in identifiers {
        hasher.update(b"\x1f");
        hasher.update(name.as_ref().as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_str_keys_with_same_rendering_are_equivalent() {
        let a = CacheKey::from(42);
        let b = CacheKey::from("42");
        assert_eq!(a.as_key_string(), b.as_key_string());
        assert_eq!(hash_key(&a, "def"), hash_key(&b, "def"));
    }

    #[test]
    fn hash_key_separates_definitions() {
        let key = CacheKey::from("course-1");
        assert_ne!(hash_key(&key, "aaa"), hash_key(&key, "bbb"));
    }

    #[test]
    fn hash_key_is_deterministic() {
        let key = CacheKey::from("k");
        assert_eq!(hash_key(&key, "def"), hash_key(&key, "def"));
    }

    #[test]
    fn definition_hash_reflects_identifiers() {
        let base = hash_definition("core", "strings", std::iter::empty::<(&str, &str)>());
        let with_id = hash_definition("core", "strings", [("lang", "en")].into_iter());
        assert_ne!(base, with_id);
    }

    #[test]
    fn parts_key_flattens_identifiers_in_order() {
        let key = StoreKey::Parts {
            identifiers: vec![
                ("lang".to_string(), "en".to_string()),
                ("rev".to_string(), "4".to_string()),
            ],
            key: "greeting".to_string(),
        };
        assert_eq!(key.flatten(), "lang=en/rev=4/greeting");
    }
}
