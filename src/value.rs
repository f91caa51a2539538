//! Cache value model.
//!
//! Values travel through the cache as an owned tagged tree. Stores that
//! cannot guarantee dereferencing safety hand back payloads that may
//! still share structure with store internals; `detach` produces an
//! independent copy, choosing between a structural clone and a JSON
//! round trip via a depth-capped scan.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Containers nested deeper than this are copied via serialization
/// instead of a structural clone.
pub const MAX_COPY_SCAN_DEPTH: usize = 5;

/// A value held by the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<CacheValue>),
    Map(BTreeMap<String, CacheValue>),
}

impl CacheValue {
    /// True for leaf values that can never share structure.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            CacheValue::Bool(_) | CacheValue::Int(_) | CacheValue::Float(_) | CacheValue::Str(_)
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            CacheValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, CacheValue>> {
        match self {
            CacheValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Bool(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Int(value)
    }
}

impl From<i32> for CacheValue {
    fn from(value: i32) -> Self {
        CacheValue::Int(i64::from(value))
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        CacheValue::Float(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Str(value.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Str(value)
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(value: Vec<CacheValue>) -> Self {
        CacheValue::Seq(value)
    }
}

impl From<BTreeMap<String, CacheValue>> for CacheValue {
    fn from(value: BTreeMap<String, CacheValue>) -> Self {
        CacheValue::Map(value)
    }
}

// ============================================================================
// Cacheable object contract
// ============================================================================

/// A type that can produce a compact storable form of itself and later
/// rebuild from it, sidestepping full serialization of heavy state.
pub trait Cacheable {
    /// Produce the compact envelope payload to store.
    fn prepare_to_cache(&self) -> CacheValue;

    /// Rebuild from a previously stored payload. `None` when the payload
    /// is not in the expected shape (stale format, foreign entry).
    fn wake_from_cache(data: &CacheValue) -> Option<Self>
    where
        Self: Sized;
}

/// Stored envelope for a [`Cacheable`] value. The payload is the compact
/// form and is assumed reference-free by contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEnvelope {
    pub data: CacheValue,
}

impl ObjectEnvelope {
    pub fn new<T: Cacheable>(object: &T) -> Self {
        Self {
            data: object.prepare_to_cache(),
        }
    }

    pub fn wake<T: Cacheable>(&self) -> Option<T> {
        T::wake_from_cache(&self.data)
    }
}

// ============================================================================
// Defensive copying
// ============================================================================

/// True when producing an independent copy of `value` should go through
/// serialization rather than a structural clone.
///
/// Scalars never need it. Containers are scanned recursively; at
/// [`MAX_COPY_SCAN_DEPTH`] the scan gives up and opts for serialization.
pub(crate) fn needs_serialized_copy(value: &CacheValue, depth: usize) -> bool {
    match value {
        CacheValue::Bool(_) | CacheValue::Int(_) | CacheValue::Float(_) | CacheValue::Str(_) => {
            false
        }
        CacheValue::Seq(items) => {
            depth >= MAX_COPY_SCAN_DEPTH
                || items.iter().any(|v| needs_serialized_copy(v, depth + 1))
        }
        CacheValue::Map(map) => {
            depth >= MAX_COPY_SCAN_DEPTH
                || map.values().any(|v| needs_serialized_copy(v, depth + 1))
        }
    }
}

/// Produce a copy of `value` that shares no structure with the input.
///
/// Definitions that promise `simple_data` skip the scan entirely and the
/// value is returned as a plain clone.
pub(crate) fn detach(value: &CacheValue, simple_data: bool) -> CacheValue {
    if simple_data || !needs_serialized_copy(value, 1) {
        return value.clone();
    }
    match serde_json::to_string(value).and_then(|json| serde_json::from_str(&json)) {
        Ok(copy) => copy,
        Err(err) => {
            warn!(
                error = %err,
                "Serialized copy of cache value failed, falling back to structural clone"
            );
            value.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(depth: usize) -> CacheValue {
        let mut value = CacheValue::Int(1);
        for _ in 0..depth {
            value = CacheValue::Seq(vec![value]);
        }
        value
    }

    #[test]
    fn scalars_never_need_serialized_copy() {
        assert!(!needs_serialized_copy(&CacheValue::Int(3), 1));
        assert!(!needs_serialized_copy(&CacheValue::from("text"), 1));
        assert!(!needs_serialized_copy(&CacheValue::Bool(true), 1));
    }

    #[test]
    fn shallow_containers_clone_structurally() {
        let value = CacheValue::Seq(vec![CacheValue::Int(1), CacheValue::from("a")]);
        assert!(!needs_serialized_copy(&value, 1));
    }

    #[test]
    fn deep_nesting_triggers_serialization() {
        assert!(needs_serialized_copy(&nested(MAX_COPY_SCAN_DEPTH + 1), 1));
    }

    #[test]
    fn detach_produces_equal_value() {
        let value = nested(MAX_COPY_SCAN_DEPTH + 2);
        assert_eq!(detach(&value, false), value);

        let shallow = CacheValue::Map(BTreeMap::from([(
            "k".to_string(),
            CacheValue::Int(9),
        )]));
        assert_eq!(detach(&shallow, false), shallow);
    }

    #[test]
    fn simple_data_skips_the_scan() {
        let value = nested(MAX_COPY_SCAN_DEPTH + 4);
        assert_eq!(detach(&value, true), value);
    }

    #[test]
    fn json_round_trip_preserves_variants() {
        let value = CacheValue::Map(BTreeMap::from([
            ("count".to_string(), CacheValue::Int(3)),
            ("ratio".to_string(), CacheValue::Float(0.5)),
            ("name".to_string(), CacheValue::from("cascata")),
            ("flags".to_string(), CacheValue::Seq(vec![CacheValue::Bool(false)])),
        ]));
        let json = serde_json::to_string(&value).expect("serializable");
        let back: CacheValue = serde_json::from_str(&json).expect("deserializable");
        assert_eq!(back, value);
    }

    struct CourseSummary {
        id: i64,
        title: String,
    }

    impl Cacheable for CourseSummary {
        fn prepare_to_cache(&self) -> CacheValue {
            CacheValue::Map(BTreeMap::from([
                ("id".to_string(), CacheValue::Int(self.id)),
                ("title".to_string(), CacheValue::from(self.title.clone())),
            ]))
        }

        fn wake_from_cache(data: &CacheValue) -> Option<Self> {
            let map = data.as_map()?;
            Some(Self {
                id: map.get("id")?.as_int()?,
                title: map.get("title")?.as_str()?.to_string(),
            })
        }
    }

    #[test]
    fn object_envelope_round_trip() {
        let summary = CourseSummary {
            id: 12,
            title: "Intro".to_string(),
        };
        let envelope = ObjectEnvelope::new(&summary);
        let woken: CourseSummary = envelope.wake().expect("wake succeeds");
        assert_eq!(woken.id, 12);
        assert_eq!(woken.title, "Intro");
    }

    #[test]
    fn object_envelope_wake_rejects_foreign_payload() {
        let envelope = ObjectEnvelope {
            data: CacheValue::Int(1),
        };
        assert!(envelope.wake::<CourseSummary>().is_none());
    }
}
