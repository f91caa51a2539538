//! Event-driven invalidation records.
//!
//! Caches that cannot talk to each other directly reconcile through a
//! shared event cache: one record per event name mapping affected keys
//! to the timestamp of their invalidation, with the reserved key
//! `"purged"` standing for "everything, since this timestamp". Each
//! subscribing cache keeps its own checkpoint under the reserved
//! `"lastinvalidation"` key and only acts on records at or after it, so
//! the scan is idempotent within one frozen now and indifferent to event
//! arrival order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::keys::CacheKey;
use crate::value::CacheValue;

/// Reserved key inside an event record: purge everything.
pub const PURGED_KEY: &str = "purged";

/// Reserved key each subscribing cache stores its checkpoint under.
pub const LAST_INVALIDATION_KEY: &str = "lastinvalidation";

/// Actions a scan of the event records produced.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct SweepPlan {
    pub purge_all: bool,
    pub delete: Vec<CacheKey>,
}

impl SweepPlan {
    pub fn is_empty(&self) -> bool {
        !self.purge_all && self.delete.is_empty()
    }
}

/// Scan fetched event records against a checkpoint.
///
/// Records that are missing or not in the expected map shape are
/// skipped; a key whose timestamp cannot be read is skipped likewise.
/// The `"purged"` sentinel stops the scan of its own event record.
pub(crate) fn plan_sweep(
    records: &HashMap<CacheKey, Option<CacheValue>>,
    checkpoint: i64,
) -> SweepPlan {
    let mut purge_all = false;
    let mut delete = BTreeSet::new();

    for record in records.values() {
        let Some(CacheValue::Map(entries)) = record else {
            continue;
        };
        for (key, stamp) in entries {
            let Some(timestamp) = stamp.as_int() else {
                continue;
            };
            if timestamp < checkpoint {
                continue;
            }
            if key == PURGED_KEY {
                purge_all = true;
                break;
            }
            delete.insert(CacheKey::Str(key.clone()));
        }
    }

    SweepPlan {
        purge_all,
        delete: delete.into_iter().collect(),
    }
}

/// Merge freshly invalidated keys into an existing event record.
pub(crate) fn merge_event_record(
    existing: Option<&CacheValue>,
    keys: &[CacheKey],
    now: i64,
) -> CacheValue {
    let mut entries = match existing {
        Some(CacheValue::Map(map)) => map.clone(),
        _ => BTreeMap::new(),
    };
    for key in keys {
        entries.insert(key.as_key_string().into_owned(), CacheValue::Int(now));
    }
    CacheValue::Map(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entries: &[(&str, i64)]) -> Option<CacheValue> {
        Some(CacheValue::Map(
            entries
                .iter()
                .map(|(key, ts)| (key.to_string(), CacheValue::Int(*ts)))
                .collect(),
        ))
    }

    #[test]
    fn only_keys_at_or_after_checkpoint_are_collected() {
        let records = HashMap::from([(
            CacheKey::from("changesincourse"),
            record(&[("stale", 5), ("boundary", 10), ("fresh", 15)]),
        )]);

        let plan = plan_sweep(&records, 10);
        assert!(!plan.purge_all);
        assert_eq!(
            plan.delete,
            vec![CacheKey::from("boundary"), CacheKey::from("fresh")]
        );
    }

    #[test]
    fn purged_sentinel_forces_full_purge() {
        let records = HashMap::from([(
            CacheKey::from("changesincourse"),
            record(&[("purged", 12), ("ignored", 20)]),
        )]);

        let plan = plan_sweep(&records, 10);
        assert!(plan.purge_all);
    }

    #[test]
    fn stale_purge_sentinel_is_ignored() {
        let records = HashMap::from([(
            CacheKey::from("changesincourse"),
            record(&[("purged", 3), ("fresh", 20)]),
        )]);

        let plan = plan_sweep(&records, 10);
        assert!(!plan.purge_all);
        assert_eq!(plan.delete, vec![CacheKey::from("fresh")]);
    }

    #[test]
    fn duplicate_keys_across_events_are_deduplicated() {
        let records = HashMap::from([
            (CacheKey::from("event_a"), record(&[("k", 11)])),
            (CacheKey::from("event_b"), record(&[("k", 14)])),
        ]);

        let plan = plan_sweep(&records, 10);
        assert_eq!(plan.delete, vec![CacheKey::from("k")]);
    }

    #[test]
    fn missing_and_malformed_records_are_skipped() {
        let records = HashMap::from([
            (CacheKey::from("quiet"), None),
            (CacheKey::from("odd"), Some(CacheValue::Int(1))),
            (
                CacheKey::from("partial"),
                Some(CacheValue::Map(BTreeMap::from([(
                    "bad-stamp".to_string(),
                    CacheValue::from("soon"),
                )]))),
            ),
        ]);

        let plan = plan_sweep(&records, 0);
        assert!(plan.is_empty());
    }

    #[test]
    fn merge_preserves_existing_entries() {
        let existing = record(&[("old", 5)]).unwrap();
        let merged = merge_event_record(
            Some(&existing),
            &[CacheKey::from("new"), CacheKey::Int(7)],
            30,
        );

        let map = merged.as_map().expect("map record");
        assert_eq!(map.get("old"), Some(&CacheValue::Int(5)));
        assert_eq!(map.get("new"), Some(&CacheValue::Int(30)));
        assert_eq!(map.get("7"), Some(&CacheValue::Int(30)));
    }
}
