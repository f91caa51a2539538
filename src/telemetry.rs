//! Metric names and registration.
//!
//! Counters carry `store` and `area` labels; acceleration hits are
//! labelled with the pseudo-store `"static-acceleration"` so dashboards
//! can separate in-process hits from backend hits.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};

pub const METRIC_CACHE_HIT_TOTAL: &str = "cascata_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "cascata_cache_miss_total";
pub const METRIC_CACHE_SET_TOTAL: &str = "cascata_cache_set_total";
pub const METRIC_CACHE_LOCK_DENIED_TOTAL: &str = "cascata_cache_lock_denied_total";
pub const METRIC_CACHE_SWEEP_MS: &str = "cascata_cache_sweep_ms";
pub const METRIC_STORE_EVICT_TOTAL: &str = "cascata_store_evict_total";

/// Store label used for hits served from the static acceleration table.
pub const ACCELERATION_STORE_LABEL: &str = "static-acceleration";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Register metric descriptions with the installed recorder. Safe to
/// call more than once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Total number of cache hits, labelled by store and area."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Total number of cache misses, labelled by store and area."
        );
        describe_counter!(
            METRIC_CACHE_SET_TOTAL,
            Unit::Count,
            "Total number of cache writes, labelled by store and area."
        );
        describe_counter!(
            METRIC_CACHE_LOCK_DENIED_TOTAL,
            Unit::Count,
            "Total number of advisory lock attempts refused due to contention."
        );
        describe_histogram!(
            METRIC_CACHE_SWEEP_MS,
            Unit::Milliseconds,
            "Invalidation sweep latency in milliseconds."
        );
        describe_counter!(
            METRIC_STORE_EVICT_TOTAL,
            Unit::Count,
            "Total number of store entries evicted due to capacity."
        );
    });
}
