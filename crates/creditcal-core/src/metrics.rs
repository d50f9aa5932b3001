//! Calendar core metrics.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "credit_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "credit_cache_misses_total";
    /// Callers that joined another caller's in-flight load.
    pub const CACHE_JOINS_TOTAL: &str = "credit_cache_joins_total";
    pub const MONTH_DEGRADED_TOTAL: &str = "credit_month_degraded_total";
    pub const SYNC_BATCHES_TOTAL: &str = "credit_sync_batches_total";
    /// Sync calls answered by a batch they did not start.
    pub const SYNC_COALESCED_TOTAL: &str = "credit_sync_coalesced_calls_total";
}

pub fn record_cache_hit(cache: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "cache" => cache).increment(1);
}

pub fn record_cache_miss(cache: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "cache" => cache).increment(1);
}

pub fn record_cache_join(cache: &'static str) {
    counter!(names::CACHE_JOINS_TOTAL, "cache" => cache).increment(1);
}

pub fn record_month_degraded(reason: &'static str) {
    counter!(names::MONTH_DEGRADED_TOTAL, "reason" => reason).increment(1);
}

/// Record a fired sync batch serving `waiters` callers.
pub fn record_sync_batch(waiters: usize) {
    counter!(names::SYNC_BATCHES_TOTAL).increment(1);
    counter!(names::SYNC_COALESCED_TOTAL).increment(waiters.saturating_sub(1) as u64);
}
