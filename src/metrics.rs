// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for country-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding service chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `country_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `family`: country, list, region
//! - `backend`: sql, memory
//! - `operation`: get, put, invalidate, save, update, ...
//! - `outcome`: success, error, empty, source_unavailable, ...

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a cache lookup result for a key family
pub fn record_cache_lookup(family: &str, hit: bool) {
    counter!(
        "country_sync_cache_lookups_total",
        "family" => family.to_string(),
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Record a swallowed cache backend failure
pub fn record_cache_error(operation: &str) {
    counter!(
        "country_sync_cache_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record how many keys an invalidation removed
pub fn record_invalidation(family: &str, removed: u64) {
    counter!(
        "country_sync_cache_invalidated_keys_total",
        "family" => family.to_string()
    )
    .increment(removed);
}

/// Record store operation latency
pub fn record_store_latency(backend: &str, operation: &str, duration: Duration) {
    histogram!(
        "country_sync_store_operation_seconds",
        "backend" => backend.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the end of a sync run
pub fn record_sync_run(outcome: &str, duration: Duration) {
    counter!(
        "country_sync_sync_runs_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("country_sync_sync_duration_seconds").record(duration.as_secs_f64());
}

/// Record records dropped by the population filter
pub fn record_filtered(count: usize) {
    counter!("country_sync_filtered_records_total").increment(count as u64);
}

/// Record records persisted by a sync
pub fn record_persisted(count: usize) {
    counter!("country_sync_persisted_records_total").increment(count as u64);
}

/// Record a persistence task rejected because the pool was saturated
pub fn record_pool_rejection() {
    counter!("country_sync_persist_pool_rejections_total").increment(1);
}

/// Set the number of persistence tasks currently running
pub fn set_pool_active(count: usize) {
    gauge!("country_sync_persist_pool_active").set(count as f64);
}

/// Record a service call outcome
pub fn record_service_call(operation: &str, outcome: &str) {
    counter!(
        "country_sync_service_calls_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Timer guard for measuring store latency
pub struct LatencyTimer {
    backend: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(backend: &'static str, operation: &'static str) -> Self {
        Self {
            backend,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_store_latency(self.backend, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No recorder is installed; these check the calls don't panic.

    #[test]
    fn test_cache_metrics() {
        record_cache_lookup("country", true);
        record_cache_lookup("list", false);
        record_cache_error("get");
        record_invalidation("region", 3);
    }

    #[test]
    fn test_sync_metrics() {
        record_sync_run("success", Duration::from_millis(120));
        record_sync_run("source_unavailable", Duration::from_secs(30));
        record_filtered(7);
        record_persisted(200);
        record_pool_rejection();
        set_pool_active(4);
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("memory", "find_by_id");
            std::thread::sleep(Duration::from_micros(10));
        }
        record_service_call("get_by_id", "not_found");
    }
}
