//! Cache metrics.
//!
//! Two views of the same events:
//! - `CacheCounters`: process-wide atomics behind `CacheMetrics`, which the
//!   admin surface returns as JSON
//! - Prometheus series through the `metrics` facade, rendered by `render_metrics`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cache::SourceTier;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_SETS_TOTAL: &str = "cache_sets_total";
    pub const CACHE_DELETES_TOTAL: &str = "cache_deletes_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_GET_DURATION_SECONDS: &str = "cache_get_duration_seconds";
    pub const CACHE_ENTRIES: &str = "cache_entries";
    pub const CACHE_MEMORY_BYTES: &str = "cache_memory_bytes";
    pub const CACHE_REMOTE_CONNECTED: &str = "cache_remote_connected";

    // Origin metrics
    pub const ORIGIN_REQUESTS_TOTAL: &str = "origin_requests_total";

    // Warming metrics
    pub const WARMING_RUNS_TOTAL: &str = "cache_warming_runs_total";
    pub const WARMING_CATEGORY_FAILURES_TOTAL: &str = "cache_warming_category_failures_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Snapshot of the engine's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub hits: u64,
    pub memory_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub avg_response_time_ms: f64,
    pub memory_usage_bytes: u64,
    pub remote_connected: bool,
}

impl CacheMetrics {
    /// Hit rate as a percentage of all lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Process-wide counters, monotonic until restart.
#[derive(Debug, Default)]
pub struct CacheCounters {
    memory_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    lookup_micros: AtomicU64,
    lookups: AtomicU64,
}

impl CacheCounters {
    pub fn record_hit(&self, tier: SourceTier) {
        match tier {
            SourceTier::Remote => self.remote_hits.fetch_add(1, Ordering::Relaxed),
            _ => self.memory_hits.fetch_add(1, Ordering::Relaxed),
        };
        counter!(names::CACHE_HITS_TOTAL, "tier" => tier.as_str()).increment(1);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_MISSES_TOTAL).increment(1);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_SETS_TOTAL).increment(1);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_DELETES_TOTAL).increment(1);
    }

    /// Count a tier-level failure. `tier` and `op` become Prometheus labels.
    pub fn record_error(&self, tier: SourceTier, op: &'static str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_ERRORS_TOTAL, "tier" => tier.as_str(), "op" => op).increment(1);
    }

    pub fn record_lookup_time(&self, elapsed: Duration) {
        self.lookup_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.lookups.fetch_add(1, Ordering::Relaxed);
        histogram!(names::CACHE_GET_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self, memory_usage_bytes: u64, remote_connected: bool) -> CacheMetrics {
        let memory_hits = self.memory_hits.load(Ordering::Relaxed);
        let remote_hits = self.remote_hits.load(Ordering::Relaxed);
        let lookups = self.lookups.load(Ordering::Relaxed);
        let avg_response_time_ms = if lookups == 0 {
            0.0
        } else {
            self.lookup_micros.load(Ordering::Relaxed) as f64 / lookups as f64 / 1000.0
        };

        CacheMetrics {
            hits: memory_hits + remote_hits,
            memory_hits,
            remote_hits,
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            avg_response_time_ms,
            memory_usage_bytes,
            remote_connected,
        }
    }
}

/// Publish in-process tier gauges after a sweep.
pub fn set_memory_gauges(entries: usize, bytes: u64) {
    gauge!(names::CACHE_ENTRIES, "tier" => "memory").set(entries as f64);
    gauge!(names::CACHE_MEMORY_BYTES).set(bytes as f64);
}

pub fn set_remote_connected(connected: bool) {
    gauge!(names::CACHE_REMOTE_CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

/// Record one upstream call and its outcome (`ok`, `rate_limited`, `status`, ...).
pub fn record_origin_request(operation: &'static str, outcome: &'static str) {
    counter!(
        names::ORIGIN_REQUESTS_TOTAL,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_warming_run(trigger: &'static str, failed: usize) {
    counter!(names::WARMING_RUNS_TOTAL, "trigger" => trigger).increment(1);
    if failed > 0 {
        counter!(names::WARMING_CATEGORY_FAILURES_TOTAL, "trigger" => trigger)
            .increment(failed as u64);
    }
}
