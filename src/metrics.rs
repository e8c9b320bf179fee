//! Metrics collection for the access engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for engine operations.
///
/// The `in_flight` gauge is the single source of truth for "is anything
/// loading": it is maintained by RAII guards around every remote operation,
/// and UI loading state should be a pure projection of `in_flight() > 0`
/// rather than an independently toggled flag.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    permission_checks: AtomicU64,
    permission_denials: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced_waits: AtomicU64,
    remote_calls: AtomicU64,
    stale_results_discarded: AtomicU64,
    in_flight: AtomicU64,
}

impl EngineMetrics {
    /// Create a fresh collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a permission check and whether it was denied.
    pub fn record_permission_check(&self, granted: bool) {
        self.permission_checks.fetch_add(1, Ordering::Relaxed);
        if !granted {
            self.permission_denials.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read that attached to an already-pending fetch.
    pub fn record_coalesced_wait(&self) {
        self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call issued to the remote store.
    pub fn record_remote_call(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fetch result discarded because an invalidation superseded it.
    pub fn record_stale_discard(&self) {
        self.stale_results_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Begin an in-flight remote operation; the gauge drops with the guard.
    pub fn flight_guard(self: &Arc<Self>) -> FlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        FlightGuard {
            metrics: Arc::clone(self),
        }
    }

    /// Number of remote operations currently in flight.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Whether any remote operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }

    /// Total permission checks performed.
    pub fn permission_checks(&self) -> u64 {
        self.permission_checks.load(Ordering::Relaxed)
    }

    /// Permission checks that were denied.
    pub fn permission_denials(&self) -> u64 {
        self.permission_denials.load(Ordering::Relaxed)
    }

    /// Cache hits observed.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Cache misses observed.
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Reads that shared another caller's pending fetch.
    pub fn coalesced_waits(&self) -> u64 {
        self.coalesced_waits.load(Ordering::Relaxed)
    }

    /// Calls issued to the remote store.
    pub fn remote_calls(&self) -> u64 {
        self.remote_calls.load(Ordering::Relaxed)
    }

    /// Fetch results discarded as stale.
    pub fn stale_results_discarded(&self) -> u64 {
        self.stale_results_discarded.load(Ordering::Relaxed)
    }

    /// Ratio of hits to total cache lookups, 0.0 when no lookups happened.
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits();
        let total = hits + self.cache_misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// RAII guard that keeps the in-flight gauge raised for the duration of a
/// remote operation.
#[derive(Debug)]
pub struct FlightGuard {
    metrics: Arc<EngineMetrics>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
