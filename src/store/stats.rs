//! Cache Statistics Module
//!
//! Tracks cache-aside metrics: hits, misses, fallback calls and store
//! errors absorbed by the read path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Stats Recorder ==
/// Lock-free counters shared by clones of the orchestrator.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    fallback_calls: AtomicU64,
    fallback_empty: AtomicU64,
    store_errors: AtomicU64,
    invalidated: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallback_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Fallback produced nothing, so nothing was cached.
    pub fn record_fallback_empty(&self) {
        self.fallback_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidated(&self, count: u64) {
        self.invalidated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fallback_calls: self.fallback_calls.load(Ordering::Relaxed),
            fallback_empty: self.fallback_empty.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
        }
    }
}

// == Cache Stats ==
/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads served from the store
    pub hits: u64,
    /// Reads that found nothing
    pub misses: u64,
    /// Fallback invocations
    pub fallback_calls: u64,
    /// Fallback invocations that produced no value
    pub fallback_empty: u64,
    /// Store failures swallowed by the read or populate path
    pub store_errors: u64,
    /// Keys removed by tag or pattern invalidation
    pub invalidated: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
