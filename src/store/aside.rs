//! Cache-Aside Orchestrator
//!
//! Read-through helper on top of the adapter and the tag index. Store
//! failures on the read path are absorbed so a cache outage degrades to
//! calling the source of truth.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::stats::{CacheStats, StatsRecorder};
use crate::store::{CacheValue, StoreAdapter, TagIndex};

type InFlight = DashMap<String, Arc<Mutex<()>>>;

// == Cache Aside ==
#[derive(Clone)]
pub struct CacheAside {
    store: StoreAdapter,
    tags: TagIndex,
    default_ttl: u64,
    stats: Arc<StatsRecorder>,
    in_flight: Option<Arc<InFlight>>,
}

impl CacheAside {
    /// Creates an orchestrator; `default_ttl` applies when a write gives none.
    pub fn new(store: StoreAdapter, default_ttl: u64) -> Self {
        Self {
            tags: TagIndex::new(store.clone()),
            store,
            default_ttl,
            stats: Arc::new(StatsRecorder::new()),
            in_flight: None,
        }
    }

    /// Enables per-key single-flight for `get_with_fallback`.
    ///
    /// With coalescing on, concurrent misses for one key run the fallback
    /// once; the other callers wait and re-read the cache.
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.in_flight = enabled.then(|| Arc::new(DashMap::new()));
        self
    }

    pub fn store(&self) -> &StoreAdapter {
        &self.store
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    // == Direct Access ==
    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let value = self.store.get(key).await?;
        self.record_lookup(value.is_some());
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &CacheValue, ttl: Option<u64>) -> Result<()> {
        self.store
            .set(key, value, ttl.unwrap_or(self.default_ttl))
            .await
    }

    pub async fn del(&self, key: &str) -> Result<bool> {
        self.store.del(key).await
    }

    // == Read Through ==
    /// Returns the cached value, or loads it with `fallback` and caches it.
    ///
    /// # Arguments
    /// * `key` - Cache key
    /// * `ttl` - TTL in seconds for a loaded value, default TTL when `None`
    /// * `fallback` - Loader for the source of truth
    ///
    /// # Returns
    /// The cached or loaded value. Only `Some` results are cached, and an
    /// error from `fallback` is returned as is. Store errors never reach
    /// the caller.
    pub async fn get_with_fallback<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<u64>,
        fallback: F,
    ) -> std::result::Result<Option<CacheValue>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<CacheValue>, E>>,
    {
        let cached = self.lookup(key).await;
        self.record_lookup(cached.is_some());
        if cached.is_some() {
            return Ok(cached);
        }

        match &self.in_flight {
            None => self.load(key, ttl, fallback).await,
            Some(in_flight) => {
                let lock = in_flight.entry(key.to_string()).or_default().clone();
                let guard = lock.lock_owned().await;

                let result = match self.lookup(key).await {
                    Some(value) => {
                        debug!(key, "Coalesced miss served by concurrent load");
                        Ok(Some(value))
                    }
                    None => self.load(key, ttl, fallback).await,
                };

                drop(guard);
                in_flight.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
                result
            }
        }
    }

    async fn load<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<u64>,
        fallback: F,
    ) -> std::result::Result<Option<CacheValue>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<CacheValue>, E>>,
    {
        self.stats.record_fallback();
        let loaded = fallback().await?;

        match &loaded {
            Some(value) => {
                let ttl = ttl.unwrap_or(self.default_ttl);
                if let Err(err) = self.store.set(key, value, ttl).await {
                    self.stats.record_store_error();
                    warn!(key, error = %err, "Failed to populate cache after fallback");
                }
            }
            None => self.stats.record_fallback_empty(),
        }
        Ok(loaded)
    }

    /// Cache read that treats any store failure as a miss.
    async fn lookup(&self, key: &str) -> Option<CacheValue> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                self.stats.record_store_error();
                warn!(key, error = %err, "Cache read failed, falling back");
                None
            }
        }
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
    }

    // == Tagging and Invalidation ==
    pub async fn set_with_tags(
        &self,
        key: &str,
        value: &CacheValue,
        tags: &[&str],
        ttl: Option<u64>,
    ) -> Result<()> {
        self.tags
            .set_with_tags(key, value, tags, ttl.unwrap_or(self.default_ttl))
            .await
    }

    /// Deletes every key under `tag`, returning how many existed.
    pub async fn invalidate_by_tag(&self, tag: &str) -> Result<u64> {
        let removed = self.tags.invalidate_by_tag(tag).await?;
        self.stats.record_invalidated(removed);
        Ok(removed)
    }

    /// Deletes every key matching a glob pattern.
    ///
    /// Walks the whole keyspace, so keep it for administrative sweeps. Tag
    /// records of deleted keys are left in place.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let keys = self.store.scan(pattern).await?;
        let removed = self.store.del_many(&keys).await?;
        self.stats.record_invalidated(removed);
        debug!(pattern, removed, "Pattern invalidated");
        Ok(removed)
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }
}
