//! Memory Transport
//!
//! Transport over an in-process `MemoryStore`. Used for single-instance
//! deployments and as a deterministic store in tests, with switches to
//! refuse connections or drop live sessions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::connection::transport::{Connector, ListEnd, Transport, TransportResult};
use crate::error::TransportError;
use crate::store::MemoryStore;

#[derive(Debug, Default)]
struct Faults {
    /// Connection attempts still to be refused
    refuse_connects: AtomicU32,
    /// Refuse connects and fail commands until cleared
    offline: AtomicBool,
    /// Sessions opened before the current generation are dead
    generation: AtomicU64,
    connect_calls: AtomicU32,
}

// == Memory Connector ==
/// Hands out sessions over one shared `MemoryStore`.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<RwLock<MemoryStore>>,
    faults: Arc<Faults>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared store, e.g. for the expiry sweep task.
    pub fn store(&self) -> Arc<RwLock<MemoryStore>> {
        Arc::clone(&self.store)
    }

    /// Refuses the next `count` connection attempts.
    pub fn refuse_next_connects(&self, count: u32) {
        self.faults.refuse_connects.store(count, Ordering::SeqCst);
    }

    /// Takes the store offline (or back online).
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    /// Breaks every open session; later connects succeed again.
    pub fn drop_connections(&self) {
        self.faults.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of connection attempts seen so far.
    pub fn connect_attempts(&self) -> u32 {
        self.faults.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> TransportResult<Arc<dyn Transport>> {
        self.faults.connect_calls.fetch_add(1, Ordering::SeqCst);

        if self.faults.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Io("connection refused".to_string()));
        }
        let refused = self
            .faults
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Io("connection refused".to_string()));
        }

        Ok(Arc::new(MemoryTransport {
            store: Arc::clone(&self.store),
            faults: Arc::clone(&self.faults),
            generation: self.faults.generation.load(Ordering::SeqCst),
        }))
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

// == Memory Transport ==
/// One session over the shared store.
#[derive(Debug)]
pub struct MemoryTransport {
    store: Arc<RwLock<MemoryStore>>,
    faults: Arc<Faults>,
    generation: u64,
}

impl MemoryTransport {
    fn check(&self) -> TransportResult<()> {
        if self.faults.offline.load(Ordering::SeqCst)
            || self.faults.generation.load(Ordering::SeqCst) != self.generation
        {
            return Err(TransportError::Io("connection reset by peer".to_string()));
        }
        Ok(())
    }

    /// Locks the store for one command, yielding first like a network round trip.
    async fn session(&self) -> TransportResult<RwLockWriteGuard<'_, MemoryStore>> {
        tokio::task::yield_now().await;
        self.check()?;
        Ok(self.store.write().await)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn ping(&self) -> TransportResult<()> {
        self.check()
    }

    async fn get(&self, key: &str) -> TransportResult<Option<String>> {
        self.session().await?.get(key)
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> TransportResult<()> {
        self.session().await?.set(key, value, ttl_seconds)
    }

    async fn del(&self, keys: &[String]) -> TransportResult<u64> {
        Ok(self.session().await?.del(keys))
    }

    async fn exists(&self, key: &str) -> TransportResult<bool> {
        Ok(self.session().await?.exists(key))
    }

    async fn ttl(&self, key: &str) -> TransportResult<i64> {
        Ok(self.session().await?.ttl(key))
    }

    async fn pttl(&self, key: &str) -> TransportResult<i64> {
        Ok(self.session().await?.pttl(key))
    }

    async fn expire(&self, key: &str, seconds: u64) -> TransportResult<bool> {
        let mut store = self.session().await?;
        store.expire(key, Duration::from_secs(seconds))
    }

    async fn pexpire(&self, key: &str, millis: u64) -> TransportResult<bool> {
        let mut store = self.session().await?;
        store.expire(key, Duration::from_millis(millis))
    }

    async fn persist(&self, key: &str) -> TransportResult<bool> {
        Ok(self.session().await?.persist(key))
    }

    async fn scan(&self, pattern: &str) -> TransportResult<Vec<String>> {
        self.session().await?.keys(pattern)
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> TransportResult<()> {
        self.session().await?.hset(key, field, value)
    }

    async fn hget(&self, key: &str, field: &str) -> TransportResult<Option<String>> {
        self.session().await?.hget(key, field)
    }

    async fn hgetall(&self, key: &str) -> TransportResult<HashMap<String, String>> {
        self.session().await?.hgetall(key)
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> TransportResult<u64> {
        self.session().await?.hdel(key, fields)
    }

    async fn hincr(&self, key: &str, field: &str, delta: i64) -> TransportResult<i64> {
        self.session().await?.hincr(key, field, delta)
    }

    async fn push(&self, key: &str, end: ListEnd, values: Vec<String>) -> TransportResult<u64> {
        self.session().await?.push(key, end, values)
    }

    async fn pop(&self, key: &str, end: ListEnd) -> TransportResult<Option<String>> {
        self.session().await?.pop(key, end)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> TransportResult<Vec<String>> {
        self.session().await?.lrange(key, start, stop)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> TransportResult<u64> {
        self.session().await?.sadd(key, members)
    }

    async fn smembers(&self, key: &str) -> TransportResult<HashSet<String>> {
        self.session().await?.smembers(key)
    }

    async fn srem(&self, key: &str, members: &[String]) -> TransportResult<u64> {
        self.session().await?.srem(key, members)
    }
}
