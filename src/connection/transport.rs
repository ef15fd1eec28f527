//! Transport Seam
//!
//! Raw command surface of a key-value store, implemented by the Redis
//! client and by the in-process memory backend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;

/// Result type for raw transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Which end of a list a push or pop works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    Left,
    Right,
}

/// An established session with the store.
///
/// Values cross this boundary as already-encoded text. TTL replies follow
/// the Redis convention: `-2` for a missing key, `-1` for no expiry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn ping(&self) -> TransportResult<()>;

    async fn get(&self, key: &str) -> TransportResult<Option<String>>;
    /// `ttl_seconds == 0` stores without expiry.
    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> TransportResult<()>;
    async fn del(&self, keys: &[String]) -> TransportResult<u64>;
    async fn exists(&self, key: &str) -> TransportResult<bool>;
    async fn ttl(&self, key: &str) -> TransportResult<i64>;
    async fn pttl(&self, key: &str) -> TransportResult<i64>;
    async fn expire(&self, key: &str, seconds: u64) -> TransportResult<bool>;
    async fn pexpire(&self, key: &str, millis: u64) -> TransportResult<bool>;
    async fn persist(&self, key: &str) -> TransportResult<bool>;
    /// Keys matching a glob pattern.
    async fn scan(&self, pattern: &str) -> TransportResult<Vec<String>>;

    async fn hset(&self, key: &str, field: &str, value: String) -> TransportResult<()>;
    async fn hget(&self, key: &str, field: &str) -> TransportResult<Option<String>>;
    async fn hgetall(&self, key: &str) -> TransportResult<HashMap<String, String>>;
    async fn hdel(&self, key: &str, fields: &[String]) -> TransportResult<u64>;
    /// Adds `delta` to an integer field and returns the new value.
    async fn hincr(&self, key: &str, field: &str, delta: i64) -> TransportResult<i64>;

    async fn push(&self, key: &str, end: ListEnd, values: Vec<String>) -> TransportResult<u64>;
    async fn pop(&self, key: &str, end: ListEnd) -> TransportResult<Option<String>>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> TransportResult<Vec<String>>;

    async fn sadd(&self, key: &str, members: &[String]) -> TransportResult<u64>;
    async fn smembers(&self, key: &str) -> TransportResult<HashSet<String>>;
    async fn srem(&self, key: &str, members: &[String]) -> TransportResult<u64>;
}

/// Opens transports; one call per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> TransportResult<Arc<dyn Transport>>;

    /// Endpoint description for health output. Never includes credentials.
    fn endpoint(&self) -> String;
}
