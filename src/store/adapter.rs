//! Typed Store Adapter
//!
//! Scalar, hash, list and set operations over the managed connection,
//! with values crossing the `CacheValue` encode/decode boundary.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::connection::{ConnectionManager, ListEnd, Transport};
use crate::error::{CacheError, Result, TransportError};
use crate::store::CacheValue;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    NoExpiry,
    Seconds(u64),
}

impl KeyTtl {
    fn from_reply(reply: i64) -> Self {
        match reply {
            -2 => KeyTtl::Missing,
            r if r < 0 => KeyTtl::NoExpiry,
            r => KeyTtl::Seconds(r as u64),
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

// == Store Adapter ==
/// Typed operations over the shared connection.
///
/// Every call fails fast with `StoreUnavailable` while the connection is
/// not ready. A transport failure is reported to the manager, which starts
/// at most one reconnection, and surfaces here as `StoreUnavailable`.
#[derive(Clone)]
pub struct StoreAdapter {
    manager: Arc<ConnectionManager>,
}

impl StoreAdapter {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn is_ready(&self) -> bool {
        self.manager.is_ready()
    }

    /// Runs one command against the live transport.
    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Transport>) -> Fut,
        Fut: Future<Output = std::result::Result<T, TransportError>>,
    {
        let transport = self.manager.transport()?;
        command(transport).await.map_err(|err| match err {
            TransportError::Io(reason) => {
                debug!(op, error = %reason, "Store transport failure");
                self.manager.report_failure(&reason);
                CacheError::StoreUnavailable(reason)
            }
            TransportError::Command(reason) => CacheError::Command(reason),
        })
    }

    // == Scalars ==
    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let raw = self.run("get", |t| async move { t.get(key).await }).await?;
        Ok(raw.map(CacheValue::decode))
    }

    /// Stores a value; `ttl_seconds == 0` means no expiry.
    pub async fn set(&self, key: &str, value: &CacheValue, ttl_seconds: u64) -> Result<()> {
        let encoded = value.encode();
        self.run("set", |t| async move { t.set(key, encoded, ttl_seconds).await })
            .await
    }

    /// Deletes a key; true if it existed.
    pub async fn del(&self, key: &str) -> Result<bool> {
        Ok(self.del_many(&[key.to_string()]).await? > 0)
    }

    /// Deletes keys, returning how many existed.
    pub async fn del_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run("del", |t| async move { t.del(keys).await }).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.run("exists", |t| async move { t.exists(key).await })
            .await
    }

    pub async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let reply = self.run("ttl", |t| async move { t.ttl(key).await }).await?;
        Ok(KeyTtl::from_reply(reply))
    }

    /// Remaining lifetime with millisecond precision; None if missing or persistent.
    pub async fn pttl(&self, key: &str) -> Result<Option<Duration>> {
        let reply = self.run("pttl", |t| async move { t.pttl(key).await }).await?;
        Ok((reply >= 0).then(|| Duration::from_millis(reply as u64)))
    }

    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        self.run("expire", |t| async move { t.expire(key, seconds).await })
            .await
    }

    pub async fn pexpire(&self, key: &str, millis: u64) -> Result<bool> {
        self.run("pexpire", |t| async move { t.pexpire(key, millis).await })
            .await
    }

    pub async fn persist(&self, key: &str) -> Result<bool> {
        self.run("persist", |t| async move { t.persist(key).await })
            .await
    }

    /// Keys matching a glob pattern.
    pub async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        self.run("scan", |t| async move { t.scan(pattern).await })
            .await
    }

    // == Hashes ==
    pub async fn hset(&self, key: &str, field: &str, value: &CacheValue) -> Result<()> {
        let encoded = value.encode();
        self.run("hset", |t| async move { t.hset(key, field, encoded).await })
            .await
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<CacheValue>> {
        let raw = self
            .run("hget", |t| async move { t.hget(key, field).await })
            .await?;
        Ok(raw.map(CacheValue::decode))
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, CacheValue>> {
        let raw = self
            .run("hgetall", |t| async move { t.hgetall(key).await })
            .await?;
        Ok(raw
            .into_iter()
            .map(|(field, value)| (field, CacheValue::decode(value)))
            .collect())
    }

    /// Removes fields, returning how many existed.
    pub async fn hdel(&self, key: &str, fields: &[&str]) -> Result<u64> {
        let fields = owned(fields);
        self.run("hdel", |t| async move { t.hdel(key, &fields).await })
            .await
    }

    /// Atomically adds `delta` to an integer field, returning the new value.
    pub async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.run("hincr", |t| async move { t.hincr(key, field, delta).await })
            .await
    }

    // == Lists ==
    pub async fn lpush(&self, key: &str, values: &[CacheValue]) -> Result<u64> {
        self.push(key, ListEnd::Left, values).await
    }

    pub async fn rpush(&self, key: &str, values: &[CacheValue]) -> Result<u64> {
        self.push(key, ListEnd::Right, values).await
    }

    async fn push(&self, key: &str, end: ListEnd, values: &[CacheValue]) -> Result<u64> {
        let encoded: Vec<String> = values.iter().map(CacheValue::encode).collect();
        self.run("push", |t| async move { t.push(key, end, encoded).await })
            .await
    }

    pub async fn lpop(&self, key: &str) -> Result<Option<CacheValue>> {
        self.pop(key, ListEnd::Left).await
    }

    pub async fn rpop(&self, key: &str) -> Result<Option<CacheValue>> {
        self.pop(key, ListEnd::Right).await
    }

    async fn pop(&self, key: &str, end: ListEnd) -> Result<Option<CacheValue>> {
        let raw = self
            .run("pop", |t| async move { t.pop(key, end).await })
            .await?;
        Ok(raw.map(CacheValue::decode))
    }

    /// Inclusive range, negative indices count from the end.
    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<CacheValue>> {
        let raw = self
            .run("lrange", |t| async move { t.lrange(key, start, stop).await })
            .await?;
        Ok(raw.into_iter().map(CacheValue::decode).collect())
    }

    // == Sets ==
    /// Adds members, returning how many were new.
    pub async fn sadd(&self, key: &str, members: &[&str]) -> Result<u64> {
        let members = owned(members);
        self.run("sadd", |t| async move { t.sadd(key, &members).await })
            .await
    }

    pub async fn smembers(&self, key: &str) -> Result<HashSet<String>> {
        self.run("smembers", |t| async move { t.smembers(key).await })
            .await
    }

    /// Removes members, returning how many existed.
    pub async fn srem(&self, key: &str, members: &[&str]) -> Result<u64> {
        let members = owned(members);
        self.run("srem", |t| async move { t.srem(key, &members).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{BackoffPolicy, ConnectionState, MemoryConnector};
    use serde_json::json;

    async fn ready_adapter() -> (MemoryConnector, StoreAdapter) {
        let connector = MemoryConnector::new();
        let policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(50), 3);
        let manager = ConnectionManager::new(Arc::new(connector.clone()), policy);
        manager.connect().await.unwrap();
        (connector, StoreAdapter::new(manager))
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_get_with_ttl() {
        let (_, store) = ready_adapter().await;
        let session = CacheValue::from(json!({"uid": 42}));

        store.set("session:42", &session, 60).await.unwrap();
        assert_eq!(store.get("session:42").await.unwrap(), Some(session));
        assert_eq!(store.ttl("session:42").await.unwrap(), KeyTtl::Seconds(60));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("session:42").await.unwrap(), None);
        assert_eq!(store.ttl("session:42").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_keyspace_operations() {
        let (_, store) = ready_adapter().await;
        store.set("k", &CacheValue::from("v"), 0).await.unwrap();

        assert!(store.exists("k").await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::NoExpiry);
        assert!(store.expire("k", 30).await.unwrap());
        assert_eq!(store.pttl("k").await.unwrap().map(|d| d.as_secs() <= 30), Some(true));
        assert!(store.persist("k").await.unwrap());
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.pttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let (_, store) = ready_adapter().await;

        store.hset("user:1", "name", &CacheValue::from("ada")).await.unwrap();
        store
            .hset("user:1", "prefs", &CacheValue::from(json!({"theme": "dark"})))
            .await
            .unwrap();

        assert_eq!(
            store.hget("user:1", "name").await.unwrap(),
            Some(CacheValue::from("ada"))
        );
        let all = store.hgetall("user:1").await.unwrap();
        assert_eq!(all["prefs"], CacheValue::from(json!({"theme": "dark"})));
        assert_eq!(store.hdel("user:1", &["name", "nope"]).await.unwrap(), 1);
        assert_eq!(store.hincr("user:1", "visits", 2).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_operations_preserve_order() {
        let (_, store) = ready_adapter().await;
        let values: Vec<CacheValue> = ["a", "b", "c"].into_iter().map(CacheValue::from).collect();

        assert_eq!(store.rpush("queue", &values).await.unwrap(), 3);
        assert_eq!(store.lpush("queue", &[CacheValue::from("z")]).await.unwrap(), 4);
        assert_eq!(
            store.lrange("queue", 0, -1).await.unwrap(),
            vec![
                CacheValue::from("z"),
                CacheValue::from("a"),
                CacheValue::from("b"),
                CacheValue::from("c"),
            ]
        );
        assert_eq!(store.lpop("queue").await.unwrap(), Some(CacheValue::from("z")));
        assert_eq!(store.rpop("queue").await.unwrap(), Some(CacheValue::from("c")));
    }

    #[tokio::test]
    async fn test_set_operations() {
        let (_, store) = ready_adapter().await;

        assert_eq!(store.sadd("tags", &["a", "b", "a"]).await.unwrap(), 2);
        assert_eq!(store.srem("tags", &["a"]).await.unwrap(), 1);
        let members = store.smembers("tags").await.unwrap();
        assert_eq!(members, HashSet::from(["b".to_string()]));
    }

    #[tokio::test]
    async fn test_corrupted_value_returns_raw_text() {
        let (connector, store) = ready_adapter().await;
        connector
            .store()
            .write()
            .await
            .set("broken", "[1, 2".to_string(), 0)
            .unwrap();

        assert_eq!(
            store.get("broken").await.unwrap(),
            Some(CacheValue::Scalar("[1, 2".to_string()))
        );
    }

    #[tokio::test]
    async fn test_json_looking_scalars_keep_their_variant() {
        let (_, store) = ready_adapter().await;
        let values = [
            CacheValue::from("[1,2]"),
            CacheValue::from(r#"{"a":1}"#),
            CacheValue::from("42"),
            CacheValue::Structured(json!(42)),
            CacheValue::Structured(json!(null)),
        ];

        for (i, value) in values.iter().enumerate() {
            let key = format!("k{i}");
            store.set(&key, value, 60).await.unwrap();
            assert_eq!(store.get(&key).await.unwrap().as_ref(), Some(value));
        }
    }

    #[tokio::test]
    async fn test_hincr_counter_reads_back_as_number() {
        let (_, store) = ready_adapter().await;
        store.hincr("rl", "count", 3).await.unwrap();

        let count = store.hget("rl", "count").await.unwrap().unwrap();
        assert_eq!(count.deserialize::<u64>(), Some(3));
    }

    #[tokio::test]
    async fn test_wrong_type_is_command_error_without_reconnect() {
        let (_, store) = ready_adapter().await;
        store.sadd("set", &["a"]).await.unwrap();

        assert!(matches!(store.get("set").await, Err(CacheError::Command(_))));
        assert!(store.is_ready());
    }

    #[tokio::test]
    async fn test_fails_fast_when_not_ready() {
        let connector = MemoryConnector::new();
        let manager = ConnectionManager::new(Arc::new(connector.clone()), BackoffPolicy::default());
        let store = StoreAdapter::new(manager);

        assert!(matches!(
            store.get("k").await,
            Err(CacheError::StoreUnavailable(_))
        ));
        assert_eq!(connector.connect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_drop_reconnects_transparently() {
        let (connector, store) = ready_adapter().await;
        store.set("k", &CacheValue::from("v"), 0).await.unwrap();

        connector.drop_connections();
        assert!(matches!(
            store.get("k").await,
            Err(CacheError::StoreUnavailable(_))
        ));
        assert_eq!(store.manager().state(), ConnectionState::Reconnecting);

        store.manager().wait_settled().await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(CacheValue::from("v")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_beyond_max_attempts_surfaces_exhaustion() {
        let (connector, store) = ready_adapter().await;

        connector.set_offline(true);
        assert!(store.get("k").await.is_err());
        let _ = store.manager().wait_settled().await;

        assert!(matches!(
            store.get("k").await,
            Err(CacheError::ConnectionExhausted { attempts: 3 })
        ));
    }
}
