//! Redis Transport
//!
//! Production transport over a multiplexed async Redis connection.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, IntoConnectionInfo, RedisResult};
use tracing::debug;

use crate::connection::transport::{Connector, ListEnd, Transport, TransportResult};
use crate::error::{CacheError, TransportError};

/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 200;

// == Redis Connector ==
/// Opens multiplexed connections to one Redis endpoint.
pub struct RedisConnector {
    client: redis::Client,
    endpoint: String,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl RedisConnector {
    /// Creates a connector for `url`.
    ///
    /// # Arguments
    /// * `url` - `redis://host:port/db` style endpoint
    /// * `password` - Optional credential, overrides one embedded in the URL
    /// * `connect_timeout` - Bound for one connection attempt
    /// * `command_timeout` - Bound for one command round trip
    pub fn new(
        url: &str,
        password: Option<&str>,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let mut info = url
            .into_connection_info()
            .map_err(|e| CacheError::InvalidRequest(format!("invalid redis url: {e}")))?;
        if let Some(password) = password {
            info.redis.password = Some(password.to_string());
        }
        let endpoint = info.addr.to_string();
        let client = redis::Client::open(info)
            .map_err(|e| CacheError::InvalidRequest(format!("invalid redis url: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            connect_timeout,
            command_timeout,
        })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self) -> TransportResult<Arc<dyn Transport>> {
        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| TransportError::Io(format!("connect timed out after {:?}", self.connect_timeout)))??;

        let transport = RedisTransport {
            conn,
            command_timeout: self.command_timeout,
        };
        transport.ping().await?;
        debug!(endpoint = %self.endpoint, "redis connection established");

        Ok(Arc::new(transport))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

// == Redis Transport ==
/// One multiplexed session. Cloning the inner connection is cheap and
/// shares the same socket.
pub struct RedisTransport {
    conn: MultiplexedConnection,
    command_timeout: Duration,
}

impl RedisTransport {
    /// Runs one command future under the command timeout.
    async fn run<T, F>(&self, fut: F) -> TransportResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::Io(format!(
                "command timed out after {:?}",
                self.command_timeout
            ))),
        }
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn ping(&self) -> TransportResult<()> {
        let mut conn = self.conn.clone();
        let _pong: String = self
            .run(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> TransportResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> TransportResult<()> {
        let mut conn = self.conn.clone();
        if ttl_seconds == 0 {
            self.run(async move { conn.set(key, value).await }).await
        } else {
            self.run(async move { conn.set_ex(key, value, ttl_seconds).await })
                .await
        }
    }

    async fn del(&self, keys: &[String]) -> TransportResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let keys = keys.to_vec();
        self.run(async move { conn.del(keys).await }).await
    }

    async fn exists(&self, key: &str) -> TransportResult<bool> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.exists(key).await }).await
    }

    async fn ttl(&self, key: &str) -> TransportResult<i64> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.ttl(key).await }).await
    }

    async fn pttl(&self, key: &str) -> TransportResult<i64> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.pttl(key).await }).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> TransportResult<bool> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.expire(key, seconds as i64).await })
            .await
    }

    async fn pexpire(&self, key: &str, millis: u64) -> TransportResult<bool> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.pexpire(key, millis as i64).await })
            .await
    }

    async fn persist(&self, key: &str) -> TransportResult<bool> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.persist(key).await }).await
    }

    async fn scan(&self, pattern: &str) -> TransportResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = self
                .run(async {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await
                })
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> TransportResult<()> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.hset(key, field, value).await })
            .await
    }

    async fn hget(&self, key: &str, field: &str) -> TransportResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.hget(key, field).await }).await
    }

    async fn hgetall(&self, key: &str) -> TransportResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.hgetall(key).await }).await
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> TransportResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let fields = fields.to_vec();
        self.run(async move { conn.hdel(key, fields).await }).await
    }

    async fn hincr(&self, key: &str, field: &str, delta: i64) -> TransportResult<i64> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.hincr(key, field, delta).await })
            .await
    }

    async fn push(&self, key: &str, end: ListEnd, values: Vec<String>) -> TransportResult<u64> {
        let mut conn = self.conn.clone();
        match end {
            ListEnd::Left => self.run(async move { conn.lpush(key, values).await }).await,
            ListEnd::Right => self.run(async move { conn.rpush(key, values).await }).await,
        }
    }

    async fn pop(&self, key: &str, end: ListEnd) -> TransportResult<Option<String>> {
        let mut conn = self.conn.clone();
        let count: Option<NonZeroUsize> = None;
        match end {
            ListEnd::Left => self.run(async move { conn.lpop(key, count).await }).await,
            ListEnd::Right => self.run(async move { conn.rpop(key, count).await }).await,
        }
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> TransportResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.lrange(key, start as isize, stop as isize).await })
            .await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> TransportResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let members = members.to_vec();
        self.run(async move { conn.sadd(key, members).await }).await
    }

    async fn smembers(&self, key: &str) -> TransportResult<HashSet<String>> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.smembers(key).await }).await
    }

    async fn srem(&self, key: &str, members: &[String]) -> TransportResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let members = members.to_vec();
        self.run(async move { conn.srem(key, members).await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_parses_endpoint() {
        let connector = RedisConnector::new(
            "redis://cache.internal:6380/2",
            Some("secret"),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(connector.endpoint(), "cache.internal:6380");
        assert!(!connector.endpoint().contains("secret"));
    }

    #[test]
    fn test_connector_rejects_bad_url() {
        let result = RedisConnector::new(
            "not a url",
            None,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails_as_transport_error() {
        let connector = RedisConnector::new(
            "redis://127.0.0.1:1",
            None,
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
        .unwrap();

        let result = connector.connect().await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
