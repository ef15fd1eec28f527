//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::connection::ConnectionInfo;
use crate::store::CacheStats;

/// Response body for `GET /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for `PUT /cache`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
    /// TTL applied, in seconds
    pub ttl: u64,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, ttl: u64) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            ttl,
        }
    }
}

/// Response body for `DELETE /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for tag and pattern invalidation
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Tag or pattern that was invalidated
    pub target: String,
    /// Number of keys removed
    pub removed: u64,
}

impl InvalidateResponse {
    pub fn new(target: impl Into<String>, removed: u64) -> Self {
        Self {
            target: target.into(),
            removed,
        }
    }
}

/// Response body for `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub cache: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Connection state, e.g. `ready`
    pub connection: String,
}

impl StatsResponse {
    pub fn new(cache: CacheStats, connection: impl Into<String>) -> Self {
        Self {
            hit_rate: cache.hit_rate(),
            cache,
            connection: connection.into(),
        }
    }
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy` when the store connection is ready, `degraded` otherwise
    pub status: String,
    pub connection: ConnectionInfo,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn from_connection(connection: ConnectionInfo, ready: bool) -> Self {
        Self {
            status: if ready { "healthy" } else { "degraded" }.to_string(),
            connection,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
