//! Error types for the cache and rate-limiting layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache layer.
///
/// Decode failures have no variant: the adapter degrades them to raw text.
/// Rate-limit rejections are not errors either, see `RateLimitDecision`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Transient transport failure, retried by the connection manager
    #[error("Connection error: {0}")]
    Connection(String),

    /// Reconnection gave up after the configured number of attempts
    #[error("Connection exhausted after {attempts} attempts")]
    ConnectionExhausted { attempts: u32 },

    /// A single store operation could not be served
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store rejected the command (wrong type, bad argument)
    #[error("Store command failed: {0}")]
    Command(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Returns true for errors caused by the store being unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CacheError::StoreUnavailable(_)
                | CacheError::Connection(_)
                | CacheError::ConnectionExhausted { .. }
        )
    }
}

// == Transport Error ==
/// Failure reported by a backend transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The link to the store is broken (I/O, dropped connection, timeout)
    #[error("transport failure: {0}")]
    Io(String),

    /// The store answered with an error reply
    #[error("command rejected: {0}")]
    Command(String),
}

impl From<redis::RedisError> for TransportError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            TransportError::Io(err.to_string())
        } else {
            TransportError::Command(err.to_string())
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            err if err.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
