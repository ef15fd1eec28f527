//! cache_gate - Redis-backed cache-aside layer with admission control
//!
//! Manages one shared store connection with bounded reconnection, exposes
//! typed store operations, tag-based invalidation, a cache-aside helper and
//! a sliding-window rate limiter usable as axum middleware.

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod store;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::{BackendKind, Config};
pub use connection::{ConnectionManager, ConnectionState, MemoryConnector, RedisConnector};
pub use error::{CacheError, Result};
pub use ratelimit::{rate_limit_layer, KeyGenerator, RateLimitDecision, RateLimiter};
pub use store::{CacheAside, CacheValue, StoreAdapter, TagIndex};
pub use tasks::{spawn_cleanup_task, spawn_connection_monitor};
