//! API Handlers
//!
//! HTTP request handlers for the admin endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, DeleteResponse, GetResponse, HealthResponse, InvalidateRequest,
    InvalidateResponse, SetRequest, SetResponse, StatsResponse,
};
use crate::ratelimit::{KeyGenerator, RateLimiter};
use crate::store::{CacheAside, CacheValue, StoreAdapter};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheAside,
    pub manager: Arc<ConnectionManager>,
    /// Limiter applied to every route
    pub limiter: RateLimiter,
    /// Identity the limiter counts requests under
    pub key_generator: KeyGenerator,
}

impl AppState {
    /// Builds the cache and the global limiter over one managed connection.
    pub fn new(manager: Arc<ConnectionManager>, config: &Config) -> Self {
        let store = StoreAdapter::new(Arc::clone(&manager));
        let cache = CacheAside::new(store.clone(), config.ttl.default)
            .with_coalescing(config.coalesce_misses);
        let limiter = RateLimiter::new(store, config.rate_limits.global.clone())
            .with_mode(config.rate_limit_mode);

        Self {
            cache,
            manager,
            limiter,
            key_generator: KeyGenerator::client_ip(config.trust_proxy_headers),
        }
    }
}

/// Handler for PUT /cache
///
/// Stores a value with optional TTL and tags.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let value = CacheValue::from(req.value);
    let ttl = req.ttl.unwrap_or(state.cache.default_ttl());

    if req.tags.is_empty() {
        state.cache.set(&req.key, &value, Some(ttl)).await?;
    } else {
        let tags: Vec<&str> = req.tags.iter().map(String::as_str).collect();
        state
            .cache
            .set_with_tags(&req.key, &value, &tags, Some(ttl))
            .await?;
    }

    Ok(Json(SetResponse::new(req.key, ttl)))
}

/// Handler for GET /cache/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    if let Some(error_msg) = validate_key(&key) {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    match state.cache.get(&key).await? {
        Some(value) => Ok(Json(GetResponse::new(key, value.to_json()))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if let Some(error_msg) = validate_key(&key) {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    if state.cache.del(&key).await? {
        Ok(Json(DeleteResponse::new(key)))
    } else {
        Err(CacheError::NotFound(key))
    }
}

/// Handler for DELETE /cache/tags/:tag
pub async fn invalidate_tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let removed = state.cache.invalidate_by_tag(&tag).await?;
    Ok(Json(InvalidateResponse::new(tag, removed)))
}

/// Handler for POST /cache/invalidate
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let removed = state.cache.invalidate_pattern(&req.pattern).await?;
    Ok(Json(InvalidateResponse::new(req.pattern, removed)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.stats(),
        state.manager.state().as_str(),
    ))
}

/// Handler for GET /health
///
/// Answers 503 while the store connection is not ready.
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let ready = state.manager.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse::from_connection(
            state.manager.connection_info(),
            ready,
        )),
    )
}
