//! API Routes
//!
//! Configures the Axum router with the admin endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, get_handler, health_handler, invalidate_pattern_handler,
    invalidate_tag_handler, set_handler, stats_handler, AppState,
};
use crate::ratelimit::rate_limit_layer;

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Readiness and connection details
/// - `GET /stats` - Cache statistics
/// - `PUT /cache` - Store a value
/// - `GET /cache/:key` - Retrieve a value
/// - `DELETE /cache/:key` - Delete a key
/// - `DELETE /cache/tags/:tag` - Invalidate a tag
/// - `POST /cache/invalidate` - Invalidate keys matching a glob
///
/// # Middleware
/// - Rate limit: the state's limiter, keyed by the state's key generator
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/cache", put(set_handler))
        .route("/cache/invalidate", post(invalidate_pattern_handler))
        .route("/cache/tags/:tag", delete(invalidate_tag_handler))
        .route("/cache/:key", get(get_handler).delete(delete_handler));

    rate_limit_layer(routes, state.limiter.clone(), state.key_generator.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connection::{BackoffPolicy, ConnectionManager, MemoryConnector};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    async fn create_test_app() -> Router {
        let manager = ConnectionManager::new(
            Arc::new(MemoryConnector::new()),
            BackoffPolicy::default(),
        );
        manager.connect().await.unwrap();
        create_router(AppState::new(manager, &Config::default()))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_set_endpoint() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/cache")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"key":"test","value":"hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/cache/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_routes_win_over_key_parameter() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cache/invalidate")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"pattern":"user:*"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
