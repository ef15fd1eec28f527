//! Rate-Limit Middleware
//!
//! Axum middleware that runs every request through a `RateLimiter` and
//! reports the quota in `X-RateLimit-*` headers.

use axum::extract::{Request, State};
use axum::http::header::{HeaderMap, HeaderName, RETRY_AFTER};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;

use crate::ratelimit::{KeyGenerator, RateLimitDecision, RateLimiter};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// State for the rate-limit middleware.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: RateLimiter,
    key_generator: KeyGenerator,
}

impl RateLimitState {
    pub fn new(limiter: RateLimiter, key_generator: KeyGenerator) -> Self {
        Self {
            limiter,
            key_generator,
        }
    }
}

/// Wraps every route of `router` with a rate limit.
pub fn rate_limit_layer<S>(
    router: Router<S>,
    limiter: RateLimiter,
    key_generator: KeyGenerator,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(
        RateLimitState::new(limiter, key_generator),
        rate_limit_middleware,
    ))
}

/// Rejection for a blocked request.
pub struct RateLimitError {
    pub decision: RateLimitDecision,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let retry_after = self.decision.retry_after_secs().unwrap_or(1);
        let body = json!({
            "error": "Too many requests",
            "retry_after": retry_after,
        });

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        quota_headers(headers, &self.decision);
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}

fn quota_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}

/// Rate limiting middleware.
///
/// Blocked requests get 429 Too Many Requests with a Retry-After header.
/// Admitted responses carry the quota headers.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    let identity = state.key_generator.identity(&request);
    let decision = state.limiter.decide(&identity).await;

    if !decision.admitted {
        return Err(RateLimitError { decision });
    }

    let mut response = next.run(request).await;
    quota_headers(response.headers_mut(), &decision);
    Ok(response)
}
