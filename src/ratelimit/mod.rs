//! Rate Limiting Module
//!
//! Per-identity admission control backed by the shared store.

mod limiter;
mod middleware;
mod profile;

pub use limiter::{RateLimitDecision, RateLimiter};
pub use middleware::{
    rate_limit_layer, rate_limit_middleware, RateLimitError, RateLimitState, X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use profile::{FailurePolicy, KeyGenerator, LimiterMode, RateLimitProfile};
