//! Rate Limiter
//!
//! Per-identity request counters stored as `ratelimit:{profile}:{identity}`
//! hashes. Every admitted request re-arms the counter's expiry, so a window
//! slides with the most recent admitted request instead of following the
//! calendar.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::Result;
use crate::ratelimit::{FailurePolicy, LimiterMode, RateLimitProfile};
use crate::store::StoreAdapter;

const COUNT_FIELD: &str = "count";

// == Decision ==
/// Outcome of one admission check. A block is a normal value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub admitted: bool,
    pub limit: u64,
    pub remaining: u64,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
    /// Set on blocked decisions
    pub retry_after: Option<Duration>,
    /// The store could not be reached and the failure policy decided
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Whole seconds until the window ends, at least 1.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|wait| (wait.as_millis().div_ceil(1000) as u64).max(1))
    }
}

fn after(wait: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|wait| Utc::now().checked_add_signed(wait))
        .unwrap_or_else(Utc::now)
}

// == Rate Limiter ==
#[derive(Clone)]
pub struct RateLimiter {
    store: StoreAdapter,
    profile: RateLimitProfile,
    mode: LimiterMode,
}

impl RateLimiter {
    pub fn new(store: StoreAdapter, profile: RateLimitProfile) -> Self {
        Self {
            store,
            profile,
            mode: LimiterMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: LimiterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn profile(&self) -> &RateLimitProfile {
        &self.profile
    }

    pub fn mode(&self) -> LimiterMode {
        self.mode
    }

    fn counter_key(&self, identity: &str) -> String {
        format!("ratelimit:{}:{}", self.profile.name, identity)
    }

    // == Counter Operations ==
    /// True when the identity has used up its window.
    pub async fn should_block(&self, identity: &str) -> Result<bool> {
        Ok(self.count(identity).await? >= self.profile.max_requests)
    }

    /// Current count, 0 for an unknown identity.
    pub async fn count(&self, identity: &str) -> Result<u64> {
        let stored = self
            .store
            .hget(&self.counter_key(identity), COUNT_FIELD)
            .await?;
        Ok(stored
            .and_then(|value| value.deserialize::<u64>())
            .unwrap_or(0))
    }

    /// Adds one request and re-arms the window.
    ///
    /// # Returns
    /// The count after the increment.
    pub async fn increment(&self, identity: &str) -> Result<u64> {
        let key = self.counter_key(identity);
        let count = self.store.hincr(&key, COUNT_FIELD, 1).await?;
        self.store.pexpire(&key, self.profile.window_ms).await?;
        Ok(count.max(0) as u64)
    }

    // == Admission ==
    /// Decides one request, surfacing store failures.
    pub async fn check(&self, identity: &str) -> Result<RateLimitDecision> {
        let limit = self.profile.max_requests;

        let count = match self.mode {
            LimiterMode::Lenient => {
                if self.should_block(identity).await? {
                    return self.blocked(identity).await;
                }
                self.increment(identity).await?
            }
            LimiterMode::Strict => {
                if limit == 0 {
                    return self.blocked(identity).await;
                }
                let key = self.counter_key(identity);
                let count = self.store.hincr(&key, COUNT_FIELD, 1).await?;
                if count.max(0) as u64 > limit {
                    // the window keeps its expiry: only admitted requests re-arm it
                    self.store.hincr(&key, COUNT_FIELD, -1).await?;
                    return self.blocked(identity).await;
                }
                self.store.pexpire(&key, self.profile.window_ms).await?;
                count.max(0) as u64
            }
        };

        Ok(RateLimitDecision {
            admitted: true,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at: after(self.profile.window()),
            retry_after: None,
            degraded: false,
        })
    }

    async fn blocked(&self, identity: &str) -> Result<RateLimitDecision> {
        let wait = self
            .store
            .pttl(&self.counter_key(identity))
            .await?
            .unwrap_or_else(|| self.profile.window());

        debug!(
            profile = %self.profile.name,
            identity,
            retry_after_ms = wait.as_millis() as u64,
            "Request blocked"
        );
        Ok(RateLimitDecision {
            admitted: false,
            limit: self.profile.max_requests,
            remaining: 0,
            reset_at: after(wait),
            retry_after: Some(wait),
            degraded: false,
        })
    }

    /// Decides one request, applying the failure policy on store errors.
    pub async fn decide(&self, identity: &str) -> RateLimitDecision {
        match self.check(identity).await {
            Ok(decision) => decision,
            Err(err) => self.degraded(identity, &err.to_string()),
        }
    }

    fn degraded(&self, identity: &str, reason: &str) -> RateLimitDecision {
        let limit = self.profile.max_requests;
        let window = self.profile.window();

        match self.profile.failure_policy {
            FailurePolicy::FailOpen => {
                warn!(
                    profile = %self.profile.name,
                    identity,
                    error = reason,
                    "Rate limit store unavailable, admitting request"
                );
                RateLimitDecision {
                    admitted: true,
                    limit,
                    remaining: limit,
                    reset_at: after(window),
                    retry_after: None,
                    degraded: true,
                }
            }
            FailurePolicy::FailClosed => {
                warn!(
                    profile = %self.profile.name,
                    identity,
                    error = reason,
                    "Rate limit store unavailable, rejecting request"
                );
                RateLimitDecision {
                    admitted: false,
                    limit,
                    remaining: 0,
                    reset_at: after(window),
                    retry_after: Some(window),
                    degraded: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{BackoffPolicy, ConnectionManager, MemoryConnector};
    use std::sync::Arc;

    async fn ready_store() -> (MemoryConnector, StoreAdapter) {
        let connector = MemoryConnector::new();
        let policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(50), 3);
        let manager = ConnectionManager::new(Arc::new(connector.clone()), policy);
        manager.connect().await.unwrap();
        (connector, StoreAdapter::new(manager))
    }

    fn per_minute(max: u64) -> RateLimitProfile {
        RateLimitProfile::new("test", max, 60_000)
    }

    async fn admitted_concurrently(limiter: &RateLimiter, requests: usize) -> usize {
        let handles: Vec<_> = (0..requests)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check("burst").await.unwrap() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().admitted {
                admitted += 1;
            }
        }
        admitted
    }

    #[tokio::test]
    async fn test_sixth_request_blocked_with_retry_after() {
        let (_, store) = ready_store().await;
        let limiter = RateLimiter::new(store, per_minute(5));

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("10.0.0.1").await.unwrap();
            assert!(decision.admitted);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let sixth = limiter.check("10.0.0.1").await.unwrap();
        assert!(!sixth.admitted);
        assert!(!sixth.degraded);
        assert_eq!(sixth.remaining, 0);
        let wait = sixth.retry_after.unwrap();
        assert!(wait > Duration::from_secs(59) && wait <= Duration::from_secs(60));
        assert_eq!(sixth.retry_after_secs(), Some(60));
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let (_, store) = ready_store().await;
        let limiter = RateLimiter::new(store, per_minute(1));

        assert!(limiter.check("a").await.unwrap().admitted);
        assert!(!limiter.check("a").await.unwrap().admitted);
        assert!(limiter.check("b").await.unwrap().admitted);
    }

    #[tokio::test]
    async fn test_blocked_requests_do_not_count() {
        let (_, store) = ready_store().await;
        let limiter = RateLimiter::new(store, per_minute(2));

        for _ in 0..5 {
            limiter.check("a").await.unwrap();
        }
        assert_eq!(limiter.count("a").await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_with_each_increment() {
        let (_, store) = ready_store().await;
        let limiter = RateLimiter::new(store, per_minute(10));

        limiter.increment("a").await.unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;
        limiter.increment("a").await.unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;

        // a fixed window would have reset 20 s ago
        assert_eq!(limiter.count("a").await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(limiter.count("a").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_readmits() {
        let (_, store) = ready_store().await;
        let limiter = RateLimiter::new(store, per_minute(1));

        assert!(limiter.check("a").await.unwrap().admitted);
        assert!(!limiter.check("a").await.unwrap().admitted);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check("a").await.unwrap().admitted);
    }

    #[tokio::test]
    async fn test_lenient_mode_overshoots_under_concurrency() {
        let (_, store) = ready_store().await;
        let limiter = RateLimiter::new(store, per_minute(3));

        let admitted = admitted_concurrently(&limiter, 10).await;

        assert!(admitted > 3, "check-then-act admitted only {admitted}");
    }

    #[tokio::test]
    async fn test_strict_mode_is_exact_under_concurrency() {
        let (_, store) = ready_store().await;
        let limiter = RateLimiter::new(store, per_minute(3)).with_mode(LimiterMode::Strict);

        let admitted = admitted_concurrently(&limiter, 10).await;

        assert_eq!(admitted, 3);
        assert_eq!(limiter.count("burst").await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_rollback_keeps_window() {
        let (_, store) = ready_store().await;
        let limiter = RateLimiter::new(store, per_minute(1)).with_mode(LimiterMode::Strict);

        assert!(limiter.check("a").await.unwrap().admitted);
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(!limiter.check("a").await.unwrap().admitted);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check("a").await.unwrap().admitted);
    }

    #[tokio::test]
    async fn test_fail_open_admits_degraded() {
        let (connector, store) = ready_store().await;
        let limiter = RateLimiter::new(store, per_minute(5));
        connector.set_offline(true);

        assert!(limiter.check("a").await.is_err());
        let decision = limiter.decide("a").await;
        assert!(decision.admitted);
        assert!(decision.degraded);
    }

    #[tokio::test]
    async fn test_fail_closed_blocks_degraded() {
        let (connector, store) = ready_store().await;
        let profile = per_minute(5).with_failure_policy(FailurePolicy::FailClosed);
        let limiter = RateLimiter::new(store, profile);
        connector.set_offline(true);

        let decision = limiter.decide("a").await;
        assert!(!decision.admitted);
        assert!(decision.degraded);
        assert_eq!(decision.retry_after, Some(Duration::from_secs(60)));
    }
}
