//! Reconnection Backoff
//!
//! Linear, capped delay between connection attempts.

use std::time::Duration;

use rand::Rng;

// == Backoff Policy ==
/// Delay schedule for (re)connection attempts.
///
/// `delay(attempt) = min(attempt * base_delay, cap_delay)`. With `jitter`
/// enabled up to half of that delay is added at random so that instances
/// sharing one store do not retry in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay added per failed attempt
    pub base_delay: Duration,
    /// Upper bound for a single delay (before jitter)
    pub cap_delay: Duration,
    /// Consecutive failures after which the manager gives up
    pub max_attempts: u32,
    /// Randomize delays
    pub jitter: bool,
}

impl BackoffPolicy {
    /// Creates a policy without jitter.
    pub fn new(base_delay: Duration, cap_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            cap_delay,
            max_attempts,
            jitter: false,
        }
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after the `attempt`-th consecutive failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let linear = self.base_delay.saturating_mul(attempt);
        let capped = linear.min(self.cap_delay);
        if !self.jitter || capped.is_zero() {
            return capped;
        }
        let extra_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
        capped + Duration::from_millis(extra_ms)
    }

    /// Returns true once `attempts` failures exhaust the policy.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(3000), 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_linear_until_cap() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(350), 10);

        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(300));
        assert_eq!(policy.delay(4), Duration::from_millis(350));
        assert_eq!(policy.delay(40), Duration::from_millis(350));
    }

    #[test]
    fn test_exhaustion_threshold() {
        let policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(50), 3);

        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn test_jitter_stays_within_half_of_delay() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(1000), 10)
            .with_jitter(true);

        for attempt in 1..20 {
            let base = Duration::from_millis((attempt as u64 * 100).min(1000));
            let delay = policy.delay(attempt);
            assert!(delay >= base);
            assert!(delay <= base + base / 2);
        }
    }

    #[test]
    fn test_zero_base_delay_never_sleeps() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::ZERO, 2).with_jitter(true);
        assert_eq!(policy.delay(5), Duration::ZERO);
    }
}
