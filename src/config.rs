//! Configuration Module
//!
//! Handles loading the connection, TTL and rate-limit settings from
//! environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::connection::BackoffPolicy;
use crate::ratelimit::{FailurePolicy, LimiterMode, RateLimitProfile};

/// Which store implementation backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Remote Redis server
    Redis,
    /// In-process store, single instance only
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(BackendKind::Redis),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown cache backend: {other}")),
        }
    }
}

/// Default TTL values in seconds handed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlDefaults {
    pub short: u64,
    pub medium: u64,
    pub long: u64,
    /// Used when a write does not specify a TTL
    pub default: u64,
}

impl Default for TtlDefaults {
    fn default() -> Self {
        Self {
            short: 300,
            medium: 1800,
            long: 86_400,
            default: 3600,
        }
    }
}

/// Named rate-limit profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitProfiles {
    pub global: RateLimitProfile,
    pub per_user: RateLimitProfile,
    pub auth: RateLimitProfile,
    pub upload: RateLimitProfile,
}

impl RateLimitProfiles {
    /// Looks a profile up by its name.
    pub fn by_name(&self, name: &str) -> Option<&RateLimitProfile> {
        [&self.global, &self.per_user, &self.auth, &self.upload]
            .into_iter()
            .find(|p| p.name == name)
    }
}

impl Default for RateLimitProfiles {
    fn default() -> Self {
        Self {
            global: RateLimitProfile::new("global", 100, 15 * 60 * 1000),
            per_user: RateLimitProfile::new("per-user", 1000, 60 * 60 * 1000),
            auth: RateLimitProfile::new("auth", 5, 15 * 60 * 1000)
                .with_failure_policy(FailurePolicy::FailClosed),
            upload: RateLimitProfile::new("upload", 10, 60 * 60 * 1000),
        }
    }
}

/// Configuration consumed by the cache layer.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store implementation
    pub backend: BackendKind,
    /// Redis endpoint URL
    pub redis_url: String,
    /// Optional password, overrides any password embedded in the URL
    pub redis_password: Option<String>,
    /// Upper bound for a single connect attempt
    pub connect_timeout: Duration,
    /// Upper bound for a single command round trip
    pub command_timeout: Duration,
    /// Reconnection policy
    pub backoff: BackoffPolicy,
    /// TTL presets
    pub ttl: TtlDefaults,
    /// Coalesce concurrent misses for the same key
    pub coalesce_misses: bool,
    /// Admission algorithm used by every profile
    pub rate_limit_mode: LimiterMode,
    /// Rate-limit profiles
    pub rate_limits: RateLimitProfiles,
    /// Key clients by `X-Forwarded-For`/`X-Real-IP`; only safe behind a proxy
    pub trust_proxy_headers: bool,
    /// HTTP server port
    pub server_port: u16,
    /// Expired-entry sweep interval in seconds (memory backend)
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `redis` or `memory` (default: redis)
    /// - `REDIS_URL` - endpoint (default: redis://127.0.0.1:6379)
    /// - `REDIS_PASSWORD` - credential (default: unset)
    /// - `CONNECT_TIMEOUT_MS` / `COMMAND_TIMEOUT_MS` (default: 5000 / 2000)
    /// - `RETRY_BASE_DELAY_MS` / `RETRY_MAX_DELAY_MS` (default: 100 / 3000)
    /// - `RETRY_MAX_ATTEMPTS` (default: 10), `RETRY_JITTER` (default: false)
    /// - `CACHE_TTL_SHORT` / `_MEDIUM` / `_LONG` / `_DEFAULT`
    /// - `CACHE_COALESCE` (default: false)
    /// - `RATE_LIMIT_MODE` - `lenient` or `strict` (default: lenient)
    /// - `RATE_LIMIT_<PROFILE>_MAX` / `RATE_LIMIT_<PROFILE>_WINDOW_MS`
    /// - `TRUST_PROXY_HEADERS` (default: false)
    /// - `SERVER_PORT` (default: 3000), `CLEANUP_INTERVAL` (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let backoff = BackoffPolicy {
            base_delay: Duration::from_millis(env_or(
                "RETRY_BASE_DELAY_MS",
                defaults.backoff.base_delay.as_millis() as u64,
            )),
            cap_delay: Duration::from_millis(env_or(
                "RETRY_MAX_DELAY_MS",
                defaults.backoff.cap_delay.as_millis() as u64,
            )),
            max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.backoff.max_attempts),
            jitter: env_or("RETRY_JITTER", defaults.backoff.jitter),
        };

        let ttl = TtlDefaults {
            short: env_or("CACHE_TTL_SHORT", defaults.ttl.short),
            medium: env_or("CACHE_TTL_MEDIUM", defaults.ttl.medium),
            long: env_or("CACHE_TTL_LONG", defaults.ttl.long),
            default: env_or("CACHE_TTL_DEFAULT", defaults.ttl.default),
        };

        let profiles = defaults.rate_limits;
        let rate_limits = RateLimitProfiles {
            global: profile_from_env("GLOBAL", profiles.global),
            per_user: profile_from_env("PER_USER", profiles.per_user),
            auth: profile_from_env("AUTH", profiles.auth),
            upload: profile_from_env("UPLOAD", profiles.upload),
        };

        Self {
            backend: env_or("CACHE_BACKEND", defaults.backend),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            redis_password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            connect_timeout: Duration::from_millis(env_or("CONNECT_TIMEOUT_MS", 5000)),
            command_timeout: Duration::from_millis(env_or("COMMAND_TIMEOUT_MS", 2000)),
            backoff,
            ttl,
            coalesce_misses: env_or("CACHE_COALESCE", defaults.coalesce_misses),
            rate_limit_mode: env_or("RATE_LIMIT_MODE", defaults.rate_limit_mode),
            rate_limits,
            trust_proxy_headers: env_or("TRUST_PROXY_HEADERS", defaults.trust_proxy_headers),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_password: None,
            connect_timeout: Duration::from_millis(5000),
            command_timeout: Duration::from_millis(2000),
            backoff: BackoffPolicy::default(),
            ttl: TtlDefaults::default(),
            coalesce_misses: false,
            rate_limit_mode: LimiterMode::Lenient,
            rate_limits: RateLimitProfiles::default(),
            trust_proxy_headers: false,
            server_port: 3000,
            cleanup_interval: 1,
        }
    }
}

/// Parses an environment variable, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profile_from_env(prefix: &str, profile: RateLimitProfile) -> RateLimitProfile {
    RateLimitProfile {
        max_requests: env_or(&format!("RATE_LIMIT_{prefix}_MAX"), profile.max_requests),
        window_ms: env_or(&format!("RATE_LIMIT_{prefix}_WINDOW_MS"), profile.window_ms),
        ..profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.backend, BackendKind::Redis);
        assert_eq!(config.ttl.default, 3600);
        assert_eq!(config.backoff.max_attempts, 10);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.rate_limit_mode, LimiterMode::Lenient);
        assert!(!config.coalesce_misses);
        assert!(!config.trust_proxy_headers);
    }

    #[test]
    fn test_default_profiles() {
        let profiles = RateLimitProfiles::default();
        assert_eq!(profiles.global.max_requests, 100);
        assert_eq!(profiles.auth.max_requests, 5);
        assert_eq!(profiles.auth.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(profiles.upload.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(profiles.by_name("per-user"), Some(&profiles.per_user));
        assert!(profiles.by_name("missing").is_none());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("memory".parse::<BackendKind>(), Ok(BackendKind::Memory));
        assert_eq!("REDIS".parse::<BackendKind>(), Ok(BackendKind::Redis));
        assert!("etcd".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_config_from_env_overrides() {
        env::set_var("RATE_LIMIT_UPLOAD_MAX", "3");
        env::set_var("RETRY_MAX_ATTEMPTS", "not-a-number");

        let config = Config::from_env();
        assert_eq!(config.rate_limits.upload.max_requests, 3);
        assert_eq!(config.rate_limits.upload.window_ms, 60 * 60 * 1000);
        // invalid values fall back to defaults
        assert_eq!(config.backoff.max_attempts, 10);

        env::remove_var("RATE_LIMIT_UPLOAD_MAX");
        env::remove_var("RETRY_MAX_ATTEMPTS");
    }
}
