//! Rate-Limit Profiles
//!
//! Limits, failure policy and identity derivation for one class of traffic.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request};

/// What to do when the store cannot be reached during a check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Admit the request and flag the decision as degraded
    #[default]
    FailOpen,
    /// Reject the request and flag the decision as degraded
    FailClosed,
}

/// Admission algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LimiterMode {
    /// Read the counter, then increment it in a second round trip.
    /// Concurrent requests can overshoot the limit.
    #[default]
    Lenient,
    /// One increment decides; over-limit increments are rolled back.
    Strict,
}

impl FromStr for LimiterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(LimiterMode::Lenient),
            "strict" => Ok(LimiterMode::Strict),
            other => Err(format!("unknown rate limit mode: {other}")),
        }
    }
}

// == Profile ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitProfile {
    /// Namespace of the counters, e.g. `auth`
    pub name: String,
    /// Requests admitted per window
    pub max_requests: u64,
    /// Window length, re-armed on every admitted request
    pub window_ms: u64,
    pub failure_policy: FailurePolicy,
}

impl RateLimitProfile {
    pub fn new(name: impl Into<String>, max_requests: u64, window_ms: u64) -> Self {
        Self {
            name: name.into(),
            max_requests,
            window_ms,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

// == Key Generator ==
type KeyFn = dyn Fn(&Request) -> Option<String> + Send + Sync;

/// Derives the counter identity from a request.
///
/// Every variant falls back to the peer address, and to `unknown` when no
/// address is available.
#[derive(Clone)]
pub enum KeyGenerator {
    /// Peer address. With `trust_proxy`, the first `x-forwarded-for` hop
    /// or `x-real-ip` wins over it; clients can forge those headers, so
    /// only set it when a proxy in front rewrites them.
    ClientIp { trust_proxy: bool },
    /// Value of the named header, e.g. an API key or user id
    Header(String),
    /// Caller-supplied derivation
    Custom(Arc<KeyFn>),
}

impl Default for KeyGenerator {
    fn default() -> Self {
        KeyGenerator::ClientIp { trust_proxy: false }
    }
}

impl KeyGenerator {
    pub fn client_ip(trust_proxy: bool) -> Self {
        KeyGenerator::ClientIp { trust_proxy }
    }

    pub fn header(name: impl Into<String>) -> Self {
        KeyGenerator::Header(name.into())
    }

    pub fn custom<F>(derive: F) -> Self
    where
        F: Fn(&Request) -> Option<String> + Send + Sync + 'static,
    {
        KeyGenerator::Custom(Arc::new(derive))
    }

    pub fn identity(&self, request: &Request) -> String {
        let derived = match self {
            KeyGenerator::ClientIp { trust_proxy: true } => forwarded_ip(request),
            KeyGenerator::ClientIp { trust_proxy: false } => None,
            KeyGenerator::Header(name) => request
                .headers()
                .get(name.as_str())
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            KeyGenerator::Custom(derive) => derive(request),
        };

        derived.unwrap_or_else(|| match peer_ip(request) {
            Some(ip) => ip.to_string(),
            None => "unknown".to_string(),
        })
    }
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyGenerator::ClientIp { trust_proxy } => f
                .debug_struct("ClientIp")
                .field("trust_proxy", trust_proxy)
                .finish(),
            KeyGenerator::Header(name) => f.debug_tuple("Header").field(name).finish(),
            KeyGenerator::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Client address as reported by a proxy in front.
fn forwarded_ip(request: &Request) -> Option<String> {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    };

    // X-Forwarded-For can list several hops, the first is the client
    header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .or_else(|| header("x-real-ip").and_then(|real| real.trim().parse().ok()))
        .map(|ip| ip.to_string())
}

fn peer_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
