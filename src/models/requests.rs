//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

const MAX_KEY_LENGTH: usize = 512;
/// Ten years.
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Request body for `PUT /cache`
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value; objects and arrays are stored as structured data
/// - `ttl`: Optional TTL in seconds (uses the default TTL if not specified)
/// - `tags`: Tags to record the key under
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(message) = validate_key(&self.key) {
            return Some(message);
        }
        if self.ttl.is_some_and(|ttl| ttl > MAX_TTL_SECONDS) {
            return Some(format!("TTL exceeds maximum of {MAX_TTL_SECONDS} seconds"));
        }
        if self.tags.iter().any(|tag| tag.is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        None
    }
}

/// Request body for `POST /cache/invalidate`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Glob pattern, e.g. `user:*`
    pub pattern: String,
}

impl InvalidateRequest {
    pub fn validate(&self) -> Option<String> {
        if self.pattern.is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        None
    }
}

/// Checks a key taken from a body or a path.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {MAX_KEY_LENGTH} characters"
        ));
    }
    None
}
