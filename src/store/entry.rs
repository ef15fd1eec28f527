//! Cache Entry Module
//!
//! Defines the structure of entries held by the in-memory backend, with
//! TTL support on the tokio clock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

// == Stored Data ==
/// Redis-like value kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredData {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

impl StoredData {
    /// Aggregates whose last element was removed disappear, as in Redis.
    pub fn is_empty_aggregate(&self) -> bool {
        match self {
            StoredData::Str(_) => false,
            StoredData::Hash(h) => h.is_empty(),
            StoredData::List(l) => l.is_empty(),
            StoredData::Set(s) => s.is_empty(),
        }
    }
}

// == Cache Entry ==
/// Represents a single entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub data: StoredData,
    /// Creation instant
    pub created_at: Instant,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry with optional TTL.
    ///
    /// A TTL past the clock's range leaves the entry without expiry; the
    /// store rejects such TTLs before building entries.
    ///
    /// # Arguments
    /// * `data` - The value to store
    /// * `ttl` - Optional time to live
    pub fn new(data: StoredData, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            data,
            created_at: now,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches the expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the TTL elapsed
    /// - `Some(remaining)` if the entry has a TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }

    /// Re-arms or clears the expiry, measured from now.
    pub fn set_ttl(&mut self, ttl: Option<Duration>) {
        self.expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> StoredData {
        StoredData::Str(value.to_string())
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new(text("test_value"), None);

        assert_eq!(entry.data, text("test_value"));
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiration() {
        let entry = CacheEntry::new(text("test_value"), Some(Duration::from_secs(1)));
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining() {
        let entry = CacheEntry::new(text("test_value"), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(entry.ttl_remaining(), Some(Duration::from_secs(6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ttl_rearms_from_now() {
        let mut entry = CacheEntry::new(text("v"), Some(Duration::from_secs(2)));

        tokio::time::advance(Duration::from_secs(1)).await;
        entry.set_ttl(Some(Duration::from_secs(5)));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!entry.is_expired());

        entry.set_ttl(None);
        assert!(entry.ttl_remaining().is_none());
    }

    #[test]
    fn test_unrepresentable_ttl_does_not_panic() {
        let mut entry = CacheEntry::new(text("v"), Some(Duration::from_secs(u64::MAX)));
        assert!(!entry.is_expired());

        entry.set_ttl(Some(Duration::MAX));
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Instant::now();
        let entry = CacheEntry {
            data: text("test"),
            created_at: now,
            expires_at: Some(now),
        };

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
    }

    #[test]
    fn test_empty_aggregates() {
        assert!(StoredData::Set(HashSet::new()).is_empty_aggregate());
        assert!(StoredData::List(VecDeque::new()).is_empty_aggregate());
        assert!(!StoredData::Str(String::new()).is_empty_aggregate());
    }
}
