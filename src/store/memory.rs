//! Memory Store Module
//!
//! In-process key-value engine with Redis-like value kinds and lazy TTL
//! expiration. Backs the memory transport.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use crate::connection::ListEnd;
use crate::error::TransportError;
use crate::store::entry::{CacheEntry, StoredData};

type StoreResult<T> = std::result::Result<T, TransportError>;

/// Rejects expiries the clock cannot represent, as Redis does.
fn check_expiry(ttl: Duration, command: &str) -> StoreResult<()> {
    match Instant::now().checked_add(ttl) {
        Some(_) => Ok(()),
        None => Err(TransportError::Command(format!(
            "invalid expire time in '{command}' command"
        ))),
    }
}

fn wrong_type(key: &str) -> TransportError {
    TransportError::Command(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

// == Memory Store ==
/// Key-value storage with TTL support.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, CacheEntry>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live entry for `key`, dropping it first if expired.
    fn live(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired()) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    /// Removes `key` if its aggregate became empty.
    fn drop_if_empty(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|e| e.data.is_empty_aggregate())
        {
            self.entries.remove(key);
        }
    }

    /// Fetches or creates an aggregate entry, keeping the existing expiry.
    fn aggregate_mut(
        &mut self,
        key: &str,
        create: fn() -> StoredData,
    ) -> &mut CacheEntry {
        if self.entries.get(key).is_some_and(|e| e.is_expired()) {
            self.entries.remove(key);
        }
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(create(), None))
    }

    // == Strings ==
    /// Retrieves a string value by key.
    pub fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        match self.live(key).map(|e| &e.data) {
            None => Ok(None),
            Some(StoredData::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// Stores a string value, replacing any previous value and TTL.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl_seconds` - TTL in seconds, 0 = no expiry
    pub fn set(&mut self, key: &str, value: String, ttl_seconds: u64) -> StoreResult<()> {
        let ttl = (ttl_seconds > 0).then(|| Duration::from_secs(ttl_seconds));
        if let Some(ttl) = ttl {
            check_expiry(ttl, "set")?;
        }
        self.entries
            .insert(key.to_string(), CacheEntry::new(StoredData::Str(value), ttl));
        Ok(())
    }

    // == Keyspace ==
    /// Removes entries by key, returning how many existed.
    pub fn del(&mut self, keys: &[String]) -> u64 {
        keys.iter()
            .filter(|key| {
                let existed = self.live(key).is_some();
                self.entries.remove(key.as_str());
                existed
            })
            .count() as u64
    }

    pub fn exists(&mut self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Remaining TTL in milliseconds: -2 missing, -1 no expiry.
    pub fn pttl(&mut self, key: &str) -> i64 {
        match self.live(key) {
            None => -2,
            Some(entry) => entry
                .ttl_remaining()
                .map_or(-1, |remaining| remaining.as_millis() as i64),
        }
    }

    /// Remaining TTL in whole seconds, rounded to nearest like Redis.
    pub fn ttl(&mut self, key: &str) -> i64 {
        match self.pttl(key) {
            ms if ms < 0 => ms,
            ms => (ms + 500) / 1000,
        }
    }

    /// Sets a new expiry on an existing key.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> StoreResult<bool> {
        check_expiry(ttl, "expire")?;
        match self.live(key) {
            Some(entry) => {
                entry.set_ttl(Some(ttl));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Clears the expiry of a key; true if an expiry was removed.
    pub fn persist(&mut self, key: &str) -> bool {
        match self.live(key) {
            Some(entry) if entry.expires_at.is_some() => {
                entry.set_ttl(None);
                true
            }
            _ => false,
        }
    }

    /// Live keys matching a glob pattern (`*`, `?`, `[...]`).
    pub fn keys(&mut self, pattern: &str) -> StoreResult<Vec<String>> {
        let matcher = glob_to_regex(pattern)?;
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    // == Hashes ==
    pub fn hset(&mut self, key: &str, field: &str, value: String) -> StoreResult<()> {
        match &mut self.aggregate_mut(key, || StoredData::Hash(HashMap::new())).data {
            StoredData::Hash(hash) => {
                hash.insert(field.to_string(), value);
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    pub fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match self.live(key).map(|e| &e.data) {
            None => Ok(None),
            Some(StoredData::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    pub fn hgetall(&mut self, key: &str) -> StoreResult<HashMap<String, String>> {
        match self.live(key).map(|e| &e.data) {
            None => Ok(HashMap::new()),
            Some(StoredData::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    pub fn hdel(&mut self, key: &str, fields: &[String]) -> StoreResult<u64> {
        let removed = match self.live(key).map(|e| &mut e.data) {
            None => 0,
            Some(StoredData::Hash(hash)) => fields
                .iter()
                .filter(|field| hash.remove(field.as_str()).is_some())
                .count() as u64,
            Some(_) => return Err(wrong_type(key)),
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Adds `delta` to an integer hash field, creating it at zero.
    pub fn hincr(&mut self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        match &mut self.aggregate_mut(key, || StoredData::Hash(HashMap::new())).data {
            StoredData::Hash(hash) => {
                let current = match hash.get(field) {
                    Some(raw) => raw.parse::<i64>().map_err(|_| {
                        TransportError::Command("hash value is not an integer".to_string())
                    })?,
                    None => 0,
                };
                let next = current.checked_add(delta).ok_or_else(|| {
                    TransportError::Command(
                        "increment or decrement would overflow".to_string(),
                    )
                })?;
                hash.insert(field.to_string(), next.to_string());
                Ok(next)
            }
            _ => Err(wrong_type(key)),
        }
    }

    // == Lists ==
    /// Pushes values one by one, returning the new length.
    pub fn push(&mut self, key: &str, end: ListEnd, values: Vec<String>) -> StoreResult<u64> {
        match &mut self.aggregate_mut(key, || StoredData::List(VecDeque::new())).data {
            StoredData::List(list) => {
                for value in values {
                    match end {
                        ListEnd::Left => list.push_front(value),
                        ListEnd::Right => list.push_back(value),
                    }
                }
                Ok(list.len() as u64)
            }
            _ => Err(wrong_type(key)),
        }
    }

    pub fn pop(&mut self, key: &str, end: ListEnd) -> StoreResult<Option<String>> {
        let popped = match self.live(key).map(|e| &mut e.data) {
            None => None,
            Some(StoredData::List(list)) => match end {
                ListEnd::Left => list.pop_front(),
                ListEnd::Right => list.pop_back(),
            },
            Some(_) => return Err(wrong_type(key)),
        };
        self.drop_if_empty(key);
        Ok(popped)
    }

    /// Inclusive range; negative indices count from the end.
    pub fn lrange(&mut self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let list = match self.live(key).map(|e| &e.data) {
            None => return Ok(Vec::new()),
            Some(StoredData::List(list)) => list,
            Some(_) => return Err(wrong_type(key)),
        };

        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }

        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    // == Sets ==
    pub fn sadd(&mut self, key: &str, members: &[String]) -> StoreResult<u64> {
        match &mut self.aggregate_mut(key, || StoredData::Set(HashSet::new())).data {
            StoredData::Set(set) => Ok(members
                .iter()
                .filter(|member| set.insert(member.to_string()))
                .count() as u64),
            _ => Err(wrong_type(key)),
        }
    }

    pub fn smembers(&mut self, key: &str) -> StoreResult<HashSet<String>> {
        match self.live(key).map(|e| &e.data) {
            None => Ok(HashSet::new()),
            Some(StoredData::Set(set)) => Ok(set.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    pub fn srem(&mut self, key: &str, members: &[String]) -> StoreResult<u64> {
        let removed = match self.live(key).map(|e| &mut e.data) {
            None => 0,
            Some(StoredData::Set(set)) => members
                .iter()
                .filter(|member| set.remove(member.as_str()))
                .count() as u64,
            Some(_) => return Err(wrong_type(key)),
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    // == Length ==
    /// Returns the number of stored entries, including not yet swept expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Translates a Redis glob pattern into an anchored regex.
fn glob_to_regex(pattern: &str) -> StoreResult<Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('^') | Some('!')) {
                    chars.next();
                    out.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    if inner == '\\' || inner == '[' {
                        out.push('\\');
                    }
                    out.push(inner);
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).map_err(|e| TransportError::Command(format!("invalid pattern: {e}")))
}
