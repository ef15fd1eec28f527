//! Tag Index
//!
//! Secondary index from tags to keys and keys to tags, used to evict
//! groups of entries together.
//!
//! Writes and invalidations are multi-step and not transactional. A crash
//! or an overlapping write in the middle can leave a key deleted but still
//! listed under a tag, or the reverse. Treat the index as eventually
//! consistent: a `set_with_tags` for tag T that lands between an
//! invalidation reading `tag:T` and deleting its members survives that
//! invalidation pass.

use std::collections::HashSet;

use tracing::debug;

use crate::error::Result;
use crate::store::{CacheValue, KeyTtl, StoreAdapter};

const TAG_PREFIX: &str = "tag:";
const KEY_TAGS_PREFIX: &str = "keytags:";

/// Store key of the set of keys carrying `tag`.
pub fn tag_key(tag: &str) -> String {
    format!("{TAG_PREFIX}{tag}")
}

/// Store key of the set of tags attached to `key`.
pub fn key_tags_key(key: &str) -> String {
    format!("{KEY_TAGS_PREFIX}{key}")
}

// == Tag Index ==
#[derive(Clone)]
pub struct TagIndex {
    store: StoreAdapter,
}

impl TagIndex {
    pub fn new(store: StoreAdapter) -> Self {
        Self { store }
    }

    // == Tagged Write ==
    /// Writes an entry and records it under each tag.
    ///
    /// The tag records get the entry's TTL so the bookkeeping does not
    /// outlive the data. A shared `tag:` set is only ever extended: its
    /// expiry is raised to `ttl_seconds` when shorter and never lowered, so
    /// a short-lived sibling cannot drop a longer-lived member from the
    /// index. `ttl_seconds == 0` makes the records persistent.
    pub async fn set_with_tags(
        &self,
        key: &str,
        value: &CacheValue,
        tags: &[&str],
        ttl_seconds: u64,
    ) -> Result<()> {
        self.store.set(key, value, ttl_seconds).await?;
        if tags.is_empty() {
            return Ok(());
        }

        let reverse = key_tags_key(key);
        for &tag in tags {
            let forward = tag_key(tag);
            let before = self.store.ttl(&forward).await?;
            self.store.sadd(&forward, &[key]).await?;
            self.store.sadd(&reverse, &[tag]).await?;
            self.extend_expiry(&forward, before, ttl_seconds).await?;
        }
        self.apply_expiry(&reverse, ttl_seconds).await?;

        debug!(key, ?tags, ttl = ttl_seconds, "Tagged cache entry written");
        Ok(())
    }

    async fn apply_expiry(&self, record: &str, ttl_seconds: u64) -> Result<()> {
        if ttl_seconds == 0 {
            self.store.persist(record).await?;
        } else {
            self.store.expire(record, ttl_seconds).await?;
        }
        Ok(())
    }

    /// `before` is the record's TTL prior to this write.
    async fn extend_expiry(&self, record: &str, before: KeyTtl, ttl_seconds: u64) -> Result<()> {
        if ttl_seconds == 0 {
            self.store.persist(record).await?;
            return Ok(());
        }
        match before {
            KeyTtl::NoExpiry => {}
            KeyTtl::Seconds(current) if current >= ttl_seconds => {}
            KeyTtl::Seconds(_) | KeyTtl::Missing => {
                self.store.expire(record, ttl_seconds).await?;
            }
        }
        Ok(())
    }

    // == Invalidation ==
    /// Deletes every key recorded under `tag` and the related records.
    ///
    /// Returns the number of keys actually removed, so a repeated call
    /// returns 0.
    pub async fn invalidate_by_tag(&self, tag: &str) -> Result<u64> {
        let forward = tag_key(tag);
        let keys: Vec<String> = self.store.smembers(&forward).await?.into_iter().collect();

        let removed = self.store.del_many(&keys).await?;
        let reverse: Vec<String> = keys.iter().map(|key| key_tags_key(key)).collect();
        self.store.del_many(&reverse).await?;
        self.store.del(&forward).await?;

        debug!(tag, removed, "Tag invalidated");
        Ok(removed)
    }

    // == Lookups ==
    pub async fn keys_for_tag(&self, tag: &str) -> Result<HashSet<String>> {
        self.store.smembers(&tag_key(tag)).await
    }

    pub async fn tags_for_key(&self, key: &str) -> Result<HashSet<String>> {
        self.store.smembers(&key_tags_key(key)).await
    }
}
