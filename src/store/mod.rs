//! Store Module
//!
//! Typed access to the backing store, the tag index, the cache-aside
//! orchestrator and the in-process store used by the memory backend.

mod adapter;
mod aside;
mod entry;
mod memory;
mod stats;
mod tags;
mod value;


pub use adapter::{KeyTtl, StoreAdapter};
pub use aside::CacheAside;
pub use entry::{CacheEntry, StoredData};
pub use memory::MemoryStore;
pub use stats::{CacheStats, StatsRecorder};
pub use tags::{key_tags_key, tag_key, TagIndex};
pub use value::CacheValue;
