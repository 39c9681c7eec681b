//! Cache Module
//!
//! Encrypted in-memory caching with TTL expiration and LRU eviction.

mod engine;
mod entry;
mod facade;
mod lru;
mod stats;
mod store;


pub(crate) use engine::CacheEngine;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, ENTRY_OVERHEAD_BYTES};
pub use facade::{SecureCache, SecureCacheBuilder};
pub use lru::LruTracker;
pub use stats::{CacheStats, MemoryUsage};
pub use store::{EntryStore, EVICTION_TARGET_PERCENT};
