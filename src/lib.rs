//! Secure Cache - An encrypted in-process key-value cache
//!
//! Values are sealed with AES-256-GCM under a rotating key, keys are stored
//! only as salted hashes, and entries expire by TTL or are evicted in LRU
//! order once the memory budget is reached.
//!
//! ```no_run
//! use secure_cache::{Config, SecureCache, SetOptions};
//!
//! # async fn demo() -> secure_cache::Result<()> {
//! let cache = SecureCache::new(Config::default())?;
//! cache.set("session:42", &"token", SetOptions::new().ttl_ms(60_000)).await?;
//! let token: Option<String> = cache.get("session:42").await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod security;
pub mod tasks;

pub use cache::{CacheStats, MemoryUsage, SecureCache, SecureCacheBuilder};
pub use config::{Config, KeySource};
pub use error::{CacheError, Result};
pub use models::{CacheSize, RotationReport, SetOptions};
pub use security::{notification_channel, ChannelSink, NotificationSink, SecurityEvent};
pub use tasks::MaintenanceScheduler;
