//! Secure Cache Facade
//!
//! The public entry point. Serializes values, delegates to the engine and
//! owns the background maintenance tasks.

use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::cache::{CacheEngine, CacheStats};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{CacheSize, RotationReport, SetOptions};
use crate::security::{NotificationSink, Notifier};
use crate::tasks::MaintenanceScheduler;

/// Reason attached to rotations requested through `rotate_keys`.
const MANUAL_ROTATION: &str = "manual";

// == Builder ==
/// Configures a [`SecureCache`] before it starts.
pub struct SecureCacheBuilder {
    config: Config,
    sink: Option<Arc<dyn NotificationSink>>,
    maintenance: bool,
}

impl SecureCacheBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sink: None,
            maintenance: true,
        }
    }

    /// Subscribes a sink to security notifications.
    pub fn notify(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Skips the background tasks; maintenance then runs only when called.
    pub fn without_maintenance(mut self) -> Self {
        self.maintenance = false;
        self
    }

    /// Validates the config, initializes key material and starts maintenance.
    ///
    /// # Errors
    /// `InvalidConfig` for a bad config or when called outside a Tokio runtime.
    pub fn build(self) -> Result<SecureCache> {
        if Handle::try_current().is_err() {
            return Err(CacheError::InvalidConfig(
                "SecureCache must be created inside a Tokio runtime".to_string(),
            ));
        }

        let engine = Arc::new(CacheEngine::new(&self.config, Notifier::new(self.sink))?);
        let scheduler = if self.maintenance {
            MaintenanceScheduler::start(&engine, &self.config)
        } else {
            MaintenanceScheduler::idle()
        };

        info!(
            max_size_mb = self.config.max_size_mb,
            max_entries = self.config.max_entries,
            default_ttl_ms = self.config.default_ttl_ms,
            maintenance = self.maintenance,
            "Secure cache initialized"
        );

        Ok(SecureCache {
            engine,
            scheduler: Mutex::new(scheduler),
        })
    }
}

impl std::fmt::Debug for SecureCacheBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureCacheBuilder")
            .field("config", &self.config)
            .field("subscribed", &self.sink.is_some())
            .field("maintenance", &self.maintenance)
            .finish()
    }
}

// == Secure Cache ==
/// Encrypted in-process key-value cache.
///
/// Values are serialized to JSON, optionally compressed and sealed with
/// AES-256-GCM before they are stored. Keys are normalized through a salted
/// hash, so neither keys nor values are held in plaintext.
///
/// The cache is meant to be shared, e.g. behind an `Arc`, and every method
/// takes `&self`. Dropping the cache stops its background tasks. Call
/// [`SecureCache::shutdown`] to also wipe entries and key material right away.
#[derive(Debug)]
pub struct SecureCache {
    engine: Arc<CacheEngine>,
    scheduler: Mutex<MaintenanceScheduler>,
}

impl SecureCache {
    /// Creates a cache with maintenance running and no notification sink.
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> SecureCacheBuilder {
        SecureCacheBuilder::new(config)
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// Returns `Ok(false)` when the value could not be serialized or
    /// compressed; nothing is stored in that case.
    ///
    /// # Errors
    /// - `InvalidKey` if the key is empty or too long
    /// - `ValueTooLarge` if the serialized value exceeds the configured limit
    /// - `Encryption` if sealing fails
    /// - `Closed` after shutdown
    pub async fn set<T>(&self, key: &str, value: &T, options: SetOptions) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(err) => {
                warn!(error = %err, "Value could not be serialized; not stored");
                return Ok(false);
            }
        };
        self.set_bytes(key, &bytes, options).await
    }

    /// Stores raw bytes without JSON encoding. Same contract as [`SecureCache::set`].
    pub async fn set_bytes(&self, key: &str, value: &[u8], options: SetOptions) -> Result<bool> {
        match self.engine.set_bytes(key, value, &options).await {
            Ok(()) => Ok(true),
            Err(err @ (CacheError::Compression(_) | CacheError::Serialization(_))) => {
                warn!(error = %err, "Value could not be stored");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    // == Get ==
    /// Returns the value stored under `key`, or `None` if it is absent,
    /// expired, or failed authentication.
    ///
    /// # Errors
    /// `Serialization` if the stored value does not decode as `T`.
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.engine.get_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns raw bytes. The buffer is wiped when dropped.
    pub async fn get_bytes(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        self.engine.get_bytes(key).await
    }

    // == Delete ==
    /// Removes `key`. Returns false if it was not present.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.engine.delete(key).await
    }

    /// True if a live entry exists for `key`. Not counted as a hit or miss.
    pub async fn has(&self, key: &str) -> Result<bool> {
        self.engine.has(key).await
    }

    /// Removes every entry and resets statistics.
    pub async fn clear(&self) -> Result<()> {
        self.engine.clear().await
    }

    // == Stats ==
    pub async fn stats(&self) -> Result<CacheStats> {
        self.engine.stats().await
    }

    pub async fn size(&self) -> Result<CacheSize> {
        self.engine.size().await
    }

    // == Maintenance ==
    /// Rotates the encryption key now and reseals every entry.
    pub async fn rotate_keys(&self) -> Result<RotationReport> {
        self.engine.rotate_keys(MANUAL_ROTATION).await
    }

    /// Removes expired entries now. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.engine.purge_expired().await
    }

    /// Runs the memory-pressure and overflow checks now.
    ///
    /// Returns the number of entries evicted to relieve pressure.
    pub async fn run_security_checks(&self) -> Result<usize> {
        self.engine.run_security_checks().await
    }

    // == Shutdown ==
    /// Stops maintenance, drops all entries and wipes key material.
    ///
    /// Every later call, through any handle, returns `CacheError::Closed`.
    /// Calling this twice is harmless.
    pub async fn shutdown(&self) {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
        if !self.engine.is_closed().await {
            self.engine.close().await;
            info!("Secure cache shut down");
        }
    }

    pub fn maintenance_running(&self) -> bool {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_running()
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    use crate::crypto::KEY_LENGTH;
    use crate::security::{notification_channel, SecurityEvent};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        roles: Vec<String>,
    }

    fn manual_cache() -> SecureCache {
        SecureCache::builder(Config::default())
            .without_maintenance()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get_struct() {
        let cache = manual_cache();
        let profile = Profile {
            name: "alice".to_string(),
            roles: vec!["admin".to_string()],
        };

        cache.set("user:1", &profile, SetOptions::new()).await.unwrap();
        let loaded: Option<Profile> = cache.get("user:1").await.unwrap();
        assert_eq!(loaded, Some(profile));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let cache = manual_cache();
        let loaded: Option<String> = cache.get("nope").await.unwrap();
        assert!(loaded.is_none());
        assert_eq!(cache.stats().await.unwrap().misses, 1);
    }

    #[tokio::test]
    async fn test_get_with_wrong_type() {
        let cache = manual_cache();
        cache.set("n", &42u32, SetOptions::new()).await.unwrap();

        let result: Result<Option<Profile>> = cache.get("n").await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_unserializable_value_returns_false() {
        let cache = manual_cache();
        let mut value = std::collections::HashMap::new();
        value.insert((1, 2), "tuple keys are not valid JSON object keys");

        assert!(!cache.set("bad", &value, SetOptions::new()).await.unwrap());
        assert!(!cache.has("bad").await.unwrap());
        assert!(cache.set("good", &1, SetOptions::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let cache = manual_cache();
        cache.set("k", "first", SetOptions::new()).await.unwrap();
        cache.set("k", "second", SetOptions::new()).await.unwrap();

        let loaded: Option<String> = cache.get("k").await.unwrap();
        assert_eq!(loaded.as_deref(), Some("second"));
        assert_eq!(cache.size().await.unwrap().entries, 1);
    }

    #[tokio::test]
    async fn test_delete_and_has() {
        let cache = manual_cache();
        cache.set("k", &1, SetOptions::new()).await.unwrap();

        assert!(cache.has("k").await.unwrap());
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.has("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());

        // has() is not an access
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let cache = manual_cache();
        let long_key = "k".repeat(513);

        assert!(matches!(
            cache.set("", &1, SetOptions::new()).await,
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            cache.set(&long_key, &1, SetOptions::new()).await,
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            cache.get::<i32>("").await,
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_value_too_large() {
        let config = Config {
            max_value_size_mb: 1,
            ..Config::default()
        };
        let cache = SecureCache::builder(config)
            .without_maintenance()
            .build()
            .unwrap();
        let big = vec![0u8; 1024 * 1024 + 1];

        let result = cache.set_bytes("big", &big, SetOptions::new()).await;
        assert!(matches!(result, Err(CacheError::ValueTooLarge { .. })));
        assert_eq!(cache.size().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let cache = manual_cache();
        cache.set("a", &1, SetOptions::new()).await.unwrap();

        cache.get::<i32>("a").await.unwrap();
        cache.get::<i32>("a").await.unwrap();
        cache.get::<i32>("a").await.unwrap();
        cache.get::<i32>("missing").await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_tampered_entry_is_purged() {
        let (sink, mut rx) = notification_channel(8);
        let cache = SecureCache::builder(Config::default())
            .without_maintenance()
            .notify(sink)
            .build()
            .unwrap();
        cache.set("a", "alpha", SetOptions::new()).await.unwrap();
        cache.set("b", "bravo", SetOptions::new()).await.unwrap();

        assert!(cache.engine().tamper_auth_tag("a").await);

        let loaded: Option<String> = cache.get("a").await.unwrap();
        assert!(loaded.is_none());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.integrity_failures, 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            SecurityEvent::IntegrityFailure { .. }
        ));

        let other: Option<String> = cache.get("b").await.unwrap();
        assert_eq!(other.as_deref(), Some("bravo"));
    }

    #[tokio::test]
    async fn test_rotate_keys_preserves_entries() {
        let cache = manual_cache();
        for i in 0..100 {
            cache
                .set(&format!("key:{}", i), &i, SetOptions::new())
                .await
                .unwrap();
        }
        let before = cache.stats().await.unwrap().key_version;

        let report = cache.rotate_keys().await.unwrap();
        assert_eq!(report.migrated, 100);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.current_version, before + 1);

        for i in 0..100 {
            let value: Option<i32> = cache.get(&format!("key:{}", i)).await.unwrap();
            assert_eq!(value, Some(i));
        }
        assert_eq!(cache.stats().await.unwrap().key_version, before + 1);
        assert!(cache.engine().size_is_consistent().await);
    }

    #[tokio::test]
    async fn test_compressed_value_round_trip() {
        let cache = manual_cache();
        let text = "repeat ".repeat(1_000);

        cache.set("doc", &text, SetOptions::new()).await.unwrap();
        let raw_len = serde_json::to_vec(&text).unwrap().len();
        assert!(cache.size().await.unwrap().bytes < raw_len);

        let loaded: Option<String> = cache.get("doc").await.unwrap();
        assert_eq!(loaded, Some(text));
    }

    #[tokio::test]
    async fn test_secret_key_source() {
        let config = Config {
            key_source: crate::config::KeySource::Secret(Zeroizing::new(vec![
                7u8;
                KEY_LENGTH
            ])),
            ..Config::default()
        };
        let cache = SecureCache::builder(config)
            .without_maintenance()
            .build()
            .unwrap();
        cache.set("k", "v", SetOptions::new()).await.unwrap();
        assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_cache() {
        let cache = SecureCache::new(Config::default()).unwrap();
        assert!(cache.maintenance_running());
        cache.set("k", &1, SetOptions::new()).await.unwrap();

        cache.shutdown().await;
        assert!(!cache.maintenance_running());
        assert!(matches!(cache.get::<i32>("k").await, Err(CacheError::Closed)));
        assert!(matches!(
            cache.set("k", &1, SetOptions::new()).await,
            Err(CacheError::Closed)
        ));
        assert!(matches!(cache.stats().await, Err(CacheError::Closed)));

        // Idempotent
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_through_shared_handle() {
        let cache = Arc::new(SecureCache::new(Config::default()).unwrap());
        cache.set("k", &1, SetOptions::new()).await.unwrap();

        let worker = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                loop {
                    match cache.get::<i32>("k").await {
                        Ok(_) => tokio::task::yield_now().await,
                        Err(err) => return err,
                    }
                }
            })
        };

        cache.shutdown().await;
        assert!(!cache.maintenance_running());
        assert!(matches!(worker.await.unwrap(), CacheError::Closed));
    }

    #[tokio::test]
    async fn test_closed_reported_before_validation_errors() {
        let config = Config {
            max_value_size_mb: 1,
            ..Config::default()
        };
        let cache = SecureCache::builder(config)
            .without_maintenance()
            .build()
            .unwrap();
        cache.shutdown().await;

        assert!(matches!(cache.get::<i32>("").await, Err(CacheError::Closed)));
        assert!(matches!(cache.delete("").await, Err(CacheError::Closed)));
        assert!(matches!(cache.has("").await, Err(CacheError::Closed)));
        assert!(matches!(
            cache.set("", &1, SetOptions::new()).await,
            Err(CacheError::Closed)
        ));
        let big = vec![0u8; 1024 * 1024 + 1];
        assert!(matches!(
            cache.set_bytes("big", &big, SetOptions::new()).await,
            Err(CacheError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_rotation_drops_tampered_entry() {
        let (sink, mut rx) = notification_channel(16);
        let cache = SecureCache::builder(Config::default())
            .without_maintenance()
            .notify(sink)
            .build()
            .unwrap();
        for i in 0..5 {
            cache
                .set(&format!("k{}", i), &i, SetOptions::new())
                .await
                .unwrap();
        }
        assert!(cache.engine().tamper_auth_tag("k2").await);

        let report = cache.rotate_keys().await.unwrap();
        assert_eq!(report.migrated, 4);
        assert_eq!(report.dropped, 1);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entry_count, 4);
        assert_eq!(stats.integrity_failures, 1);
        assert!(!cache.has("k2").await.unwrap());
        for i in [0, 1, 3, 4] {
            let value: Option<i32> = cache.get(&format!("k{}", i)).await.unwrap();
            assert_eq!(value, Some(i));
        }
        assert!(cache.engine().size_is_consistent().await);

        let mut integrity = 0;
        let mut rotation_processed = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                SecurityEvent::IntegrityFailure { .. } => integrity += 1,
                SecurityEvent::KeyRotation {
                    entries_processed, ..
                } => rotation_processed = entries_processed,
                _ => {}
            }
        }
        assert_eq!(integrity, 1);
        assert_eq!(rotation_processed, Some(5));
    }

    #[tokio::test]
    async fn test_entry_above_eviction_target_rejected() {
        let config = Config {
            max_size_mb: 1,
            max_value_size_mb: 1,
            ..Config::default()
        };
        let cache = SecureCache::builder(config)
            .without_maintenance()
            .build()
            .unwrap();
        for i in 0..50 {
            cache
                .set_bytes(
                    &format!("blob:{}", i),
                    &[3u8; 10_000],
                    SetOptions::new().compress(false),
                )
                .await
                .unwrap();
        }

        // Under the value limit, but larger than 80% of the budget
        let huge = vec![9u8; 900 * 1024];
        let result = cache
            .set_bytes("huge", &huge, SetOptions::new().compress(false))
            .await;
        assert!(matches!(result, Err(CacheError::ValueTooLarge { .. })));

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entry_count, 50);
        assert_eq!(stats.evictions, 0);
        assert!(stats.memory_usage.percentage <= 80.0);
        assert!(!cache.has("huge").await.unwrap());
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = SecureCache::new(Config::default());
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }
}
