//! Cache Engine Module
//!
//! Shared state behind the public facade and the maintenance tasks. Store,
//! key manager and monitor sit behind a single lock so inserts, evictions and
//! rotation steps never interleave.

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, CacheStats, EntryStore};
use crate::config::Config;
use crate::crypto::{Codec, KeyManager, KeyNormalizer, NormalizedKey};
use crate::error::{CacheError, Result};
use crate::models::{CacheSize, RotationReport, SetOptions};
use crate::security::{pressure_relief_target, Notifier, SecurityEvent, SecurityMonitor};

// == Cache Core ==
/// Everything guarded by the engine lock.
#[derive(Debug)]
struct CacheCore {
    store: EntryStore,
    keys: KeyManager,
    monitor: SecurityMonitor,
    closed: bool,
}

impl CacheCore {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }
}

// == Cache Engine ==
#[derive(Debug)]
pub(crate) struct CacheEngine {
    core: RwLock<CacheCore>,
    /// Serializes rotation passes
    rotation: Mutex<()>,
    normalizer: KeyNormalizer,
    codec: Codec,
    notifier: Notifier,
    default_ttl_ms: u64,
    max_value_size: usize,
}

impl CacheEngine {
    // == Constructor ==
    pub(crate) fn new(config: &Config, notifier: Notifier) -> Result<Self> {
        config.validate()?;
        let keys = KeyManager::from_source(&config.key_source)?;

        Ok(Self {
            core: RwLock::new(CacheCore {
                store: EntryStore::new(config.max_size_bytes(), config.max_entries),
                keys,
                monitor: SecurityMonitor::new(config.suspicious_access_threshold),
                closed: false,
            }),
            rotation: Mutex::new(()),
            normalizer: KeyNormalizer::new(config.max_key_length),
            codec: Codec::new(
                config.compression_threshold_bytes,
                config.max_value_size_bytes(),
            ),
            notifier,
            default_ttl_ms: config.default_ttl_ms,
            max_value_size: config.max_value_size_bytes(),
        })
    }

    pub(crate) fn notify(&self, event: SecurityEvent) {
        self.notifier.emit(event);
    }

    /// Normalizes outside the lock. A closed cache reports `Closed` before any key error.
    async fn slot_for(&self, key: &str) -> Result<NormalizedKey> {
        match self.normalizer.normalize(key) {
            Ok(slot) => Ok(slot),
            Err(err) => Err(self.unless_closed(err).await),
        }
    }

    async fn unless_closed(&self, err: CacheError) -> CacheError {
        if self.is_closed().await {
            CacheError::Closed
        } else {
            err
        }
    }

    // == Set ==
    /// Seals and stores a serialized value.
    ///
    /// Entries larger than the eviction target are refused rather than
    /// flushing the whole cache to make room.
    pub(crate) async fn set_bytes(
        &self,
        key: &str,
        value: &[u8],
        options: &SetOptions,
    ) -> Result<()> {
        if value.len() > self.max_value_size {
            return Err(self
                .unless_closed(CacheError::ValueTooLarge {
                    size: value.len(),
                    limit: self.max_value_size,
                })
                .await);
        }
        let slot = self.slot_for(key).await?;
        if options.encrypt == Some(false) {
            debug!(key = %slot, "Plaintext storage requested; encrypting anyway");
        }
        let ttl_ms = options.ttl_ms.unwrap_or(self.default_ttl_ms);

        let mut core = self.core.write().await;
        core.ensure_open()?;
        let now = current_timestamp_ms();

        let envelope = match self.codec.encode(
            &slot,
            value,
            options.compress_hint(),
            core.keys.current_key(),
        ) {
            Ok(envelope) => envelope,
            Err(err) => {
                if let Some(event) = encode_failure_event(&err) {
                    self.notifier.emit(event);
                }
                return Err(err);
            }
        };

        let entry = CacheEntry::new(envelope, now, ttl_ms);
        let limit = core.store.max_entry_bytes();
        if entry.size_bytes > limit {
            return Err(CacheError::ValueTooLarge {
                size: entry.size_bytes,
                limit,
            });
        }
        let evicted = core.store.insert(slot, entry);
        if evicted > 0 {
            debug!(evicted, "Evicted least recently used entries to stay within budget");
        }
        if let Some(event) = core.monitor.record_write(&slot, now) {
            self.notifier.emit(event);
        }
        Ok(())
    }

    // == Get ==
    /// Opens a stored value. Unreadable entries are purged and reported as a miss.
    pub(crate) async fn get_bytes(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let slot = self.slot_for(key).await?;

        let mut core = self.core.write().await;
        core.ensure_open()?;
        let now = current_timestamp_ms();
        let CacheCore {
            store,
            keys,
            monitor,
            ..
        } = &mut *core;

        let decoded = match store.lookup(&slot, now) {
            None => return Ok(None),
            Some(entry) => match keys.key_for(entry.key_version()) {
                Some(key) => self.codec.decode(&slot, &entry.envelope, key),
                None => Err(CacheError::Decryption(format!(
                    "key generation {} is no longer available",
                    entry.key_version()
                ))),
            },
        };

        match decoded {
            Ok(plaintext) => {
                store.record_hit();
                if let Some(event) = monitor.record_access(&slot, now) {
                    self.notifier.emit(event);
                }
                Ok(Some(plaintext))
            }
            Err(err) => {
                debug!(key = %slot, error = %err, "Dropping unreadable entry");
                store.purge_corrupt(&slot);
                store.record_miss();
                self.notifier.emit(SecurityEvent::integrity_failure(slot));
                Ok(None)
            }
        }
    }

    // == Delete ==
    pub(crate) async fn delete(&self, key: &str) -> Result<bool> {
        let slot = self.slot_for(key).await?;
        let mut core = self.core.write().await;
        core.ensure_open()?;
        Ok(core.store.remove(&slot))
    }

    // == Has ==
    /// True if a live entry exists. Does not count as an access.
    pub(crate) async fn has(&self, key: &str) -> Result<bool> {
        let slot = self.slot_for(key).await?;
        let core = self.core.read().await;
        core.ensure_open()?;
        Ok(core.store.peek(&slot, current_timestamp_ms()).is_some())
    }

    // == Clear ==
    pub(crate) async fn clear(&self) -> Result<()> {
        let mut core = self.core.write().await;
        core.ensure_open()?;
        let removed = core.store.len();
        core.store.clear();
        core.monitor.reset();
        info!(removed, "Cache cleared");
        Ok(())
    }

    // == Stats ==
    pub(crate) async fn stats(&self) -> Result<CacheStats> {
        let core = self.core.read().await;
        core.ensure_open()?;
        Ok(snapshot(&core))
    }

    pub(crate) async fn size(&self) -> Result<CacheSize> {
        let core = self.core.read().await;
        core.ensure_open()?;
        Ok(CacheSize {
            entries: core.store.len(),
            bytes: core.store.total_size_bytes(),
        })
    }

    // == Purge Expired ==
    /// Proactively removes expired entries. Returns the number removed.
    pub(crate) async fn purge_expired(&self) -> Result<usize> {
        let mut core = self.core.write().await;
        core.ensure_open()?;
        Ok(core.store.expire_sweep(current_timestamp_ms()))
    }

    // == Security Checks ==
    /// Runs the memory-pressure and overflow checks and prunes access windows.
    ///
    /// Returns the number of entries evicted to relieve memory pressure.
    pub(crate) async fn run_security_checks(&self) -> Result<usize> {
        let mut core = self.core.write().await;
        core.ensure_open()?;
        core.monitor.sweep(current_timestamp_ms());

        let mut relieved = 0;
        let stats = snapshot(&core);
        if let Some(event) = core.monitor.check_memory_pressure(&stats) {
            self.notifier.emit(event);
            let target = pressure_relief_target(core.store.max_size_bytes());
            relieved = core.store.evict_to(target);
        }

        let stats = snapshot(&core);
        if let Some(event) = core.monitor.check_overflow(&stats, core.store.max_entries()) {
            self.notifier.emit(event);
        }
        Ok(relieved)
    }

    // == Rotate Keys ==
    /// Swaps in a new key and reseals every entry under it.
    ///
    /// The engine lock is taken once per entry, so reads and writes proceed
    /// between steps. Both generations stay available until the pass ends.
    /// Entries that cannot be opened with the old key are dropped.
    pub(crate) async fn rotate_keys(&self, reason: &str) -> Result<RotationReport> {
        let _rotation = self.rotation.lock().await;

        let (result, pending) = {
            let mut core = self.core.write().await;
            core.ensure_open()?;
            let result = core.keys.rotate();
            (result, core.store.keys())
        };
        debug!(
            from = result.previous_version,
            to = result.current_version,
            entries = pending.len(),
            "Resealing entries under new key"
        );

        let mut migrated = 0;
        let mut dropped = 0;
        for slot in pending {
            let mut core = self.core.write().await;
            core.ensure_open()?;
            match self.reseal_entry(&mut *core, &slot, result.current_version) {
                Some(true) => migrated += 1,
                Some(false) => {
                    dropped += 1;
                    self.notifier.emit(SecurityEvent::integrity_failure(slot));
                }
                None => {}
            }
            drop(core);
            tokio::task::yield_now().await;
        }

        {
            let mut core = self.core.write().await;
            core.ensure_open()?;
            core.keys.retire_previous();
        }

        let report = RotationReport {
            previous_version: result.previous_version,
            current_version: result.current_version,
            migrated,
            dropped,
        };
        self.notifier.emit(SecurityEvent::key_rotation(
            reason,
            Some(report.processed()),
        ));
        Ok(report)
    }

    /// Reseals one entry in place.
    ///
    /// Returns `None` if the entry is gone or already current, `Some(false)`
    /// if it had to be dropped.
    fn reseal_entry(
        &self,
        core: &mut CacheCore,
        slot: &NormalizedKey,
        current_version: u64,
    ) -> Option<bool> {
        let CacheCore { store, keys, .. } = core;
        let entry = store.get(slot)?;
        if entry.key_version() == current_version {
            return None;
        }

        let resealed = match keys.key_for(entry.key_version()) {
            Some(old_key) => {
                self.codec
                    .reseal(slot, &entry.envelope, old_key, keys.current_key())
            }
            None => Err(CacheError::Decryption(format!(
                "key generation {} is no longer available",
                entry.key_version()
            ))),
        };

        match resealed {
            Ok(envelope) => {
                store.replace_envelope(slot, envelope);
                Some(true)
            }
            Err(err) => {
                warn!(key = %slot, error = %err, "Dropping entry that failed to reseal");
                store.purge_corrupt(slot);
                Some(false)
            }
        }
    }

    // == Close ==
    /// Drops all entries, wipes key material and refuses further use.
    pub(crate) async fn close(&self) {
        let mut core = self.core.write().await;
        if core.closed {
            return;
        }
        core.store.clear();
        core.monitor.reset();
        core.keys.wipe();
        core.closed = true;
    }

    pub(crate) async fn is_closed(&self) -> bool {
        self.core.read().await.closed
    }

    /// Flips a bit in the stored authentication tag for `key`.
    #[cfg(test)]
    pub(crate) async fn tamper_auth_tag(&self, key: &str) -> bool {
        let Ok(slot) = self.normalizer.normalize(key) else {
            return false;
        };
        let mut core = self.core.write().await;
        match core.store.entry_mut(&slot) {
            Some(entry) => {
                entry.envelope.auth_tag[0] ^= 0x01;
                true
            }
            None => false,
        }
    }

    /// Checks the size invariant from inside the lock.
    #[cfg(test)]
    pub(crate) async fn size_is_consistent(&self) -> bool {
        let core = self.core.read().await;
        core.store.accounted_size() == core.store.total_size_bytes()
    }
}

/// Only sealing failures are security events; compression errors are not.
fn encode_failure_event(err: &CacheError) -> Option<SecurityEvent> {
    match err {
        CacheError::Encryption(_) => Some(SecurityEvent::encryption_failure(err)),
        _ => None,
    }
}

fn snapshot(core: &CacheCore) -> CacheStats {
    core.store.stats().snapshot(
        core.store.max_size_bytes(),
        core.keys.current_key().version(),
    )
}
