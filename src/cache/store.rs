//! Entry Store Module
//!
//! Bounded map of sealed entries with LRU ordering, TTL expiration and size accounting.

use std::collections::HashMap;

use crate::cache::{CacheEntry, CacheStats, LruTracker};
use crate::crypto::{Envelope, NormalizedKey};

/// Eviction stops once usage (including the incoming entry) is at or below this share.
pub const EVICTION_TARGET_PERCENT: usize = 80;

// == Entry Store ==
/// Storage for sealed entries with LRU eviction and TTL support.
///
/// `stats.total_size_bytes` always equals the sum of the stored entries'
/// `size_bytes` between calls.
#[derive(Debug)]
pub struct EntryStore {
    /// Sealed entries by normalized key
    entries: HashMap<NormalizedKey, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker<NormalizedKey>,
    /// Performance statistics and running totals
    stats: CacheStats,
    /// Memory budget in bytes
    max_size_bytes: usize,
    /// Maximum number of entries allowed
    max_entries: usize,
}

impl EntryStore {
    // == Constructor ==
    /// Creates a new EntryStore with the given byte and entry budgets.
    pub fn new(max_size_bytes: usize, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_size_bytes,
            max_entries,
        }
    }

    // == Insert ==
    /// Stores an entry, evicting least recently used entries if over budget.
    ///
    /// An existing entry under the same key is replaced and never counted as
    /// an eviction. Returns the number of entries evicted.
    pub fn insert(&mut self, key: NormalizedKey, entry: CacheEntry) -> usize {
        self.remove_entry(&key);

        let evicted = self.make_room(entry.size_bytes);

        self.stats.total_size_bytes += entry.size_bytes;
        self.entries.insert(key, entry);
        self.lru.touch(&key);
        self.sync_counts();

        evicted
    }

    // == Lookup ==
    /// Retrieves a live entry and marks it most recently used.
    ///
    /// Absent and expired entries count as misses; expired entries are removed.
    /// Hits are not counted here since the caller may still fail to open the envelope.
    pub fn lookup(&mut self, key: &NormalizedKey, now: u64) -> Option<&CacheEntry> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            return None;
        }

        self.lru.touch(key);
        let entry = self.entries.get_mut(key)?;
        entry.record_access(now);
        Some(&*entry)
    }

    /// Returns an entry regardless of expiry, without touching LRU order or statistics.
    pub fn get(&self, key: &NormalizedKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Returns a live entry without touching LRU order or statistics.
    pub fn peek(&self, key: &NormalizedKey, now: u64) -> Option<&CacheEntry> {
        self.entries.get(key).filter(|entry| !entry.is_expired(now))
    }

    // == Remove ==
    /// Removes an entry by key. Returns false if it was not present.
    pub fn remove(&mut self, key: &NormalizedKey) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Removes an entry whose envelope failed authentication.
    pub fn purge_corrupt(&mut self, key: &NormalizedKey) -> bool {
        let removed = self.remove(key);
        if removed {
            self.stats.record_integrity_failure();
        }
        removed
    }

    // == Replace Envelope ==
    /// Swaps a resealed envelope into an existing entry in place.
    ///
    /// TTL, access metadata and LRU position are preserved.
    pub fn replace_envelope(&mut self, key: &NormalizedKey, envelope: Envelope) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        let (old_size, new_size) = entry.replace_envelope(envelope);
        self.stats.total_size_bytes = self.stats.total_size_bytes - old_size + new_size;
        true
    }

    // == Expire Sweep ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub fn expire_sweep(&mut self, now: u64) -> usize {
        let expired_keys: Vec<NormalizedKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| *key)
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
            self.stats.record_expiration();
        }

        expired_keys.len()
    }

    // == Evict To ==
    /// Evicts least recently used entries until total size is at most `target_bytes`.
    pub fn evict_to(&mut self, target_bytes: usize) -> usize {
        let mut evicted = 0;
        while self.stats.total_size_bytes > target_bytes {
            if !self.evict_oldest() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    // == Clear ==
    /// Drops every entry and resets statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats = CacheStats::new();
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<NormalizedKey> {
        self.lru.iter().copied().collect()
    }

    pub fn record_hit(&mut self) {
        self.stats.record_hit();
    }

    pub fn record_miss(&mut self) {
        self.stats.record_miss();
    }

    /// Raw statistics; derived fields are filled in by `CacheStats::snapshot`.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn total_size_bytes(&self) -> usize {
        self.stats.total_size_bytes
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Size the store shrinks to once an insert goes over budget.
    pub fn eviction_target_bytes(&self) -> usize {
        self.max_size_bytes * EVICTION_TARGET_PERCENT / 100
    }

    /// Largest entry the store accepts.
    pub fn max_entry_bytes(&self) -> usize {
        self.eviction_target_bytes()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    // == Length ==
    /// Returns the current number of entries in the store.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn make_room(&mut self, incoming: usize) -> usize {
        let over_budget = self.stats.total_size_bytes + incoming > self.max_size_bytes
            || self.entries.len() >= self.max_entries;
        if !over_budget {
            return 0;
        }

        let target = self.eviction_target_bytes();
        let mut evicted = 0;
        while self.stats.total_size_bytes + incoming > target
            || self.entries.len() >= self.max_entries
        {
            if !self.evict_oldest() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    fn evict_oldest(&mut self) -> bool {
        match self.lru.evict_oldest() {
            Some(key) => {
                if let Some(entry) = self.entries.remove(&key) {
                    self.stats.total_size_bytes -= entry.size_bytes;
                }
                self.stats.record_eviction();
                self.sync_counts();
                true
            }
            None => false,
        }
    }

    fn remove_entry(&mut self, key: &NormalizedKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.stats.total_size_bytes -= entry.size_bytes;
        self.sync_counts();
        Some(entry)
    }

    fn sync_counts(&mut self) {
        self.stats.entry_count = self.entries.len();
    }

    /// Direct access to a stored entry for tamper tests.
    #[cfg(test)]
    pub(crate) fn entry_mut(&mut self, key: &NormalizedKey) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    /// Recomputes the size total from scratch.
    #[cfg(test)]
    pub(crate) fn accounted_size(&self) -> usize {
        self.entries.values().map(|entry| entry.size_bytes).sum()
    }
}
