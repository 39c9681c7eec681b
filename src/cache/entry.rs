//! Cache Entry Module
//!
//! Defines the structure for individual encrypted cache entries with TTL support.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::crypto::{Envelope, NORMALIZED_KEY_LENGTH};

/// Per-entry bookkeeping charged against the size budget on top of the envelope.
pub const ENTRY_OVERHEAD_BYTES: usize = NORMALIZED_KEY_LENGTH;

// == Cache Entry ==
/// A sealed value plus the plaintext metadata needed for expiry and eviction.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Encrypted payload
    pub envelope: Envelope,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Number of successful reads
    pub access_count: u64,
    /// Last read or write (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Contribution to the store's total size
    pub size_bytes: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry that expires `ttl_ms` after `now`.
    pub fn new(envelope: Envelope, now: u64, ttl_ms: u64) -> Self {
        let size_bytes = envelope.len() + ENTRY_OVERHEAD_BYTES;
        Self {
            envelope,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            access_count: 0,
            last_accessed_at: now,
            size_bytes,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is still live at exactly `expires_at` and expired one
    /// millisecond later.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// Returns remaining TTL in milliseconds, saturating at zero.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Key generation of the stored envelope.
    pub fn key_version(&self) -> u64 {
        self.envelope.key_version
    }

    /// Payload was compressed before encryption.
    pub fn compressed(&self) -> bool {
        self.envelope.compressed
    }

    // == Record Access ==
    pub fn record_access(&mut self, now: u64) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }

    // == Replace Envelope ==
    /// Swaps in a resealed envelope and returns the size delta.
    ///
    /// Returns `(old_size, new_size)` so the caller can fix its totals.
    pub fn replace_envelope(&mut self, envelope: Envelope) -> (usize, usize) {
        let old_size = self.size_bytes;
        self.size_bytes = envelope.len() + ENTRY_OVERHEAD_BYTES;
        self.envelope = envelope;
        (old_size, self.size_bytes)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
