//! Results returned by cache operations

use serde::Serialize;

/// Response body for `SecureCache::size`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheSize {
    /// Number of stored entries
    pub entries: usize,
    /// Bytes charged against the memory budget
    pub bytes: usize,
}

/// Outcome of a key rotation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    /// Generation entries were migrated from
    pub previous_version: u64,
    /// Generation now sealing all entries
    pub current_version: u64,
    /// Entries resealed under the new key
    pub migrated: usize,
    /// Entries dropped because they could not be opened with the old key
    pub dropped: usize,
}

impl RotationReport {
    /// Entries visited during the pass.
    pub fn processed(&self) -> usize {
        self.migrated + self.dropped
    }
}
