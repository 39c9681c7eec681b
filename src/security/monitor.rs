//! Security Monitor Module
//!
//! Tracks per-key access frequency and global memory usage, producing
//! notifications when either looks anomalous.

use std::collections::{HashMap, VecDeque};

use crate::cache::CacheStats;
use crate::crypto::NormalizedKey;
use crate::security::SecurityEvent;

/// Trailing window for access counting (one hour).
pub const ACCESS_WINDOW_MS: u64 = 60 * 60 * 1000;

/// Memory usage percentage above which pressure relief kicks in.
pub const MEMORY_PRESSURE_PERCENT: f64 = 90.0;

/// Share of the budget pressure relief evicts down to.
pub const PRESSURE_RELIEF_PERCENT: usize = 70;

/// Share of `max_entries` above which an overflow warning is raised.
pub const OVERFLOW_WARNING_RATIO: f64 = 0.95;

// == Access Pattern ==
#[derive(Debug, Default)]
struct AccessPattern {
    /// Access timestamps within the window, oldest first
    timestamps: VecDeque<u64>,
    /// Suspicious-access already reported for the current burst
    alerted: bool,
}

impl AccessPattern {
    fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(ACCESS_WINDOW_MS);
        while self.timestamps.front().is_some_and(|&ts| ts <= cutoff) {
            self.timestamps.pop_front();
        }
    }
}

// == Security Monitor ==
/// Heuristic anomaly detector. Never blocks or rejects a request.
#[derive(Debug)]
pub struct SecurityMonitor {
    patterns: HashMap<NormalizedKey, AccessPattern>,
    threshold: usize,
}

impl SecurityMonitor {
    // == Constructor ==
    /// # Arguments
    /// * `threshold` - Accesses per key within the window before alerting
    pub fn new(threshold: usize) -> Self {
        Self {
            patterns: HashMap::new(),
            threshold,
        }
    }

    // == Record Access ==
    /// Records a read of `key` and reports a suspicious burst.
    ///
    /// A burst is reported once when the count first exceeds the threshold
    /// and re-armed once it drops back to the threshold or below. At most
    /// `threshold + 1` timestamps are retained, which is enough to decide.
    pub fn record_access(&mut self, key: &NormalizedKey, now: u64) -> Option<SecurityEvent> {
        let cap = self.threshold.saturating_add(1);
        let pattern = self.patterns.entry(*key).or_default();
        pattern.prune(now);
        pattern.timestamps.push_back(now);
        while pattern.timestamps.len() > cap {
            pattern.timestamps.pop_front();
        }

        let count = pattern.timestamps.len();
        if count > self.threshold {
            if !pattern.alerted {
                pattern.alerted = true;
                return Some(SecurityEvent::suspicious_access(key, count));
            }
        } else {
            pattern.alerted = false;
        }
        None
    }

    /// Records a write of `key`; writes count towards the same window as reads.
    pub fn record_write(&mut self, key: &NormalizedKey, now: u64) -> Option<SecurityEvent> {
        self.record_access(key, now)
    }

    // == Memory Pressure ==
    /// Reports usage above `MEMORY_PRESSURE_PERCENT`.
    ///
    /// The caller relieves pressure by evicting down to `pressure_relief_target`.
    pub fn check_memory_pressure(&self, stats: &CacheStats) -> Option<SecurityEvent> {
        let usage = stats.memory_usage.percentage;
        (usage > MEMORY_PRESSURE_PERCENT).then(|| SecurityEvent::memory_pressure(usage))
    }

    // == Overflow ==
    /// Early warning once the entry count passes 95% of `max_entries`.
    pub fn check_overflow(&self, stats: &CacheStats, max_entries: usize) -> Option<SecurityEvent> {
        let limit = max_entries as f64 * OVERFLOW_WARNING_RATIO;
        (stats.entry_count as f64 > limit)
            .then(|| SecurityEvent::cache_overflow(stats.entry_count, max_entries))
    }

    // == Sweep ==
    /// Prunes every window and forgets keys with no recent accesses.
    ///
    /// Returns the number of patterns dropped.
    pub fn sweep(&mut self, now: u64) -> usize {
        let before = self.patterns.len();
        self.patterns.retain(|_, pattern| {
            pattern.prune(now);
            !pattern.timestamps.is_empty()
        });
        before - self.patterns.len()
    }

    /// Accesses of `key` currently inside the window.
    pub fn access_count(&self, key: &NormalizedKey) -> usize {
        self.patterns
            .get(key)
            .map_or(0, |pattern| pattern.timestamps.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.patterns.len()
    }

    pub fn reset(&mut self) {
        self.patterns.clear();
    }
}

/// Byte target pressure relief evicts down to.
pub fn pressure_relief_target(limit_bytes: usize) -> usize {
    limit_bytes * PRESSURE_RELIEF_PERCENT / 100
}
