//! Security Events Module
//!
//! Outbound notifications and the sinks that consume them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// == Security Event ==
/// Notification raised by the cache for an external monitoring collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityEvent {
    /// Key generation replaced
    KeyRotation {
        timestamp: DateTime<Utc>,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        entries_processed: Option<usize>,
    },
    /// One key read or written unusually often within the last hour
    SuspiciousAccess {
        /// Fingerprint of the normalized key
        key: String,
        count: usize,
        timestamp: DateTime<Utc>,
    },
    /// Memory usage above the pressure threshold
    MemoryPressure {
        /// Percentage of the configured budget in use
        usage: f64,
        timestamp: DateTime<Utc>,
    },
    /// Entry count close to the configured maximum
    CacheOverflow {
        entries: usize,
        limit: usize,
        timestamp: DateTime<Utc>,
    },
    /// Sealing a value failed
    EncryptionFailure {
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A stored envelope failed authentication and was purged
    IntegrityFailure {
        /// Fingerprint of the normalized key
        key: String,
        timestamp: DateTime<Utc>,
    },
}

impl SecurityEvent {
    pub fn key_rotation(reason: impl Into<String>, entries_processed: Option<usize>) -> Self {
        Self::KeyRotation {
            timestamp: Utc::now(),
            reason: reason.into(),
            entries_processed,
        }
    }

    pub fn suspicious_access(key: impl fmt::Display, count: usize) -> Self {
        Self::SuspiciousAccess {
            key: key.to_string(),
            count,
            timestamp: Utc::now(),
        }
    }

    pub fn memory_pressure(usage: f64) -> Self {
        Self::MemoryPressure {
            usage,
            timestamp: Utc::now(),
        }
    }

    pub fn cache_overflow(entries: usize, limit: usize) -> Self {
        Self::CacheOverflow {
            entries,
            limit,
            timestamp: Utc::now(),
        }
    }

    pub fn encryption_failure(error: impl fmt::Display) -> Self {
        Self::EncryptionFailure {
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn integrity_failure(key: impl fmt::Display) -> Self {
        Self::IntegrityFailure {
            key: key.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Snake-case event name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeyRotation { .. } => "key_rotation",
            Self::SuspiciousAccess { .. } => "suspicious_access",
            Self::MemoryPressure { .. } => "memory_pressure",
            Self::CacheOverflow { .. } => "cache_overflow",
            Self::EncryptionFailure { .. } => "encryption_failure",
            Self::IntegrityFailure { .. } => "integrity_failure",
        }
    }
}

// == Notification Sink ==
/// Consumer of security events.
///
/// Called while cache state may be locked, so implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: SecurityEvent);
}

impl<F> NotificationSink for F
where
    F: Fn(SecurityEvent) + Send + Sync,
{
    fn notify(&self, event: SecurityEvent) {
        self(event)
    }
}

// == Channel Sink ==
/// Forwards events into a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SecurityEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SecurityEvent>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: SecurityEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!("Notification channel full, dropping {}", event.kind());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Creates a bounded channel and the sink that feeds it.
pub fn notification_channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<SecurityEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink::new(tx), rx)
}

// == Notifier ==
/// Logs every event and hands it to the subscribed sink, if any.
#[derive(Clone, Default)]
pub(crate) struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
}

impl Notifier {
    pub(crate) fn new(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self { sink }
    }

    pub(crate) fn emit(&self, event: SecurityEvent) {
        match &event {
            SecurityEvent::KeyRotation {
                reason,
                entries_processed,
                ..
            } => info!(
                reason = %reason,
                entries_processed = ?entries_processed,
                "Encryption key rotated"
            ),
            SecurityEvent::SuspiciousAccess { key, count, .. } => {
                warn!(key = %key, count, "Suspicious access pattern")
            }
            SecurityEvent::MemoryPressure { usage, .. } => {
                warn!(usage, "Cache under memory pressure")
            }
            SecurityEvent::CacheOverflow { entries, limit, .. } => {
                warn!(entries, limit, "Cache close to entry limit")
            }
            SecurityEvent::EncryptionFailure { error, .. } => {
                error!(error = %error, "Encryption failure")
            }
            SecurityEvent::IntegrityFailure { key, .. } => {
                warn!(key = %key, "Entry failed authentication and was purged")
            }
        }

        if let Some(sink) = &self.sink {
            sink.notify(event);
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribed", &self.sink.is_some())
            .finish()
    }
}
