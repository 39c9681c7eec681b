//! Key Rotation Task
//!
//! Rotates the encryption key on a fixed schedule and reseals every entry
//! under the new key.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::CacheEngine;
use crate::error::CacheError;
use crate::security::SecurityEvent;
use crate::tasks::spawn_periodic;

/// Reason attached to scheduled rotations.
pub(crate) const SCHEDULED_ROTATION: &str = "scheduled";

/// Spawns the scheduled key rotation.
///
/// A failed pass is reported as an `encryption_failure` notification and
/// retried on the next tick.
pub(crate) fn spawn_rotation_task(engine: Weak<CacheEngine>, interval: Duration) -> JoinHandle<()> {
    spawn_periodic("key_rotation", engine, interval, |engine| async move {
        match engine.rotate_keys(SCHEDULED_ROTATION).await {
            Ok(report) => {
                info!(
                    version = report.current_version,
                    migrated = report.migrated,
                    dropped = report.dropped,
                    "Scheduled key rotation complete"
                );
                Ok(())
            }
            Err(CacheError::Closed) => Err(CacheError::Closed),
            Err(err) => {
                engine.notify(SecurityEvent::encryption_failure(&err));
                Err(err)
            }
        }
    })
}
