//! Expired Entry Cleanup Task
//!
//! Background task that periodically removes expired cache entries, so
//! memory is reclaimed even for keys that are never read again.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheEngine;
use crate::tasks::spawn_periodic;

/// Spawns the expired-entry sweep.
///
/// # Arguments
/// * `engine` - Weak reference to the cache; the task ends once it is gone
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort it.
pub(crate) fn spawn_cleanup_task(engine: Weak<CacheEngine>, interval: Duration) -> JoinHandle<()> {
    spawn_periodic("cleanup", engine, interval, |engine| async move {
        let removed = engine.purge_expired().await?;
        if removed > 0 {
            info!(removed, "Cleanup removed expired entries");
        } else {
            debug!("Cleanup found no expired entries");
        }
        Ok(())
    })
}
