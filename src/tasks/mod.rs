//! Background Tasks Module
//!
//! Periodic maintenance that runs while a cache is open.
//!
//! # Tasks
//! - Cleanup: Removes expired entries
//! - Rotation: Rotates the encryption key and reseals every entry
//! - Security: Memory-pressure and overflow checks

mod cleanup;
mod rotation;
mod security;

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::CacheEngine;
use crate::config::Config;
use crate::error::{CacheError, Result};

pub(crate) use cleanup::spawn_cleanup_task;
pub(crate) use rotation::spawn_rotation_task;
pub(crate) use security::spawn_security_task;

// == Maintenance Scheduler ==
/// Owns the handles of the periodic tasks attached to one cache.
///
/// Tasks hold only a weak reference to the cache, so they wind down on
/// their own once it is dropped. `stop` aborts them immediately.
#[derive(Debug, Default)]
pub struct MaintenanceScheduler {
    handles: Vec<JoinHandle<()>>,
}

impl MaintenanceScheduler {
    /// Starts the cleanup, rotation and security tasks on the current runtime.
    pub(crate) fn start(engine: &Arc<CacheEngine>, config: &Config) -> Self {
        let handles = vec![
            spawn_cleanup_task(
                Arc::downgrade(engine),
                Duration::from_millis(config.cleanup_interval_ms),
            ),
            spawn_rotation_task(
                Arc::downgrade(engine),
                Duration::from_millis(config.key_rotation_interval_ms),
            ),
            spawn_security_task(
                Arc::downgrade(engine),
                Duration::from_millis(config.security_check_interval_ms),
            ),
        ];
        Self { handles }
    }

    /// A scheduler with no tasks, for caches driven manually.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }

    /// Aborts every task. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        debug!("Maintenance tasks aborted");
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// == Periodic Runner ==
/// Runs `tick` every `interval` until the cache is dropped or closed.
///
/// Each tick runs in its own task, so a panic is logged and the schedule
/// carries on.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    engine: Weak<CacheEngine>,
    interval: Duration,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<CacheEngine>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        info!(
            task = name,
            interval_ms = interval.as_millis() as u64,
            "Starting maintenance task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let Some(engine) = engine.upgrade() else {
                break;
            };

            match tokio::spawn(tick(engine)).await {
                Ok(Ok(())) => {}
                Ok(Err(CacheError::Closed)) => break,
                Ok(Err(err)) => warn!(task = name, error = %err, "Maintenance run failed"),
                Err(join_err) => {
                    error!(task = name, error = %join_err, "Maintenance run panicked")
                }
            }
        }

        debug!(task = name, "Maintenance task stopped");
    })
}
