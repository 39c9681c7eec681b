//! Security Check Task
//!
//! Periodically evaluates memory pressure and entry-count overflow and
//! prunes stale access-pattern windows.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheEngine;
use crate::tasks::spawn_periodic;

pub(crate) fn spawn_security_task(engine: Weak<CacheEngine>, interval: Duration) -> JoinHandle<()> {
    spawn_periodic("security_check", engine, interval, |engine| async move {
        let relieved = engine.run_security_checks().await?;
        if relieved > 0 {
            info!(evicted = relieved, "Evicted entries to relieve memory pressure");
        } else {
            debug!("Security check passed");
        }
        Ok(())
    })
}
