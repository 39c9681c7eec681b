//! Secure Cache - standalone host process
//!
//! Starts a cache from environment configuration, runs maintenance in the
//! background and logs security notifications until asked to stop.

use anyhow::{ensure, Context};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use secure_cache::{Config, SecureCache, SecurityEvent, SetOptions};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and start maintenance
/// 4. Run a round-trip self-check
/// 5. Wait for SIGINT/SIGTERM, then wipe the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secure_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Secure Cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_size={}MB, max_entries={}, default_ttl={}ms, key_source={:?}",
        config.max_size_mb, config.max_entries, config.default_ttl_ms, config.key_source
    );

    let cache = SecureCache::builder(config)
        .notify(|event: SecurityEvent| {
            if let Ok(json) = serde_json::to_string(&event) {
                info!(target: "secure_cache::notifications", "{}", json);
            }
        })
        .build()
        .context("failed to start cache")?;

    self_check(&cache).await?;
    info!("Self-check passed, cache ready");

    shutdown_signal().await;

    let stats = cache.stats().await?;
    info!(
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        "Final statistics"
    );
    cache.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Writes, reads back and deletes a probe entry.
async fn self_check(cache: &SecureCache) -> anyhow::Result<()> {
    const PROBE_KEY: &str = "__secure_cache_self_check__";

    let stored = cache
        .set(PROBE_KEY, "ok", SetOptions::new().ttl_ms(1_000))
        .await
        .context("self-check write failed")?;
    ensure!(stored, "self-check value was not stored");
    let value: Option<String> = cache
        .get(PROBE_KEY)
        .await
        .context("self-check read failed")?;
    ensure!(value.as_deref() == Some("ok"), "self-check read back {:?}", value);
    cache.delete(PROBE_KEY).await?;
    cache.clear().await?;
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
