use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use trader_models::StorageConfig;
use trader_store::StrategyRegistry;

use crate::api;
use crate::AppState;

/// Serve the API on an already bound listener until `cancel` fires.
pub async fn serve_on(listener: TcpListener, state: AppState, cancel: CancellationToken) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!(%addr, "Claude Trader API listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("API server failed")?;

    info!("API server stopped");
    Ok(())
}

/// Bind `bind`, run the retention cleanup loop alongside the API, and stop
/// both when `cancel` fires.
pub async fn run(
    bind: &str,
    storage: &StorageConfig,
    state: AppState,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    let mut join_set = tokio::task::JoinSet::new();
    {
        let registry = Arc::clone(&state.registry);
        let retention = chrono::Duration::days(i64::from(storage.analysis_retention_days));
        let interval = Duration::from_secs(storage.cleanup_interval_seconds);
        let cancel = cancel.clone();
        join_set.spawn(async move {
            cleanup_loop(registry, retention, interval, cancel).await;
        });
    }

    let served = serve_on(listener, state, cancel.clone()).await;

    // The API may have stopped on its own; make sure background tasks follow.
    cancel.cancel();
    while join_set.join_next().await.is_some() {}
    served
}

/// Periodically drop analyses older than `retention`.
pub async fn cleanup_loop(
    registry: Arc<StrategyRegistry>,
    retention: chrono::Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Cleanup loop shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                match registry.prune(retention, Utc::now()) {
                    Ok(deleted) if deleted > 0 => {
                        info!(deleted, "Pruned old analyses");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Analysis cleanup failed");
                    }
                }
            }
        }
    }
}
