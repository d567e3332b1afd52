//! keepalive -- keeps idle web services awake.
//!
//! Every monitored URL gets its own perpetual task that pings it, records
//! the outcome in a bounded history, then sleeps for the URL's interval. A
//! small JSON API exposes the history, the monitored sites and uptime, and
//! accepts new sites at runtime.

pub mod api;
pub mod config;
pub mod fetch;
pub mod history;
pub mod registry;
pub mod scheduler;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::state::{AppState, Uptime};
use crate::config::KeepAliveConfig;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::history::HistoryLog;
use crate::registry::SiteRegistry;
use crate::scheduler::Scheduler;

/// Wire registry, history and scheduler together. Nothing is started yet.
pub fn build_state(config: &KeepAliveConfig, fetcher: Arc<dyn Fetcher>) -> AppState {
    let registry = SiteRegistry::with_targets(config.sites.iter().cloned().map(Into::into));
    let history = HistoryLog::new(config.history.capacity);
    let scheduler = Scheduler::new(fetcher, history.clone());

    AppState {
        registry,
        history,
        scheduler,
        uptime: Uptime::start(),
    }
}

/// Start the keep-alive daemon: scheduler tasks plus the API server.
///
/// Returns after a shutdown signal, once the server has drained and every
/// keep-alive task has stopped.
pub async fn serve(config: KeepAliveConfig) -> Result<()> {
    let fetcher = Arc::new(HttpFetcher::from_config(&config.fetch)?);
    let state = build_state(&config, fetcher);

    // 1. One task per startup site
    let started = state.scheduler.start(&state.registry)?;
    tracing::info!(sites = started, "Keep-alive tasks running");

    // 2. API server
    let bind = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!(addr = %listener.local_addr()?, "keepalive listening");

    let app = api::router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    // 3. Stop the tasks
    state.scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
