//! Quake relay: WebSocket replay of upstream earthquake records.
//!
//! Optional env: HOST, PORT, WS_PATH, UPSTREAM_URL, UPSTREAM_LIMIT, UPSTREAM_TIMEOUT_SECS,
//! BROADCAST_INTERVAL_SECS, WS_OUTBOX_CAPACITY, WS_PING_INTERVAL_SECS

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use relayer::{api, config, registry, relay, upstream};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env().context("config")?;
    let config = Arc::new(config);

    let records = upstream::fetch_records(&config)
        .await
        .with_context(|| format!("fetching {}", config.upstream_url))?;
    tracing::info!("Fetched {} records", records.len());

    let registry = Arc::new(registry::ConnectionRegistry::new());
    let shutdown = CancellationToken::new();

    let broadcast =
        relay::BroadcastLoop::new(records, registry.clone(), config.broadcast_interval);
    let broadcast = tokio::spawn(broadcast.run(shutdown.clone()));

    let state = api::AppState {
        registry,
        config: config.clone(),
        shutdown: shutdown.clone(),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    tracing::info!("Relay listening on {}{}", listener.local_addr()?, config.ws_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    broadcast.await?;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels `shutdown` so socket tasks and the loop stop.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}
