//! cache_gate - Redis-backed cache-aside layer with admission control
//!
//! Connects to the configured store and serves the admin surface.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_gate::connection::Connector;
use cache_gate::{
    create_router, spawn_cleanup_task, spawn_connection_monitor, AppState, BackendKind, Config,
    ConnectionManager, MemoryConnector, RedisConnector,
};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect to the store, aborting once retries are exhausted
/// 4. Start the connection monitor and, for the memory backend, the TTL sweep
/// 5. Serve the admin router until SIGINT/SIGTERM or connection exhaustion
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_gate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cache_gate");

    let config = Config::from_env();
    info!(
        backend = ?config.backend,
        port = config.server_port,
        default_ttl = config.ttl.default,
        rate_limit_mode = ?config.rate_limit_mode,
        "Configuration loaded"
    );

    let mut background: Vec<JoinHandle<()>> = Vec::new();
    let connector: Arc<dyn Connector> = match config.backend {
        BackendKind::Redis => Arc::new(
            RedisConnector::new(
                &config.redis_url,
                config.redis_password.as_deref(),
                config.connect_timeout,
                config.command_timeout,
            )
            .context("invalid Redis configuration")?,
        ),
        BackendKind::Memory => {
            let connector = MemoryConnector::new();
            background.push(spawn_cleanup_task(
                connector.store(),
                config.cleanup_interval,
            ));
            Arc::new(connector)
        }
    };

    let manager = ConnectionManager::new(connector, config.backoff);
    let monitor = spawn_connection_monitor(manager.subscribe());
    manager
        .connect()
        .await
        .context("could not connect to the store")?;

    let app = create_router(AppState::new(Arc::clone(&manager), &config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(monitor))
    .await
    .context("server error")?;

    for handle in background {
        handle.abort();
    }
    manager.disconnect();
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C, SIGTERM, or the store connection being given up on.
async fn shutdown_signal(monitor: JoinHandle<Option<u32>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
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
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let exhausted = async {
        match monitor.await {
            Ok(Some(attempts)) => {
                warn!(attempts, "Store unreachable, shutting down");
            }
            // monitor ended without exhaustion: keep serving
            _ => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
        _ = exhausted => {}
    }
}
