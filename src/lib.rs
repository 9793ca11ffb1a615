pub mod config;
pub mod http;
pub mod logging;
pub mod mcp_bridge;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::net::TcpListener;

use config::BridgeConfig;
use http::AppState;
use mcp_bridge::McpBridge;

/// Run the bridge until SIGINT or SIGTERM.
///
/// If draining connections and stopping the MCP server takes longer than
/// the configured grace period, the process exits with status 1.
pub async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let listener = bind(&config).await?;
    serve(listener, config, os_signal(), force_exit).await
}

async fn bind(config: &BridgeConfig) -> anyhow::Result<TcpListener> {
    let addr = config.server.bind_addr();
    match TcpListener::bind(&addr).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            Err(anyhow!("port {} is already in use", config.server.port))
        }
        Err(e) => Err(e).with_context(|| format!("failed to bind {addr}")),
    }
}

/// Serve on `listener` until `signal` resolves, then stop the MCP server.
///
/// `on_overrun` runs if shutdown is still in progress once the grace period
/// has passed.
pub async fn serve<S, F>(
    listener: TcpListener,
    config: BridgeConfig,
    signal: S,
    on_overrun: F,
) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
    F: FnOnce() + Send + 'static,
{
    let bridge = McpBridge::new(&config);
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| config.server.bind_addr());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        command = %config.process.display_command(),
        credential_configured = config.process.has_credential(),
        cache_ttl_secs = config.cache.ttl_secs,
        pid = std::process::id(),
        "=== CRM MCP bridge listening ==="
    );
    if !config.process.has_credential() {
        tracing::warn!(
            vars = ?config.process.credential_vars,
            "no CRM access token found; the MCP server will start without one"
        );
    }

    if config.process.eager_start {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge.start().await {
                tracing::warn!(error = %e, "eager start failed; will retry on first call");
            }
        });
    }

    let app = http::build_router(Arc::new(AppState::new(bridge.clone())));
    let shutdown = shutdown_after(signal, config.server.shutdown_grace(), on_overrun);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    bridge.shutdown().await;
    tracing::info!("=== CRM MCP bridge stopped ===");
    Ok(())
}

/// Resolve once `signal` does, arming a watchdog that calls `on_overrun`
/// after `grace`.
async fn shutdown_after<S, F>(signal: S, grace: Duration, on_overrun: F)
where
    S: Future<Output = ()>,
    F: FnOnce() + Send + 'static,
{
    signal.await;

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::error!(grace_ms = grace.as_millis() as u64, "graceful shutdown timed out");
        on_overrun();
    });
}

fn force_exit() {
    std::process::exit(1);
}

async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
