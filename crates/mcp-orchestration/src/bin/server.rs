//! # MCP Orchestration Server
//!
//! Production entrypoint: boots the runtime against Redis, RabbitMQ, and
//! Postgres, serves the control API, and shuts down gracefully on
//! Ctrl+C/SIGTERM.

use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use mcp_orchestration::api;
use mcp_orchestration::runtime::McpRuntime;
use mcp_shared::config::McpConfig;
use mcp_shared::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    info!("Starting MCP Orchestration Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let config = McpConfig::from_env()?;
    let runtime = McpRuntime::start(&config).await?;

    let app = api::router(runtime.app_state());
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("   Control API: http://{}", config.bind_address);
    info!("   Press Ctrl+C to shutdown gracefully");

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = serve.await {
        error!(error = %err, "Control API server error");
    }

    info!("Shutdown signal received, stopping runtime...");
    match tokio::time::timeout(Duration::from_secs(30), runtime.stop()).await {
        Ok(()) => info!("MCP server shutdown complete"),
        Err(_) => error!("Graceful shutdown timed out, forcing exit"),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
