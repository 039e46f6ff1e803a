//! Tracing initialization shared by the server and worker binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; defaults to `info` for the mcp crates and `warn`
/// elsewhere. Set `MCP_LOG_JSON=1` for JSON output (container deployments).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,mcp_shared=info,mcp_orchestration=info,mcp_worker=info")
    });

    let json = std::env::var("MCP_LOG_JSON").map(|v| v == "1").unwrap_or(false);

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    }
}
