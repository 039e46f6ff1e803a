//! # MCP Agent Worker
//!
//! Runs one stage agent as a competing consumer on its queue.
//!
//! ```bash
//! mcp-agent --agent intent
//! MCP__AMQP_URL=amqp://... mcp-agent --agent embedding
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use mcp_shared::config::McpConfig;
use mcp_shared::logging;
use mcp_shared::messaging::{Broker, EventBus, QueueProvider};
use mcp_shared::state::StateManager;
use mcp_shared::taskstore::TaskStore;
use mcp_worker::agents::{
    EmbeddingAgent, ExecutorAgent, IntentAgent, ModeratorAgent, WebSearchAgent,
};
use mcp_worker::harness::{AgentHarness, HarnessConfig, StageProcessor};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AgentKind {
    Intent,
    Embedding,
    Executor,
    Moderator,
    Websearch,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-agent", about = "Run one MCP stage agent")]
struct Args {
    /// Which stage agent to run
    #[arg(long, value_enum)]
    agent: AgentKind,
}

fn build_processor(kind: AgentKind) -> Arc<dyn StageProcessor> {
    match kind {
        AgentKind::Intent => Arc::new(IntentAgent),
        AgentKind::Embedding => Arc::new(EmbeddingAgent::with_default_corpus()),
        AgentKind::Executor => Arc::new(ExecutorAgent),
        AgentKind::Moderator => Arc::new(ModeratorAgent),
        AgentKind::Websearch => Arc::new(WebSearchAgent),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let args = Args::parse();
    let config = McpConfig::from_env()?;

    let processor = build_processor(args.agent);
    info!(
        agent = processor.agent_name(),
        stage = %processor.stage(),
        "Starting MCP agent worker..."
    );

    let store = TaskStore::connect_redis(&config.redis_url, config.task_ttl()).await?;
    let queues = QueueProvider::connect_amqp(&config.amqp_url, config.broker_prefetch).await?;
    let events = EventBus::connect_redis(&config.redis_url).await?;
    let broker = Broker::new(queues, events);
    broker
        .declare_topology(
            (config.task_ttl_seconds * 1000) as u32,
            config.queue_max_length,
        )
        .await?;
    let state = StateManager::connect_postgres(&config.database_url).await?;

    let harness = AgentHarness::new(
        broker,
        store,
        state,
        processor,
        HarnessConfig::from(&config),
    );

    let token = CancellationToken::new();
    let run_token = token.clone();
    let runner = tokio::spawn(async move { harness.run(run_token).await });

    shutdown_signal().await;
    info!("Shutdown signal received, draining...");
    token.cancel();

    match tokio::time::timeout(Duration::from_secs(30), runner).await {
        Ok(Ok(Ok(()))) => info!("Agent worker shutdown complete"),
        Ok(Ok(Err(err))) => error!(error = %err, "Agent worker exited with error"),
        Ok(Err(err)) => error!(error = %err, "Agent worker panicked"),
        Err(_) => error!("Agent worker did not drain within timeout"),
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
