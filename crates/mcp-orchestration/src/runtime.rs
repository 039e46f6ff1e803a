//! # Runtime
//!
//! Owns the orchestration side's long-lived workers (the ReAct forwarder
//! and the state housekeeping loops) with explicit start/stop and
//! cancellation propagation. Binaries bootstrap production backends through
//! [`McpRuntime::start`]; tests assemble in-memory components and hand them
//! to [`McpRuntime::assemble`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mcp_shared::adaptive::AdaptiveClient;
use mcp_shared::config::McpConfig;
use mcp_shared::errors::McpResult;
use mcp_shared::messaging::{Broker, EventBus, QueueProvider};
use mcp_shared::state::StateManager;
use mcp_shared::taskstore::TaskStore;

use crate::api::AppState;
use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::react_forwarder::ReActForwarder;

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct McpRuntime {
    pub coordinator: Coordinator,
    pub store: TaskStore,
    pub broker: Broker,
    pub state: StateManager,
    token: CancellationToken,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl McpRuntime {
    /// Connect every production backend, declare the broker topology, and
    /// start the background workers.
    pub async fn start(config: &McpConfig) -> McpResult<Self> {
        let store = TaskStore::connect_redis(&config.redis_url, config.task_ttl()).await?;
        let queues =
            QueueProvider::connect_amqp(&config.amqp_url, config.broker_prefetch).await?;
        let events = EventBus::connect_redis(&config.redis_url).await?;
        let broker = Broker::new(queues, events);
        broker
            .declare_topology(
                (config.task_ttl_seconds * 1000) as u32,
                config.queue_max_length,
            )
            .await?;

        let state = StateManager::connect_postgres(&config.database_url).await?;
        let adaptive = AdaptiveClient::new(&config.adaptive_url, config.adaptive_timeout())?;

        Ok(Self::assemble(store, broker, state, adaptive, config))
    }

    /// Wire pre-built components and spawn the workers. The caller chooses
    /// the backends; this is the seam the scenario tests use.
    pub fn assemble(
        store: TaskStore,
        broker: Broker,
        state: StateManager,
        adaptive: AdaptiveClient,
        config: &McpConfig,
    ) -> Self {
        let coordinator = Coordinator::new(
            store.clone(),
            broker.clone(),
            state.clone(),
            adaptive,
            CoordinatorConfig::from(config),
        );

        let token = CancellationToken::new();
        let mut workers = Vec::new();

        workers.push(
            ReActForwarder::new(broker.clone(), store.clone()).spawn(token.child_token()),
        );
        workers.extend(state.spawn_housekeeping(
            store.clone(),
            config.cleanup_retention_days,
            token.child_token(),
        ));

        info!(workers = workers.len(), "MCP runtime started");

        Self {
            coordinator,
            store,
            broker,
            state,
            token,
            workers,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.coordinator.clone(),
            self.store.clone(),
            self.broker.clone(),
            self.state.clone(),
        )
    }

    /// Cancel live executions and background workers, then wait for them
    /// with a bounded timeout.
    pub async fn stop(self) {
        info!("Stopping MCP runtime...");
        self.coordinator.cancel_all();
        self.token.cancel();

        for worker in self.workers {
            match tokio::time::timeout(STOP_TIMEOUT, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "Worker ended with panic"),
                Err(_) => warn!("Worker did not stop within timeout"),
            }
        }

        info!("MCP runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_assemble_and_stop_in_memory() {
        let config = McpConfig::default();
        let runtime = McpRuntime::assemble(
            TaskStore::new_in_memory(Duration::from_secs(600)),
            Broker::in_memory(100),
            StateManager::new_in_memory(),
            AdaptiveClient::disabled(),
            &config,
        );

        assert_eq!(runtime.coordinator.active_task_count(), 0);
        let app_state = runtime.app_state();
        assert_eq!(app_state.uptime_seconds(), 0);

        runtime.stop().await;
    }
}
