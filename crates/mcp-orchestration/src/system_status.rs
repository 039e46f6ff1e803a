//! System status aggregation for the control API.
//!
//! Each infrastructure probe runs under its own short timeout and a failed
//! probe marks the component down instead of erroring; this endpoint never
//! throws, it degrades.

use std::time::Duration;

use serde::Serialize;

use mcp_shared::messaging::Broker;
use mcp_shared::state::{AgentHealthRow, StateManager};
use mcp_shared::taskstore::TaskStore;

use crate::coordinator::Coordinator;

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
pub struct McpInfo {
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub active_tasks: usize,
}

#[derive(Debug, Serialize)]
pub struct CoreServices {
    pub coordinator: &'static str,
    pub state_manager: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Infrastructure {
    pub broker_queues: bool,
    pub broker_events: bool,
    pub task_store: bool,
    pub database: bool,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub mcp: McpInfo,
    pub core_services: CoreServices,
    pub infrastructure: Infrastructure,
    pub agents: Vec<AgentHealthRow>,
    pub overall_health: &'static str,
}

async fn probe<F>(check: F) -> bool
where
    F: std::future::Future<Output = bool>,
{
    tokio::time::timeout(PROBE_TIMEOUT, check)
        .await
        .unwrap_or(false)
}

pub async fn collect(
    coordinator: &Coordinator,
    broker: &Broker,
    store: &TaskStore,
    state: &StateManager,
    uptime_seconds: u64,
) -> SystemStatus {
    let broker_health = tokio::time::timeout(PROBE_TIMEOUT, broker.health_check()).await;
    let (broker_queues, broker_events) = match broker_health {
        Ok(health) => (health.queues_connected, health.events_connected),
        Err(_) => (false, false),
    };
    let task_store = probe(store.ping()).await;
    let database = probe(state.ping()).await;

    let agents = match tokio::time::timeout(PROBE_TIMEOUT, state.get_agent_performance_summary(1))
        .await
    {
        Ok(Ok(summary)) => summary.agent_health,
        _ => Vec::new(),
    };

    let infrastructure = Infrastructure {
        broker_queues,
        broker_events,
        task_store,
        database,
    };
    let up = [broker_queues, broker_events, task_store, database];
    let overall_health = if up.iter().all(|ok| *ok) {
        "healthy"
    } else if up.iter().any(|ok| *ok) {
        "degraded"
    } else {
        "unhealthy"
    };

    SystemStatus {
        mcp: McpInfo {
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds,
            active_tasks: coordinator.active_task_count(),
        },
        core_services: CoreServices {
            coordinator: "running",
            state_manager: if database { "connected" } else { "degraded" },
        },
        infrastructure,
        agents,
        overall_health,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_shared::adaptive::AdaptiveClient;
    use mcp_shared::taskstore::TaskStore;

    #[tokio::test]
    async fn test_in_memory_stack_reports_healthy() {
        let store = TaskStore::new_in_memory(Duration::from_secs(600));
        let broker = Broker::in_memory(100);
        let state = StateManager::new_in_memory();
        let coordinator = Coordinator::new(
            store.clone(),
            broker.clone(),
            state.clone(),
            AdaptiveClient::disabled(),
            Default::default(),
        );

        let status = collect(&coordinator, &broker, &store, &state, 12).await;

        assert_eq!(status.overall_health, "healthy");
        assert!(status.infrastructure.task_store);
        assert!(status.infrastructure.database);
        assert_eq!(status.mcp.uptime_seconds, 12);
        assert_eq!(status.mcp.active_tasks, 0);
        assert_eq!(status.core_services.coordinator, "running");
    }
}
