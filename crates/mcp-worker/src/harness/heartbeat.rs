//! Periodic agent health heartbeats.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mcp_shared::messaging::Broker;
use mcp_shared::state::StateManager;
use mcp_shared::types::{AgentHealthMetrics, AgentHealthStatus, Stage};

use super::HarnessStats;

/// Report liveness, resource usage, queue depth, and throughput deltas on a
/// fixed cadence. The state store accumulates the deltas.
pub(crate) fn spawn_heartbeat(
    state: StateManager,
    broker: Broker,
    agent_name: String,
    stage: Stage,
    interval: Duration,
    stats: Arc<HarnessStats>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut system = System::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; that is the startup heartbeat
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            system.refresh_cpu_usage();
            system.refresh_memory();

            let queue_size = match broker.router().stage_queue(stage) {
                Some(queue) => broker
                    .queue_status(queue)
                    .await
                    .map(|status| status.message_count)
                    .unwrap_or(0),
                None => 0,
            };

            let metrics = AgentHealthMetrics {
                cpu_usage: Some(system.global_cpu_usage() as f64),
                memory_usage: Some(system.used_memory() as f64 / (1024.0 * 1024.0)),
                queue_size,
                processed_tasks: stats.processed.swap(0, Ordering::SeqCst),
                failed_tasks: stats.failed.swap(0, Ordering::SeqCst),
            };

            if let Err(err) = state
                .update_agent_health(&agent_name, AgentHealthStatus::Healthy, Some(&metrics))
                .await
            {
                warn!(agent = %agent_name, error = %err, "Heartbeat write failed");
            } else {
                debug!(agent = %agent_name, queue_size = queue_size, "Heartbeat");
            }
        }
    })
}
