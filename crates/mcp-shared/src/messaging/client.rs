//! # Broker Facade
//!
//! Domain-level messaging client: routes task messages to stage queues,
//! publishes and waits for completion events, and carries ReAct steps.
//! Wraps a [`QueueProvider`] and an [`EventBus`]; enum dispatch throughout.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{McpError, McpResult};
use crate::types::{CompletionEvent, ReActStep, Stage, TaskMessage};

use super::events::{EventBus, EventSubscription};
use super::providers::{QueueConsumer, QueueProvider, QueueSpec, QueueStatus};
use super::router::StageRouter;

/// Connectivity snapshot across both transports.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BrokerHealth {
    pub queues_connected: bool,
    pub events_connected: bool,
}

impl BrokerHealth {
    pub fn is_healthy(&self) -> bool {
        self.queues_connected && self.events_connected
    }
}

/// Domain messaging client shared by the coordinator and every agent.
#[derive(Clone)]
pub struct Broker {
    queues: Arc<QueueProvider>,
    events: EventBus,
    router: StageRouter,
}

impl Broker {
    pub fn new(queues: QueueProvider, events: EventBus) -> Self {
        Self {
            queues: Arc::new(queues),
            events,
            router: StageRouter,
        }
    }

    /// Fully in-process broker for tests and local development.
    pub fn in_memory(queue_max_length: usize) -> Self {
        Self::new(
            QueueProvider::new_in_memory(queue_max_length),
            EventBus::new_in_memory(),
        )
    }

    pub fn router(&self) -> &StageRouter {
        &self.router
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Declare the exchange, all stage queues, the responses queue, and the
    /// dead-letter topology. Idempotent; run at startup.
    pub async fn declare_topology(&self, message_ttl_ms: u32, max_length: u32) -> McpResult<()> {
        let specs: Vec<QueueSpec> = self
            .router
            .all_queues()
            .into_iter()
            .map(|name| QueueSpec::new(name, message_ttl_ms, max_length))
            .collect();
        self.queues.declare_topology(&specs).await
    }

    // =========================================================================
    // Task dispatch
    // =========================================================================

    /// Publish a task message to its stage's queue.
    pub async fn publish_task(&self, message: &TaskMessage) -> McpResult<()> {
        let queue = self
            .router
            .stage_queue(message.stage)
            .ok_or_else(|| McpError::Messaging(format!("stage {} has no queue", message.stage)))?;

        let payload = serde_json::to_vec(message)?;
        self.queues.publish(queue, &payload).await?;

        debug!(task_id = %message.task_id, stage = %message.stage, queue = %queue, "Published task message");
        Ok(())
    }

    /// Publish raw bytes to a named queue. Operational escape hatch; normal
    /// dispatch goes through [`Broker::publish_task`].
    pub async fn publish_raw(&self, queue: &str, payload: &[u8]) -> McpResult<()> {
        self.queues.publish(queue, payload).await
    }

    /// Begin consuming a stage's queue as one competing consumer.
    pub async fn consume_stage(&self, stage: Stage) -> McpResult<QueueConsumer> {
        let queue = self
            .router
            .stage_queue(stage)
            .ok_or_else(|| McpError::Messaging(format!("stage {stage} has no queue")))?;
        self.queues.consume(queue).await
    }

    // =========================================================================
    // Completion events
    // =========================================================================

    /// Publish a stage completion on the stage's completion channel.
    pub async fn publish_completion(&self, event: &CompletionEvent) -> McpResult<()> {
        let channel = self
            .router
            .completion_channel(event.stage)
            .ok_or_else(|| McpError::Messaging(format!("stage {} has no completion channel", event.stage)))?;
        self.events
            .publish(channel, &serde_json::to_string(event)?)
            .await
    }

    /// Wait for a stage's completion event for one task. `Ok(None)` means the
    /// wait timed out; a payload that matches the task but fails to parse is
    /// a schema error.
    pub async fn wait_for_completion(
        &self,
        stage: Stage,
        task_id: Uuid,
        timeout: Duration,
    ) -> McpResult<Option<CompletionEvent>> {
        let channel = self
            .router
            .completion_channel(stage)
            .ok_or_else(|| McpError::Messaging(format!("stage {stage} has no completion channel")))?;

        match self.events.wait_for_event(channel, task_id, timeout).await? {
            None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    // =========================================================================
    // Event fan-out
    // =========================================================================

    /// Publish an agent ReAct step on the per-task ReAct channel.
    pub async fn publish_react(&self, step: &ReActStep) -> McpResult<()> {
        let channel = self.router.react_channel(step.task_id);
        self.events
            .publish(&channel, &serde_json::to_string(step)?)
            .await
    }

    /// Publish an arbitrary JSON payload on a literal channel.
    pub async fn publish_json(&self, channel: &str, payload: &JsonValue) -> McpResult<()> {
        self.events.publish(channel, &payload.to_string()).await
    }

    pub async fn subscribe(&self, channel: &str) -> McpResult<EventSubscription> {
        self.events.subscribe(channel).await
    }

    pub async fn subscribe_pattern(&self, pattern: &str) -> McpResult<EventSubscription> {
        self.events.subscribe_pattern(pattern).await
    }

    // =========================================================================
    // Observability
    // =========================================================================

    pub async fn queue_status(&self, queue: &str) -> McpResult<QueueStatus> {
        self.queues.queue_status(queue).await
    }

    /// Status of every known queue; individual failures are skipped so one
    /// bad queue does not hide the rest.
    pub async fn all_queue_statuses(&self) -> Vec<QueueStatus> {
        let mut statuses = Vec::new();
        for name in self.router.all_queues() {
            if let Ok(status) = self.queues.queue_status(name).await {
                statuses.push(status);
            }
        }
        statuses
    }

    pub async fn purge_queue(&self, queue: &str) -> McpResult<u32> {
        self.queues.purge(queue).await
    }

    pub async fn health_check(&self) -> BrokerHealth {
        BrokerHealth {
            queues_connected: self.queues.health_check().await,
            events_connected: self.events.health_check().await,
        }
    }
}
