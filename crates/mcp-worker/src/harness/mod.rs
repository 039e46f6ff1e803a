//! # Agent Harness
//!
//! The shared worker lifecycle every agent embeds. Per delivery:
//!
//! 1. deserialize; a malformed message goes straight to the dead letter queue
//! 2. emit the stage-start ReAct step
//! 3. run the agent's `process` under the per-message timeout
//! 4. write the structured result to the stage-result key
//! 5. publish the completion event (the coordinator is waiting on it)
//! 6. record a performance sample
//! 7. acknowledge; failures negatively acknowledge: requeue on the first
//!    attempt, dead-letter on redelivery
//!
//! An aborted task's in-flight `process` is not interrupted; its completion
//! event lands on a channel nobody is waiting on and its result is never
//! integrated.

pub mod context;
pub mod heartbeat;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mcp_shared::config::McpConfig;
use mcp_shared::errors::{McpError, McpResult};
use mcp_shared::messaging::{Broker, QueueDelivery};
use mcp_shared::state::StateManager;
use mcp_shared::taskstore::TaskStore;
use mcp_shared::types::{
    AgentHealthStatus, AgentPerformanceSample, CompletionEvent, Stage, StageResult, StepKind,
    TaskMessage,
};

pub use context::ReactEmitter;

/// The one seam an agent implements.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// Stable agent identity carried on ReAct steps and telemetry.
    fn agent_name(&self) -> &str;

    /// The stage (and therefore queue) this agent serves.
    fn stage(&self) -> Stage;

    /// Do the work. Emit `thought`/`action`/`observation` steps through the
    /// emitter as reasoning unfolds; the harness emits the terminal
    /// `final_answer`/`error` step itself.
    async fn process(
        &self,
        message: &TaskMessage,
        react: &ReactEmitter,
    ) -> McpResult<StageResult>;
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Bound on one `process` call
    pub process_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            process_timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl From<&McpConfig> for HarnessConfig {
    fn from(config: &McpConfig) -> Self {
        Self {
            process_timeout: config.process_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

#[derive(Debug, Default)]
pub struct HarnessStats {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
}

pub struct AgentHarness {
    broker: Broker,
    store: TaskStore,
    state: StateManager,
    processor: Arc<dyn StageProcessor>,
    config: HarnessConfig,
    stats: Arc<HarnessStats>,
}

impl AgentHarness {
    pub fn new(
        broker: Broker,
        store: TaskStore,
        state: StateManager,
        processor: Arc<dyn StageProcessor>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            broker,
            store,
            state,
            processor,
            config,
            stats: Arc::new(HarnessStats::default()),
        }
    }

    pub fn stats(&self) -> &Arc<HarnessStats> {
        &self.stats
    }

    /// Consume the stage queue until cancelled.
    pub async fn run(&self, token: CancellationToken) -> McpResult<()> {
        let agent = self.processor.agent_name().to_string();
        let stage = self.processor.stage();

        if let Err(err) = self
            .state
            .update_agent_health(&agent, AgentHealthStatus::Starting, None)
            .await
        {
            warn!(agent = %agent, error = %err, "Startup health report failed");
        }

        let heartbeat = heartbeat::spawn_heartbeat(
            self.state.clone(),
            self.broker.clone(),
            agent.clone(),
            stage,
            self.config.heartbeat_interval,
            self.stats.clone(),
            token.child_token(),
        );

        let mut consumer = self.broker.consume_stage(stage).await?;
        info!(agent = %agent, stage = %stage, "Agent consuming");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                delivery = consumer.next() => match delivery {
                    Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                    Some(Err(err)) => {
                        error!(agent = %agent, error = %err, "Consumer error");
                    }
                    None => {
                        warn!(agent = %agent, "Consumer cancelled by broker");
                        break;
                    }
                }
            }
        }

        heartbeat.abort();
        if let Err(err) = self
            .state
            .update_agent_health(&agent, AgentHealthStatus::Stopping, None)
            .await
        {
            warn!(agent = %agent, error = %err, "Shutdown health report failed");
        }
        info!(agent = %agent, "Agent stopped");
        Ok(())
    }

    async fn handle_delivery(&self, delivery: QueueDelivery) {
        let agent = self.processor.agent_name().to_string();
        let stage = self.processor.stage();

        let message: TaskMessage = match serde_json::from_slice(&delivery.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(agent = %agent, error = %err, "Malformed task message, dead-lettering");
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                if let Err(err) = delivery.nack(false).await {
                    error!(agent = %agent, error = %err, "Dead-letter nack failed");
                }
                return;
            }
        };
        if message.stage != stage {
            warn!(
                agent = %agent,
                expected = %stage,
                got = %message.stage,
                "Task message for the wrong stage, dead-lettering"
            );
            self.stats.failed.fetch_add(1, Ordering::SeqCst);
            let _ = delivery.nack(false).await;
            return;
        }

        let react = ReactEmitter::new(self.broker.clone(), agent.clone(), message.task_id);
        react
            .emit(StepKind::Thought, format!("Starting {stage}"))
            .await;

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.process_timeout,
            self.processor.process(&message, &react),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => {
                // Result first, completion second: the coordinator reads
                // the result key the moment the completion event arrives
                if let Err(err) = self.store.put_stage_result(message.task_id, &result).await {
                    self.finish_failure(&message, delivery, &react, started, err.to_string(), true)
                        .await;
                    return;
                }

                react
                    .emit(StepKind::FinalAnswer, format!("{stage} complete"))
                    .await;

                let completion =
                    CompletionEvent::success(message.task_id, stage, format!("{stage} complete"));
                if let Err(err) = self.broker.publish_completion(&completion).await {
                    error!(task_id = %message.task_id, error = %err, "Completion publish failed");
                }

                self.record_sample(&message, started, true, None).await;
                self.stats.processed.fetch_add(1, Ordering::SeqCst);

                if let Err(err) = delivery.ack().await {
                    error!(task_id = %message.task_id, error = %err, "Ack failed");
                }
                info!(
                    task_id = %message.task_id,
                    agent = %agent,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Stage processed"
                );
            }
            Ok(Err(err)) => {
                let transient = err.is_transient();
                self.finish_failure(&message, delivery, &react, started, err.to_string(), transient)
                    .await;
            }
            Err(_) => {
                let reason = McpError::Processing(format!(
                    "processing exceeded {}s",
                    self.config.process_timeout.as_secs()
                ))
                .to_string();
                self.finish_failure(&message, delivery, &react, started, reason, true)
                    .await;
            }
        }
    }

    async fn finish_failure(
        &self,
        message: &TaskMessage,
        delivery: QueueDelivery,
        react: &ReactEmitter,
        started: Instant,
        reason: String,
        transient: bool,
    ) {
        let stage = self.processor.stage();
        warn!(
            task_id = %message.task_id,
            agent = %self.processor.agent_name(),
            reason = %reason,
            "Stage processing failed"
        );

        react.emit(StepKind::Error, reason.clone()).await;

        let completion =
            CompletionEvent::failure(message.task_id, stage, reason.clone(), transient);
        if let Err(err) = self.broker.publish_completion(&completion).await {
            error!(task_id = %message.task_id, error = %err, "Failure completion publish failed");
        }

        self.record_sample(message, started, false, Some(reason)).await;
        self.stats.failed.fetch_add(1, Ordering::SeqCst);

        // First failure requeues; a redelivered message dead-letters
        let requeue = !delivery.redelivered;
        if let Err(err) = delivery.nack(requeue).await {
            error!(task_id = %message.task_id, error = %err, "Nack failed");
        }
    }

    async fn record_sample(
        &self,
        message: &TaskMessage,
        started: Instant,
        success: bool,
        error_message: Option<String>,
    ) {
        let sample = AgentPerformanceSample {
            agent_name: self.processor.agent_name().to_string(),
            task_id: message.task_id,
            stage: self.processor.stage(),
            duration_ms: started.elapsed().as_millis() as i64,
            success,
            error_message,
            metadata: None,
        };
        if let Err(err) = self.state.record_agent_performance(&sample).await {
            warn!(task_id = %message.task_id, error = %err, "Performance sample write failed");
        }
    }
}
