//! # Coordinator
//!
//! DAG execution engine. One spawned execution per task runs the plan's
//! stages sequentially: publish the stage's task message, wait on the
//! stage's completion channel with a timeout, integrate the stage result,
//! advance. The terminal packaging stage runs inline.
//!
//! The task record is owned exclusively by the coordinator while the task
//! is in progress; agents communicate only through stage-result keys and
//! completion events. Completion events arriving after a terminal state are
//! ignored: nothing is waiting on them and terminal states are never
//! transitioned away from.

pub mod integration;
pub mod packaging;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use mcp_shared::adaptive::AdaptiveClient;
use mcp_shared::config::{McpConfig, StagePolicy};
use mcp_shared::errors::{McpError, McpResult};
use mcp_shared::messaging::Broker;
use mcp_shared::resilience::{retry, RetryPolicy};
use mcp_shared::state::StateManager;
use mcp_shared::taskstore::TaskStore;
use mcp_shared::types::{
    CompletionEvent, ProgressEvent, Stage, TaskMessage, TaskRecord, TaskStatus, TemplateRegistry,
};

/// Request to create and execute one task.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub user_id: String,
    pub query: String,
    pub template: Option<String>,
    pub conversation_id: Option<String>,
}

/// Coordinator tuning. Defaults match the recognized configuration options.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub stage_timeout: Duration,
    pub stage_policy: StagePolicy,
    pub default_template: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(300),
            stage_policy: StagePolicy::default(),
            default_template: "standard_query".to_string(),
        }
    }
}

impl From<&McpConfig> for CoordinatorConfig {
    fn from(config: &McpConfig) -> Self {
        Self {
            stage_timeout: config.stage_timeout(),
            stage_policy: config.stage_policy,
            default_template: config.dag_default_template.clone(),
        }
    }
}

/// Outcome of driving one stage to a verdict, retries included.
enum StageOutcome {
    Success,
    TimedOut,
    Failed(String),
    Cancelled,
}

struct CoordinatorInner {
    store: TaskStore,
    broker: Broker,
    state: StateManager,
    adaptive: AdaptiveClient,
    templates: TemplateRegistry,
    config: CoordinatorConfig,
    /// Live executions; holding the token cancels the run
    active: DashMap<Uuid, CancellationToken>,
}

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    pub fn new(
        store: TaskStore,
        broker: Broker,
        state: StateManager,
        adaptive: AdaptiveClient,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                broker,
                state,
                adaptive,
                templates: TemplateRegistry::builtin(),
                config,
                active: DashMap::new(),
            }),
        }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.inner.templates
    }

    pub fn active_task_count(&self) -> usize {
        self.inner.active.len()
    }

    /// Select the template, fetch adaptive recommendations (defaults on
    /// failure), create the task record, and spawn its execution.
    pub async fn create_and_execute(&self, request: TaskRequest) -> McpResult<TaskRecord> {
        let template_name = request
            .template
            .clone()
            .unwrap_or_else(|| self.inner.config.default_template.clone());
        let template = self
            .inner
            .templates
            .get(&template_name)
            .ok_or_else(|| McpError::TemplateNotFound(template_name.clone()))?
            .clone();

        // Bounded by the client's own timeout; never blocks task creation
        let recommendations = self
            .inner
            .adaptive
            .get_recommendations(&request.user_id, &request.query, &[])
            .await;

        let record = self
            .inner
            .store
            .create_task(
                &request.user_id,
                &request.query,
                template.stages.clone(),
                &template_name,
            )
            .await?;
        self.inner
            .store
            .put_recommendations(record.task_id, &recommendations)
            .await?;

        if let Err(err) = self.inner.state.persist_task_start(&record).await {
            // The reconciler backfills the durable row
            warn!(task_id = %record.task_id, error = %err, "Deferred durable persist of task start");
        }

        self.inner
            .store
            .emit_progress(ProgressEvent {
                task_id: record.task_id,
                stage: "created".to_string(),
                message: format!("Task created with {} stages", template.stages.len()),
                timestamp: Utc::now(),
                metadata: Some(json!({
                    "template": template_name,
                    "estimated_duration_ms": template.estimated_duration_ms,
                    "stage_count": template.stages.len(),
                    "conversation_id": request.conversation_id,
                })),
                progress: Some(0),
            })
            .await?;

        let token = CancellationToken::new();
        self.inner.active.insert(record.task_id, token.clone());
        let inner = self.inner.clone();
        let task_id = record.task_id;
        tokio::spawn(async move {
            if let Err(err) = execute_dag(&inner, task_id, &token).await {
                error!(task_id = %task_id, error = %err, "Task execution error");
                let _ = fail_task(&inner, task_id, err.to_string()).await;
            }
            inner.active.remove(&task_id);
        });

        info!(
            task_id = %record.task_id,
            user_id = %request.user_id,
            template = %template_name,
            "Created and started task"
        );
        Ok(record)
    }

    pub async fn get_task_status(&self, task_id: Uuid) -> McpResult<Option<TaskRecord>> {
        self.inner.store.get_task(task_id).await
    }

    /// Abort a running task. Idempotent: aborting a task already in a
    /// terminal state returns that state unchanged.
    pub async fn abort_task(&self, task_id: Uuid) -> McpResult<TaskRecord> {
        let record = self
            .inner
            .store
            .get_task(task_id)
            .await?
            .ok_or(McpError::TaskNotFound(task_id))?;

        if record.status.is_terminal() {
            return Ok(record);
        }

        if let Some((_, token)) = self.inner.active.remove(&task_id) {
            token.cancel();
        }

        let updated = self
            .inner
            .store
            .update_task(task_id, |task| {
                if task.status != TaskStatus::InProgress {
                    return;
                }
                task.status = TaskStatus::Aborted;
                task.current_stage = None;
            })
            .await?;
        if updated.status != TaskStatus::Aborted {
            return Ok(updated);
        }

        self.inner
            .store
            .emit_progress(ProgressEvent {
                task_id,
                stage: "aborted".to_string(),
                message: "Task aborted by user".to_string(),
                timestamp: Utc::now(),
                metadata: Some(json!({"action": "abort"})),
                progress: Some(updated.progress_percentage),
            })
            .await?;
        if let Err(err) = self.inner.state.update_task_state(&updated).await {
            warn!(task_id = %task_id, error = %err, "Deferred durable persist of abort");
        }

        info!(task_id = %task_id, "Task aborted");
        Ok(updated)
    }

    /// Cancel every live execution; used during shutdown.
    pub fn cancel_all(&self) {
        for entry in self.inner.active.iter() {
            entry.value().cancel();
        }
        self.inner.active.clear();
    }
}

/// Run one task's plan to a terminal state.
async fn execute_dag(
    inner: &Arc<CoordinatorInner>,
    task_id: Uuid,
    token: &CancellationToken,
) -> McpResult<()> {
    loop {
        if token.is_cancelled() {
            return Ok(());
        }

        let record = inner
            .store
            .get_task(task_id)
            .await?
            .ok_or(McpError::TaskNotFound(task_id))?;
        if record.status != TaskStatus::InProgress {
            return Ok(());
        }
        let Some(stage) = record.current_stage else {
            return Ok(());
        };

        inner
            .store
            .emit_progress(ProgressEvent {
                task_id,
                stage: stage.as_str().to_string(),
                message: format!("Starting {stage}"),
                timestamp: Utc::now(),
                metadata: Some(json!({"action": "stage_start"})),
                progress: None,
            })
            .await?;
        let _ = inner
            .state
            .log_stage_event(task_id, stage.as_str(), "start", &format!("Starting {stage}"), None)
            .await;

        if stage.is_packaging() {
            packaging::package_response(&inner.store, &inner.broker, &inner.state, task_id)
                .await?;
            return Ok(());
        }

        match run_stage(inner, &record, stage, token).await? {
            StageOutcome::Success => {
                integrate_stage(inner, task_id, stage).await?;
                advance(inner, task_id, stage).await?;
            }
            StageOutcome::TimedOut => {
                let reason = McpError::StageTimeout { stage }.to_string();
                let _ = inner
                    .state
                    .log_stage_event(task_id, stage.as_str(), "timeout", &reason, None)
                    .await;
                fail_task(inner, task_id, reason).await?;
                return Ok(());
            }
            StageOutcome::Failed(reason) => {
                let _ = inner
                    .state
                    .log_stage_event(task_id, stage.as_str(), "fail", &reason, None)
                    .await;
                fail_task(inner, task_id, reason).await?;
                return Ok(());
            }
            StageOutcome::Cancelled => return Ok(()),
        }
    }
}

/// Dispatch one stage and wait for its verdict, applying the retry policy:
/// timeouts and transient-tagged failures retry up to `timeout_retries`,
/// plain negative completions up to `failure_retries` (zero by default).
async fn run_stage(
    inner: &Arc<CoordinatorInner>,
    record: &TaskRecord,
    stage: Stage,
    token: &CancellationToken,
) -> McpResult<StageOutcome> {
    let policy = inner.config.stage_policy;
    let mut timeout_attempts = 0u32;
    let mut failure_attempts = 0u32;

    loop {
        dispatch_stage(inner, record, stage).await?;

        let completion = tokio::select! {
            _ = token.cancelled() => return Ok(StageOutcome::Cancelled),
            completion = inner.broker.wait_for_completion(
                stage,
                record.task_id,
                inner.config.stage_timeout,
            ) => completion?,
        };

        match completion {
            None => {
                if timeout_attempts < policy.timeout_retries {
                    timeout_attempts += 1;
                    warn!(
                        task_id = %record.task_id,
                        stage = %stage,
                        attempt = timeout_attempts,
                        "Stage timed out, retrying"
                    );
                    let _ = inner
                        .state
                        .log_stage_event(
                            record.task_id,
                            stage.as_str(),
                            "retry",
                            "Stage timed out, retrying",
                            None,
                        )
                        .await;
                    continue;
                }
                return Ok(StageOutcome::TimedOut);
            }
            Some(CompletionEvent { success: true, .. }) => {
                info!(task_id = %record.task_id, stage = %stage, "Stage completed");
                return Ok(StageOutcome::Success);
            }
            Some(event) => {
                let reason = event
                    .error
                    .unwrap_or_else(|| format!("stage '{stage}' reported failure"));
                let budget = if event.transient {
                    // Transient failures share the timeout retry budget
                    &mut timeout_attempts
                } else {
                    &mut failure_attempts
                };
                let allowed = if event.transient {
                    policy.timeout_retries
                } else {
                    policy.failure_retries
                };
                if *budget < allowed {
                    *budget += 1;
                    warn!(
                        task_id = %record.task_id,
                        stage = %stage,
                        reason = %reason,
                        "Stage failed with retryable error, retrying"
                    );
                    continue;
                }
                return Ok(StageOutcome::Failed(reason));
            }
        }
    }
}

/// Build the stage's task message, including the adaptive recommendations
/// so agents can personalize, and publish it durably.
async fn dispatch_stage(
    inner: &Arc<CoordinatorInner>,
    record: &TaskRecord,
    stage: Stage,
) -> McpResult<()> {
    let recommendations = inner
        .store
        .get_recommendations(record.task_id)
        .await?
        .unwrap_or_default();

    let message = TaskMessage {
        task_id: record.task_id,
        stage,
        query: record.query.clone(),
        user_id: record.user_id.clone(),
        context: record.context.clone(),
        vector_hits: record.vector_hits.clone(),
        template: record.template.clone(),
        adaptive_recommendations: recommendations,
        timestamp: Utc::now(),
    };

    // Transient publish errors retry with backoff; a queue-overflow
    // rejection is not transient and fails the stage immediately.
    retry(RetryPolicy::default(), "publish_task", || {
        let broker = inner.broker.clone();
        let message = message.clone();
        async move { broker.publish_task(&message).await }
    })
    .await
}

/// Read the agent's stage result and fold it into the record.
async fn integrate_stage(
    inner: &Arc<CoordinatorInner>,
    task_id: Uuid,
    stage: Stage,
) -> McpResult<()> {
    let result = inner
        .store
        .get_stage_result(task_id, stage)
        .await?
        .ok_or_else(|| McpError::StageFailed {
            stage,
            reason: "completion event without a stage result".to_string(),
        })?;

    inner
        .store
        .update_task(task_id, |record| {
            // Terminal states are never written over (abort racing a stage)
            if record.status == TaskStatus::InProgress {
                integration::integrate(record, &result);
            }
        })
        .await?;
    Ok(())
}

/// DAG advancement: append the finished stage, move to the next one (or
/// null at the end of the plan), recompute progress, persist, announce.
async fn advance(inner: &Arc<CoordinatorInner>, task_id: Uuid, finished: Stage) -> McpResult<()> {
    let updated = inner
        .store
        .update_task(task_id, |record| {
            if record.status != TaskStatus::InProgress {
                return;
            }
            record.completed_stages.push(finished);
            let next = record
                .plan
                .iter()
                .position(|stage| *stage == finished)
                .map(|index| index + 1)
                .filter(|index| *index < record.plan.len())
                .map(|index| record.plan[index]);
            record.current_stage = next;
            record.progress_percentage = record.computed_progress();
        })
        .await?;
    if updated.status != TaskStatus::InProgress {
        // The task went terminal underneath us; nothing to announce
        return Ok(());
    }

    let next_label = updated
        .current_stage
        .map(|stage| stage.as_str().to_string())
        .unwrap_or_else(|| "none".to_string());

    inner
        .store
        .emit_progress(ProgressEvent {
            task_id,
            stage: "transition".to_string(),
            message: format!("Completed '{finished}', moving to '{next_label}'"),
            timestamp: Utc::now(),
            metadata: Some(json!({
                "completed_stage": finished.as_str(),
                "next_stage": updated.current_stage.map(|s| s.as_str()),
                "progress_percentage": updated.progress_percentage,
            })),
            progress: Some(updated.progress_percentage),
        })
        .await?;

    let _ = inner
        .state
        .log_stage_event(
            task_id,
            finished.as_str(),
            "complete",
            &format!("Completed '{finished}'"),
            None,
        )
        .await;
    if let Err(err) = inner.state.update_task_state(&updated).await {
        warn!(task_id = %task_id, error = %err, "Deferred durable persist of advancement");
    }

    Ok(())
}

/// Move the task to `failed`, never touching an already-terminal record.
async fn fail_task(
    inner: &Arc<CoordinatorInner>,
    task_id: Uuid,
    reason: String,
) -> McpResult<()> {
    let record = inner.store.get_task(task_id).await?;
    let Some(record) = record else {
        return Ok(());
    };
    if record.status.is_terminal() {
        return Ok(());
    }

    let updated = inner
        .store
        .update_task(task_id, |task| {
            if task.status != TaskStatus::InProgress {
                return;
            }
            task.status = TaskStatus::Failed;
            task.error = Some(reason.clone());
            task.current_stage = None;
        })
        .await?;
    if updated.status != TaskStatus::Failed {
        return Ok(());
    }

    inner
        .store
        .emit_progress(ProgressEvent {
            task_id,
            stage: "error".to_string(),
            message: format!("Task failed: {reason}"),
            timestamp: Utc::now(),
            metadata: None,
            progress: Some(updated.progress_percentage),
        })
        .await?;
    if let Err(err) = inner.state.update_task_state(&updated).await {
        warn!(task_id = %task_id, error = %err, "Deferred durable persist of failure");
    }

    error!(task_id = %task_id, reason = %reason, "Task failed");
    Ok(())
}
