//! # State Manager
//!
//! Durable projection of live task state for analytics and post-mortem:
//! task lifecycle rows, append-only stage logs and performance samples, and
//! per-agent health upserts. Postgres in production, an in-memory backend
//! for tests; the analytics computations are identical.
//!
//! Housekeeping runs as state-owned background loops: a pruner deleting
//! stage logs and performance samples past the retention window, and a
//! reconciler that upserts every live task-store record so coordinator
//! crashes cannot lose terminal states.

pub mod memory;
pub mod postgres;
pub mod types;

use std::time::Duration;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::McpResult;
use crate::taskstore::TaskStore;
use crate::types::{AgentHealthMetrics, AgentHealthStatus, AgentPerformanceSample, TaskRecord};

pub use memory::InMemoryState;
pub use types::{
    AgentHealthRow, AgentPerformanceRow, AgentPerformanceSummary, HourlyBucket, StageLogEntry,
    TaskAnalytics, TaskHistoryEntry, TaskSummary, TemplateUsage,
};

const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub enum StateBackend {
    Postgres(sqlx::PgPool),
    InMemory(InMemoryState),
}

/// Durable persistence facade.
#[derive(Clone)]
pub struct StateManager {
    backend: StateBackend,
}

impl StateManager {
    /// Connect to Postgres and apply pending migrations.
    pub async fn connect_postgres(url: &str) -> McpResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .min_connections(2)
            .max_connections(10)
            .connect(url)
            .await?;
        postgres::MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| crate::errors::McpError::Database(e.to_string()))?;
        Ok(Self {
            backend: StateBackend::Postgres(pool),
        })
    }

    pub fn new_in_memory() -> Self {
        Self {
            backend: StateBackend::InMemory(InMemoryState::new()),
        }
    }

    /// Idempotent upsert keyed by task id; safe to call repeatedly for the
    /// same task.
    pub async fn persist_task_start(&self, record: &TaskRecord) -> McpResult<()> {
        match &self.backend {
            StateBackend::Postgres(pool) => postgres::persist_task_start(pool, record).await,
            StateBackend::InMemory(state) => {
                state.upsert_task(record);
                Ok(())
            }
        }
    }

    /// Update the mutable fields of a task's history row.
    pub async fn update_task_state(&self, record: &TaskRecord) -> McpResult<()> {
        match &self.backend {
            StateBackend::Postgres(pool) => postgres::update_task_state(pool, record).await,
            StateBackend::InMemory(state) => {
                state.upsert_task(record);
                Ok(())
            }
        }
    }

    pub async fn log_stage_event(
        &self,
        task_id: Uuid,
        stage: &str,
        action: &str,
        message: &str,
        metadata: Option<JsonValue>,
    ) -> McpResult<()> {
        match &self.backend {
            StateBackend::Postgres(pool) => {
                postgres::log_stage_event(pool, task_id, stage, action, message, metadata).await
            }
            StateBackend::InMemory(state) => {
                state.log_stage_event(task_id, stage, action, message, metadata);
                Ok(())
            }
        }
    }

    /// Full stage log for one task, oldest first.
    pub async fn get_stage_logs(&self, task_id: Uuid) -> McpResult<Vec<StageLogEntry>> {
        match &self.backend {
            StateBackend::Postgres(pool) => postgres::get_stage_logs(pool, task_id).await,
            StateBackend::InMemory(state) => Ok(state.get_stage_logs(task_id)),
        }
    }

    pub async fn record_agent_performance(
        &self,
        sample: &AgentPerformanceSample,
    ) -> McpResult<()> {
        match &self.backend {
            StateBackend::Postgres(pool) => postgres::record_agent_performance(pool, sample).await,
            StateBackend::InMemory(state) => {
                state.record_agent_performance(sample.clone());
                Ok(())
            }
        }
    }

    /// Upsert keyed by agent name; processed/failed counters accumulate.
    pub async fn update_agent_health(
        &self,
        agent_name: &str,
        status: AgentHealthStatus,
        metrics: Option<&AgentHealthMetrics>,
    ) -> McpResult<()> {
        match &self.backend {
            StateBackend::Postgres(pool) => {
                postgres::update_agent_health(pool, agent_name, status, metrics).await
            }
            StateBackend::InMemory(state) => {
                state.update_agent_health(agent_name, status, metrics);
                Ok(())
            }
        }
    }

    pub async fn get_task_analytics(&self, hours: i64) -> McpResult<TaskAnalytics> {
        match &self.backend {
            StateBackend::Postgres(pool) => postgres::get_task_analytics(pool, hours).await,
            StateBackend::InMemory(state) => Ok(state.get_task_analytics(hours)),
        }
    }

    pub async fn get_agent_performance_summary(
        &self,
        hours: i64,
    ) -> McpResult<AgentPerformanceSummary> {
        match &self.backend {
            StateBackend::Postgres(pool) => {
                postgres::get_agent_performance_summary(pool, hours).await
            }
            StateBackend::InMemory(state) => Ok(state.get_agent_performance_summary(hours)),
        }
    }

    pub async fn get_task_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> McpResult<Vec<TaskHistoryEntry>> {
        match &self.backend {
            StateBackend::Postgres(pool) => postgres::get_task_history(pool, user_id, limit).await,
            StateBackend::InMemory(state) => Ok(state.get_task_history(user_id, limit)),
        }
    }

    /// Delete stage logs and performance samples older than the retention
    /// window. Returns (logs deleted, samples deleted).
    pub async fn prune_old_data(&self, retention_days: u32) -> McpResult<(u64, u64)> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        match &self.backend {
            StateBackend::Postgres(pool) => postgres::prune_old_data(pool, cutoff).await,
            StateBackend::InMemory(state) => Ok(state.prune_old_data(cutoff)),
        }
    }

    /// Upsert every live task-store record into the durable store.
    pub async fn reconcile_from(&self, store: &TaskStore) -> McpResult<usize> {
        let records = store.scan_tasks().await?;
        let count = records.len();
        for record in &records {
            self.persist_task_start(record).await?;
            self.update_task_state(record).await?;
        }
        Ok(count)
    }

    pub async fn ping(&self) -> bool {
        match &self.backend {
            StateBackend::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            StateBackend::InMemory(_) => true,
        }
    }

    /// Spawn the pruning and reconciliation loops. Both exit on cancellation.
    pub fn spawn_housekeeping(
        &self,
        store: TaskStore,
        retention_days: u32,
        token: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let pruner = {
            let state = self.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(PRUNE_INTERVAL);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            match state.prune_old_data(retention_days).await {
                                Ok((logs, samples)) if logs + samples > 0 => {
                                    info!(logs = logs, samples = samples, "Pruned aged state");
                                }
                                Ok(_) => {}
                                Err(err) => error!(error = %err, "State pruning failed"),
                            }
                        }
                    }
                }
            })
        };

        let reconciler = {
            let state = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            match state.reconcile_from(&store).await {
                                Ok(count) => debug!(tasks = count, "Reconciled task store"),
                                Err(err) => error!(error = %err, "Reconciliation failed"),
                            }
                        }
                    }
                }
            })
        };

        vec![pruner, reconciler]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Stage, TaskStatus};

    fn record(user: &str, template: &str, status: TaskStatus) -> TaskRecord {
        let mut record = TaskRecord::new(
            user.to_string(),
            "query".to_string(),
            vec![Stage::EmbeddingLookup, Stage::ResponsePackaging],
            template.to_string(),
        );
        record.status = status;
        record
    }

    #[tokio::test]
    async fn test_task_analytics_counts_by_status() {
        let state = StateManager::new_in_memory();

        state
            .persist_task_start(&record("u1", "standard_query", TaskStatus::Complete))
            .await
            .unwrap();
        state
            .persist_task_start(&record("u1", "standard_query", TaskStatus::Failed))
            .await
            .unwrap();
        state
            .persist_task_start(&record("u2", "quick_answer", TaskStatus::InProgress))
            .await
            .unwrap();

        let analytics = state.get_task_analytics(24).await.unwrap();
        assert_eq!(analytics.task_summary.total_tasks, 3);
        assert_eq!(analytics.task_summary.completed_tasks, 1);
        assert_eq!(analytics.task_summary.failed_tasks, 1);
        assert_eq!(analytics.task_summary.active_tasks, 1);
        assert_eq!(analytics.period, "last_24_hours");

        let standard = analytics
            .template_usage
            .iter()
            .find(|usage| usage.template == "standard_query")
            .unwrap();
        assert_eq!(standard.count, 2);
    }

    #[tokio::test]
    async fn test_persist_task_start_is_idempotent() {
        let state = StateManager::new_in_memory();
        let task = record("u1", "standard_query", TaskStatus::InProgress);

        state.persist_task_start(&task).await.unwrap();
        state.persist_task_start(&task).await.unwrap();

        let analytics = state.get_task_analytics(24).await.unwrap();
        assert_eq!(analytics.task_summary.total_tasks, 1);
    }

    #[tokio::test]
    async fn test_agent_health_counters_accumulate() {
        let state = StateManager::new_in_memory();
        let metrics = AgentHealthMetrics {
            processed_tasks: 5,
            failed_tasks: 1,
            ..Default::default()
        };

        state
            .update_agent_health("intent_agent", AgentHealthStatus::Healthy, Some(&metrics))
            .await
            .unwrap();
        state
            .update_agent_health("intent_agent", AgentHealthStatus::Healthy, Some(&metrics))
            .await
            .unwrap();

        let summary = state.get_agent_performance_summary(24).await.unwrap();
        let row = &summary.agent_health[0];
        assert_eq!(row.agent_name, "intent_agent");
        assert_eq!(row.processed_tasks, 10);
        assert_eq!(row.failed_tasks, 2);
        assert!(row.is_healthy);
    }

    #[tokio::test]
    async fn test_performance_summary_aggregates_samples() {
        let state = StateManager::new_in_memory();
        for (duration, success) in [(100i64, true), (200, true), (300, false)] {
            state
                .record_agent_performance(&AgentPerformanceSample {
                    agent_name: "executor_agent".to_string(),
                    task_id: Uuid::new_v4(),
                    stage: Stage::ExecutorReasoning,
                    duration_ms: duration,
                    success,
                    error_message: None,
                    metadata: None,
                })
                .await
                .unwrap();
        }

        let summary = state.get_agent_performance_summary(24).await.unwrap();
        let row = summary
            .agent_performance
            .iter()
            .find(|r| r.agent_name == "executor_agent")
            .unwrap();
        assert_eq!(row.total_tasks, 3);
        assert_eq!(row.successful_tasks, 2);
        assert_eq!(row.success_rate, 66.7);
        assert_eq!(row.avg_duration_ms, 200);
        assert_eq!(row.min_duration_ms, 100);
        assert_eq!(row.max_duration_ms, 300);
    }

    #[tokio::test]
    async fn test_task_history_is_per_user_newest_first() {
        let state = StateManager::new_in_memory();
        let mut first = record("u1", "standard_query", TaskStatus::Complete);
        first.started_at = Utc::now() - chrono::Duration::minutes(10);
        let second = record("u1", "quick_answer", TaskStatus::Complete);
        let other = record("u2", "standard_query", TaskStatus::Complete);

        for task in [&first, &second, &other] {
            state.persist_task_start(task).await.unwrap();
        }

        let history = state.get_task_history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].task_id, second.task_id);
        assert_eq!(history[1].task_id, first.task_id);
    }

    #[tokio::test]
    async fn test_prune_removes_aged_rows() {
        let state = StateManager::new_in_memory();
        state
            .log_stage_event(Uuid::new_v4(), "intent_analysis", "start", "m", None)
            .await
            .unwrap();

        // Nothing young enough to prune
        let (logs, samples) = state.prune_old_data(7).await.unwrap();
        assert_eq!((logs, samples), (0, 0));

        // Zero-day retention prunes everything
        let (logs, _) = state.prune_old_data(0).await.unwrap();
        assert_eq!(logs, 1);
    }

    #[tokio::test]
    async fn test_reconcile_mirrors_task_store() {
        let state = StateManager::new_in_memory();
        let store = TaskStore::new_in_memory(Duration::from_secs(600));
        store
            .create_task(
                "u1",
                "q",
                vec![Stage::EmbeddingLookup, Stage::ResponsePackaging],
                "simple_lookup",
            )
            .await
            .unwrap();

        let count = state.reconcile_from(&store).await.unwrap();
        assert_eq!(count, 1);

        let analytics = state.get_task_analytics(24).await.unwrap();
        assert_eq!(analytics.task_summary.total_tasks, 1);
    }
}
