//! # Task Store
//!
//! Low-latency, TTL-bounded storage for live task state: the task record,
//! per-stage results, the bounded progress and ReAct streams, the adaptive
//! recommendations stash, and the per-user task index.
//!
//! Keys: `task:{id}`, `stream.progress:{id}`, `stream.react:{id}`,
//! `stage_result:{id}:{stage}`, `adaptive:{id}`, `user:{user_id}:tasks`.
//! Every write refreshes the TTL so live tasks never expire mid-flight.
//!
//! Streams are append-only and time-ordered per task; the store keeps at
//! least the last [`STREAM_KEEP`] entries. Channel fan-out on writes is
//! best-effort (Redis pub/sub in production); anything needing durability
//! reads the stream tail.

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use uuid::Uuid;

use crate::errors::{McpError, McpResult};
use crate::types::{ProgressEvent, ReActStep, Recommendations, Stage, StageResult, TaskRecord};

pub use memory::InMemoryTaskStore;
pub use redis_store::RedisTaskStore;

/// Entries retained per stream (the contract promises at least 100).
pub const STREAM_KEEP: usize = 200;

/// The task store backend.
#[derive(Clone)]
pub enum TaskStore {
    Redis(RedisTaskStore),
    InMemory(InMemoryTaskStore),
}

impl TaskStore {
    pub async fn connect_redis(url: &str, ttl: Duration) -> McpResult<Self> {
        Ok(Self::Redis(RedisTaskStore::connect(url, ttl).await?))
    }

    pub fn new_in_memory(ttl: Duration) -> Self {
        Self::InMemory(InMemoryTaskStore::new(ttl))
    }

    /// Create a fresh in-progress record at the first stage of `plan`,
    /// index it for the user, and seed the progress stream.
    pub async fn create_task(
        &self,
        user_id: &str,
        query: &str,
        plan: Vec<Stage>,
        template: &str,
    ) -> McpResult<TaskRecord> {
        let record = TaskRecord::new(
            user_id.to_string(),
            query.to_string(),
            plan,
            template.to_string(),
        );

        self.put_task(&record).await?;
        self.index_user_task(user_id, record.task_id).await?;
        self.emit_progress(ProgressEvent {
            task_id: record.task_id,
            stage: "initialized".to_string(),
            message: format!("Task created with template '{template}'"),
            timestamp: record.started_at,
            metadata: None,
            progress: Some(0),
        })
        .await?;

        Ok(record)
    }

    pub async fn get_task(&self, task_id: Uuid) -> McpResult<Option<TaskRecord>> {
        match self {
            Self::Redis(store) => store.get_task(task_id).await,
            Self::InMemory(store) => Ok(store.get_task(task_id)),
        }
    }

    /// Write a record verbatim, refreshing its TTL.
    pub async fn put_task(&self, record: &TaskRecord) -> McpResult<()> {
        match self {
            Self::Redis(store) => store.put_task(record).await,
            Self::InMemory(store) => {
                store.put_task(record);
                Ok(())
            }
        }
    }

    /// Read-modify-write with TTL refresh. Last write wins; the coordinator
    /// is the only writer for in-progress records, so this is not a CAS.
    pub async fn update_task<F>(&self, task_id: Uuid, mutate: F) -> McpResult<TaskRecord>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut record = self
            .get_task(task_id)
            .await?
            .ok_or(McpError::TaskNotFound(task_id))?;
        mutate(&mut record);
        record.touch();
        self.put_task(&record).await?;
        Ok(record)
    }

    /// Append to the progress stream and fan out on the progress channel.
    pub async fn emit_progress(&self, event: ProgressEvent) -> McpResult<()> {
        match self {
            Self::Redis(store) => store.emit_progress(&event).await,
            Self::InMemory(store) => {
                store.emit_progress(event);
                Ok(())
            }
        }
    }

    pub async fn progress_stream(&self, task_id: Uuid) -> McpResult<Vec<ProgressEvent>> {
        match self {
            Self::Redis(store) => store.progress_stream(task_id).await,
            Self::InMemory(store) => Ok(store.progress_stream(task_id)),
        }
    }

    /// Append a ReAct step to the per-task stream and fan it out.
    pub async fn append_react(&self, step: ReActStep) -> McpResult<()> {
        match self {
            Self::Redis(store) => store.append_react(&step).await,
            Self::InMemory(store) => {
                store.append_react(step);
                Ok(())
            }
        }
    }

    pub async fn react_stream(&self, task_id: Uuid) -> McpResult<Vec<ReActStep>> {
        match self {
            Self::Redis(store) => store.react_stream(task_id).await,
            Self::InMemory(store) => Ok(store.react_stream(task_id)),
        }
    }

    /// Stage-scoped result key: single writer (the stage's agent), single
    /// reader (the coordinator).
    pub async fn put_stage_result(&self, task_id: Uuid, result: &StageResult) -> McpResult<()> {
        match self {
            Self::Redis(store) => store.put_stage_result(task_id, result).await,
            Self::InMemory(store) => {
                store.put_stage_result(task_id, result.clone());
                Ok(())
            }
        }
    }

    pub async fn get_stage_result(
        &self,
        task_id: Uuid,
        stage: Stage,
    ) -> McpResult<Option<StageResult>> {
        match self {
            Self::Redis(store) => store.get_stage_result(task_id, stage).await,
            Self::InMemory(store) => Ok(store.get_stage_result(task_id, stage)),
        }
    }

    pub async fn put_recommendations(
        &self,
        task_id: Uuid,
        recommendations: &Recommendations,
    ) -> McpResult<()> {
        match self {
            Self::Redis(store) => store.put_recommendations(task_id, recommendations).await,
            Self::InMemory(store) => {
                store.put_recommendations(task_id, recommendations.clone());
                Ok(())
            }
        }
    }

    pub async fn get_recommendations(&self, task_id: Uuid) -> McpResult<Option<Recommendations>> {
        match self {
            Self::Redis(store) => store.get_recommendations(task_id).await,
            Self::InMemory(store) => Ok(store.get_recommendations(task_id)),
        }
    }

    async fn index_user_task(&self, user_id: &str, task_id: Uuid) -> McpResult<()> {
        match self {
            Self::Redis(store) => store.index_user_task(user_id, task_id).await,
            Self::InMemory(store) => {
                store.index_user_task(user_id, task_id);
                Ok(())
            }
        }
    }

    /// Most recent task ids for a user, newest first.
    pub async fn list_user_tasks(&self, user_id: &str, limit: usize) -> McpResult<Vec<Uuid>> {
        match self {
            Self::Redis(store) => store.list_user_tasks(user_id, limit).await,
            Self::InMemory(store) => Ok(store.list_user_tasks(user_id, limit)),
        }
    }

    /// Every live task record; feeds the durable-store reconciler.
    pub async fn scan_tasks(&self) -> McpResult<Vec<TaskRecord>> {
        match self {
            Self::Redis(store) => store.scan_tasks().await,
            Self::InMemory(store) => Ok(store.scan_tasks()),
        }
    }

    pub async fn ping(&self) -> bool {
        match self {
            Self::Redis(store) => store.ping().await,
            Self::InMemory(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepKind, TaskStatus};

    fn store() -> TaskStore {
        TaskStore::new_in_memory(Duration::from_secs(600))
    }

    fn plan() -> Vec<Stage> {
        vec![
            Stage::IntentAnalysis,
            Stage::EmbeddingLookup,
            Stage::ExecutorReasoning,
            Stage::Moderation,
            Stage::ResponsePackaging,
        ]
    }

    #[tokio::test]
    async fn test_create_task_initializes_record_and_stream() {
        let store = store();
        let record = store
            .create_task("u1", "what is the policy?", plan(), "standard_query")
            .await
            .unwrap();

        assert_eq!(record.status, TaskStatus::InProgress);
        assert_eq!(record.current_stage, Some(Stage::IntentAnalysis));
        assert_eq!(record.progress_percentage, 0);

        let fetched = store.get_task(record.task_id).await.unwrap().unwrap();
        assert_eq!(fetched.query, "what is the policy?");

        let progress = store.progress_stream(record.task_id).await.unwrap();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].stage, "initialized");

        let tasks = store.list_user_tasks("u1", 10).await.unwrap();
        assert_eq!(tasks, vec![record.task_id]);
    }

    #[tokio::test]
    async fn test_update_task_mutates_and_touches() {
        let store = store();
        let record = store
            .create_task("u1", "q", plan(), "standard_query")
            .await
            .unwrap();

        let updated = store
            .update_task(record.task_id, |task| {
                task.context = "retrieved context".to_string();
                task.progress_percentage = 20;
            })
            .await
            .unwrap();

        assert_eq!(updated.context, "retrieved context");
        assert_eq!(updated.progress_percentage, 20);
        assert!(updated.updated_at >= record.updated_at);
    }

    #[tokio::test]
    async fn test_update_unknown_task_is_not_found() {
        let store = store();
        let err = store.update_task(Uuid::new_v4(), |_| {}).await.unwrap_err();
        assert!(matches!(err, McpError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_stage_result_round_trip() {
        let store = store();
        let task_id = Uuid::new_v4();
        let result = StageResult::EmbeddingLookup {
            documents: vec![],
            context: "two docs".to_string(),
        };

        store.put_stage_result(task_id, &result).await.unwrap();

        let fetched = store
            .get_stage_result(task_id, Stage::EmbeddingLookup)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, result);

        assert!(store
            .get_stage_result(task_id, Stage::Moderation)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_react_stream_preserves_append_order() {
        let store = store();
        let task_id = Uuid::new_v4();

        for (kind, message) in [
            (StepKind::Thought, "thinking"),
            (StepKind::Action, "searching"),
            (StepKind::Observation, "found 2 docs"),
            (StepKind::FinalAnswer, "done"),
        ] {
            store
                .append_react(ReActStep::new(task_id, "intent_agent", kind, message))
                .await
                .unwrap();
        }

        let steps = store.react_stream(task_id).await.unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].step, StepKind::Thought);
        assert_eq!(steps[3].step, StepKind::FinalAnswer);
        // Append order equals timestamp order
        for pair in steps.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_streams_are_bounded() {
        let store = store();
        let task_id = Uuid::new_v4();

        for i in 0..(STREAM_KEEP + 50) {
            store
                .emit_progress(ProgressEvent {
                    task_id,
                    stage: "transition".to_string(),
                    message: format!("event {i}"),
                    timestamp: chrono::Utc::now(),
                    metadata: None,
                    progress: None,
                })
                .await
                .unwrap();
        }

        let events = store.progress_stream(task_id).await.unwrap();
        assert_eq!(events.len(), STREAM_KEEP);
        // The newest entries survive
        assert_eq!(events.last().unwrap().message, format!("event {}", STREAM_KEEP + 49));
    }

    #[tokio::test]
    async fn test_recommendations_stash() {
        let store = store();
        let task_id = Uuid::new_v4();

        assert!(store.get_recommendations(task_id).await.unwrap().is_none());

        let recommendations = Recommendations::default();
        store
            .put_recommendations(task_id, &recommendations)
            .await
            .unwrap();
        let fetched = store.get_recommendations(task_id).await.unwrap().unwrap();
        assert_eq!(fetched, recommendations);
    }

    #[tokio::test]
    async fn test_list_user_tasks_newest_first() {
        let store = store();
        let first = store.create_task("u9", "q1", plan(), "standard_query").await.unwrap();
        let second = store.create_task("u9", "q2", plan(), "standard_query").await.unwrap();

        let tasks = store.list_user_tasks("u9", 10).await.unwrap();
        assert_eq!(tasks, vec![second.task_id, first.task_id]);

        let limited = store.list_user_tasks("u9", 1).await.unwrap();
        assert_eq!(limited, vec![second.task_id]);
    }

    #[tokio::test]
    async fn test_expired_tasks_are_invisible() {
        let store = TaskStore::new_in_memory(Duration::from_millis(0));
        let record = store
            .create_task("u1", "q", plan(), "standard_query")
            .await
            .unwrap();

        assert!(store.get_task(record.task_id).await.unwrap().is_none());
        assert!(store.scan_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_tasks_sees_live_records() {
        let store = store();
        store.create_task("u1", "a", plan(), "standard_query").await.unwrap();
        store.create_task("u2", "b", plan(), "standard_query").await.unwrap();

        let records = store.scan_tasks().await.unwrap();
        assert_eq!(records.len(), 2);
    }
}
