//! Queue and event-bus payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::recommendations::Recommendations;
use super::task::{DocumentHit, Stage};

/// Work request placed on a stage queue.
///
/// Carries the snapshot the agent needs so it never reads the task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: Uuid,
    pub stage: Stage,
    pub query: String,
    pub user_id: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub vector_hits: Vec<DocumentHit>,
    pub template: String,
    pub adaptive_recommendations: Recommendations,
    pub timestamp: DateTime<Utc>,
}

/// Small published signal that a stage finished; the full result lives in
/// the task store under the stage-result key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub task_id: Uuid,
    pub stage: Stage,
    pub success: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Failure may be retried when set
    #[serde(default)]
    pub transient: bool,
    pub timestamp: DateTime<Utc>,
}

impl CompletionEvent {
    pub fn success(task_id: Uuid, stage: Stage, summary: impl Into<String>) -> Self {
        Self {
            task_id,
            stage,
            success: true,
            summary: Some(summary.into()),
            error: None,
            transient: false,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(task_id: Uuid, stage: Stage, error: impl Into<String>, transient: bool) -> Self {
        Self {
            task_id,
            stage,
            success: false,
            summary: None,
            error: Some(error.into()),
            transient,
            timestamp: Utc::now(),
        }
    }
}

/// One noteworthy transition appended to a task's progress stream.
///
/// `stage` is a free string because it also carries the pseudo-stages the
/// coordinator emits: `created`, `transition`, `complete`, `error`, `aborted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: Uuid,
    pub stage: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
    #[serde(default)]
    pub progress: Option<u8>,
}

/// Kind of a ReAct reasoning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Thought,
    Action,
    Observation,
    FinalAnswer,
    Error,
}

/// One reasoning step emitted by an agent while processing a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReActStep {
    pub task_id: Uuid,
    pub agent: String,
    pub step: StepKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ReActStep {
    pub fn new(task_id: Uuid, agent: impl Into<String>, step: StepKind, message: impl Into<String>) -> Self {
        Self {
            task_id,
            agent: agent.into(),
            step,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Agent liveness states reported by heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealthStatus {
    Healthy,
    Unhealthy,
    Starting,
    Stopping,
}

impl AgentHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentHealthStatus::Healthy => "healthy",
            AgentHealthStatus::Unhealthy => "unhealthy",
            AgentHealthStatus::Starting => "starting",
            AgentHealthStatus::Stopping => "stopping",
        }
    }
}

/// Resource and throughput metrics attached to a heartbeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentHealthMetrics {
    #[serde(default)]
    pub cpu_usage: Option<f64>,
    #[serde(default)]
    pub memory_usage: Option<f64>,
    #[serde(default)]
    pub queue_size: u32,
    /// Processed since the previous heartbeat (the store accumulates)
    #[serde(default)]
    pub processed_tasks: u64,
    /// Failed since the previous heartbeat
    #[serde(default)]
    pub failed_tasks: u64,
}

/// Append-only record of one stage execution by one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformanceSample {
    pub agent_name: String,
    pub task_id: Uuid,
    pub stage: Stage,
    pub duration_ms: i64,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_event_constructors() {
        let id = Uuid::new_v4();

        let ok = CompletionEvent::success(id, Stage::IntentAnalysis, "informational");
        assert!(ok.success);
        assert_eq!(ok.summary.as_deref(), Some("informational"));
        assert!(ok.error.is_none());

        let failed = CompletionEvent::failure(id, Stage::Moderation, "backend down", true);
        assert!(!failed.success);
        assert!(failed.transient);
        assert_eq!(failed.error.as_deref(), Some("backend down"));
    }

    #[test]
    fn test_step_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&StepKind::FinalAnswer).unwrap(),
            "\"final_answer\""
        );
        assert_eq!(
            serde_json::from_str::<StepKind>("\"thought\"").unwrap(),
            StepKind::Thought
        );
    }

    #[test]
    fn test_completion_event_json_carries_task_id_and_success() {
        let ev = CompletionEvent::success(Uuid::new_v4(), Stage::EmbeddingLookup, "2 documents");
        let json = serde_json::to_value(&ev).unwrap();

        assert!(json["task_id"].is_string());
        assert_eq!(json["success"], true);
        assert_eq!(json["stage"], "embedding_lookup");
    }
}
