//! Task records, stages, and per-stage result payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::messages::ReActStep;

/// One unit of work in a DAG plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentAnalysis,
    EmbeddingLookup,
    WebSearch,
    ExecutorReasoning,
    Moderation,
    ResponsePackaging,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::IntentAnalysis => "intent_analysis",
            Stage::EmbeddingLookup => "embedding_lookup",
            Stage::WebSearch => "web_search",
            Stage::ExecutorReasoning => "executor_reasoning",
            Stage::Moderation => "moderation",
            Stage::ResponsePackaging => "response_packaging",
        }
    }

    /// The terminal packaging stage is handled inline by the coordinator
    /// rather than dispatched to an agent.
    pub fn is_packaging(&self) -> bool {
        matches!(self, Stage::ResponsePackaging)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intent_analysis" => Ok(Stage::IntentAnalysis),
            "embedding_lookup" => Ok(Stage::EmbeddingLookup),
            "web_search" => Ok(Stage::WebSearch),
            "executor_reasoning" => Ok(Stage::ExecutorReasoning),
            "moderation" => Ok(Stage::Moderation),
            "response_packaging" => Ok(Stage::ResponsePackaging),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Task lifecycle states. `InProgress` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Complete,
    Failed,
    Aborted,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
            TaskStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieved document, from the vector store or web search.
///
/// `id` is the stable identity used for deduplication when web and vector
/// hits accumulate on the same task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHit {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
    /// "vector" or "web"
    #[serde(default)]
    pub source: String,
}

/// Intent classification produced by the intent agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub primary_intent: String,
    pub complexity: String,
    pub confidence: f64,
}

/// Downstream processing hints derived from intent analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStrategy {
    pub approach: String,
    pub web_search_required: bool,
    #[serde(default)]
    pub estimated_processing_time_ms: u64,
}

/// The executor agent's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    pub confidence_score: f64,
}

/// Moderation verdict for the executor's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub approved: bool,
    #[serde(default)]
    pub flagged_categories: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Structured result one agent writes for one stage.
///
/// Tagged by stage so a result can never be integrated under the wrong rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageResult {
    IntentAnalysis {
        intent_classification: IntentClassification,
        processing_strategy: ProcessingStrategy,
    },
    EmbeddingLookup {
        documents: Vec<DocumentHit>,
        context: String,
    },
    WebSearch {
        documents: Vec<DocumentHit>,
        #[serde(default)]
        search_metadata: JsonValue,
    },
    ExecutorReasoning {
        response: AiResponse,
        #[serde(default)]
        reasoning_metadata: JsonValue,
    },
    Moderation {
        moderation_result: ModerationResult,
        safety_score: f64,
    },
}

impl StageResult {
    pub fn stage(&self) -> Stage {
        match self {
            StageResult::IntentAnalysis { .. } => Stage::IntentAnalysis,
            StageResult::EmbeddingLookup { .. } => Stage::EmbeddingLookup,
            StageResult::WebSearch { .. } => Stage::WebSearch,
            StageResult::ExecutorReasoning { .. } => Stage::ExecutorReasoning,
            StageResult::Moderation { .. } => Stage::Moderation,
        }
    }
}

/// Metadata block attached to a packaged final response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub total_stages: usize,
    pub duration_ms: i64,
    pub agent_count: usize,
    pub react_steps_count: usize,
    pub documents_processed: usize,
    pub safety_score: f64,
}

/// The packaged payload delivered when a task completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub content: String,
    pub sources: Vec<DocumentHit>,
    pub confidence: f64,
    pub react_steps: Vec<ReActStep>,
    pub task_id: Uuid,
    pub template: String,
    pub completed_stages: Vec<Stage>,
    pub metadata: ResponseMetadata,
}

/// The authoritative live state of one query's execution.
///
/// Owned exclusively by the coordinator while `status == InProgress`; agents
/// write stage results to their own keys and never touch the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub user_id: String,
    pub query: String,
    pub template: String,
    pub plan: Vec<Stage>,
    pub current_stage: Option<Stage>,
    pub completed_stages: Vec<Stage>,
    pub status: TaskStatus,
    pub progress_percentage: u8,
    /// Opaque scratchpad agents build up across stages
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub vector_hits: Vec<DocumentHit>,
    #[serde(default)]
    pub intent_classification: Option<IntentClassification>,
    #[serde(default)]
    pub processing_strategy: Option<ProcessingStrategy>,
    #[serde(default)]
    pub ai_response: Option<AiResponse>,
    #[serde(default)]
    pub reasoning_metadata: Option<JsonValue>,
    #[serde(default)]
    pub moderation_result: Option<ModerationResult>,
    #[serde(default)]
    pub safety_score: Option<f64>,
    #[serde(default)]
    pub response: Option<FinalResponse>,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Fresh in-progress record positioned at the first stage of `plan`.
    pub fn new(user_id: String, query: String, plan: Vec<Stage>, template: String) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            user_id,
            query,
            template,
            current_stage: plan.first().copied(),
            plan,
            completed_stages: Vec::new(),
            status: TaskStatus::InProgress,
            progress_percentage: 0,
            context: String::new(),
            vector_hits: Vec::new(),
            intent_classification: None,
            processing_strategy: None,
            ai_response: None,
            reasoning_metadata: None,
            moderation_result: None,
            safety_score: None,
            response: None,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// `floor(100 * completed / planned)` per the advancement rule.
    pub fn computed_progress(&self) -> u8 {
        if self.plan.is_empty() {
            return 0;
        }
        ((self.completed_stages.len() * 100) / self.plan.len()) as u8
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trips_through_str() {
        for stage in [
            Stage::IntentAnalysis,
            Stage::EmbeddingLookup,
            Stage::WebSearch,
            Stage::ExecutorReasoning,
            Stage::Moderation,
            Stage::ResponsePackaging,
        ] {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_stage_serde_uses_snake_case() {
        let json = serde_json::to_string(&Stage::ExecutorReasoning).unwrap();
        assert_eq!(json, "\"executor_reasoning\"");
    }

    #[test]
    fn test_new_record_starts_at_first_stage() {
        let record = TaskRecord::new(
            "u1".into(),
            "what is the rotation policy?".into(),
            vec![Stage::EmbeddingLookup, Stage::ResponsePackaging],
            "simple_lookup".into(),
        );

        assert_eq!(record.status, TaskStatus::InProgress);
        assert_eq!(record.current_stage, Some(Stage::EmbeddingLookup));
        assert!(record.completed_stages.is_empty());
        assert_eq!(record.progress_percentage, 0);
        assert!(record.updated_at >= record.started_at);
    }

    #[test]
    fn test_computed_progress_floors() {
        let mut record = TaskRecord::new(
            "u1".into(),
            "q".into(),
            vec![
                Stage::EmbeddingLookup,
                Stage::ExecutorReasoning,
                Stage::ResponsePackaging,
            ],
            "quick_answer".into(),
        );

        assert_eq!(record.computed_progress(), 0);
        record.completed_stages.push(Stage::EmbeddingLookup);
        assert_eq!(record.computed_progress(), 33);
        record.completed_stages.push(Stage::ExecutorReasoning);
        assert_eq!(record.computed_progress(), 66);
        record.completed_stages.push(Stage::ResponsePackaging);
        assert_eq!(record.computed_progress(), 100);
    }

    #[test]
    fn test_stage_result_tag_matches_stage() {
        let result = StageResult::Moderation {
            moderation_result: ModerationResult {
                approved: true,
                flagged_categories: vec![],
                notes: None,
            },
            safety_score: 1.0,
        };

        assert_eq!(result.stage(), Stage::Moderation);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stage"], "moderation");
    }
}
