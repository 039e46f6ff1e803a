//! # Data Model
//!
//! Typed replacements for the free-form JSON maps the wire carries: task
//! records, DAG templates, queue and event payloads, and the adaptive
//! recommendations block.

pub mod messages;
pub mod recommendations;
pub mod task;
pub mod template;

pub use messages::{
    AgentHealthMetrics, AgentHealthStatus, AgentPerformanceSample, CompletionEvent, ProgressEvent,
    ReActStep, StepKind, TaskMessage,
};
pub use recommendations::{
    ContextOptimization, ConversationFlow, Personalization, Recommendations, ResponseStyle,
};
pub use task::{
    AiResponse, DocumentHit, FinalResponse, IntentClassification, ModerationResult,
    ProcessingStrategy, ResponseMetadata, Stage, StageResult, TaskRecord, TaskStatus,
};
pub use template::{DagTemplate, TemplateConditions, TemplateRegistry};
