//! # Error Taxonomy
//!
//! One error enum for the whole core. Variants map onto the recovery classes
//! the coordinator distinguishes: transient I/O (retryable at the point of
//! failure), stage timeouts and negative completions (task-fatal), schema
//! errors (dead-letter), and 4xx-class lookups (surfaced directly).
//!
//! Timeouts at suspension points are modeled as ordinary `Option`/variant
//! results by the callers; `StageTimeout` exists for the moment a timeout is
//! promoted to a task failure.

use uuid::Uuid;

use crate::types::Stage;

/// Result alias used across every MCP crate.
pub type McpResult<T> = Result<T, McpError>;

/// Unified error type for the MCP core.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("Queue '{queue}' rejected publish (at max length)")]
    QueueOverflow { queue: String },

    #[error("Task store error: {0}")]
    TaskStore(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unknown DAG template: {0}")]
    TemplateNotFound(String),

    #[error("Unknown task: {0}")]
    TaskNotFound(Uuid),

    #[error("stage_timeout:{stage}")]
    StageTimeout { stage: Stage },

    #[error("Stage '{stage}' failed: {reason}")]
    StageFailed { stage: Stage, reason: String },

    #[error("Agent processing error: {0}")]
    Processing(String),
}

impl McpError {
    /// Whether the failure is worth retrying at the point it occurred.
    ///
    /// Transient I/O (broker, store, outbound HTTP) qualifies; everything
    /// else is either task-fatal or a programmer/client error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            McpError::Messaging(_)
                | McpError::TaskStore(_)
                | McpError::Database(_)
                | McpError::Http(_)
        )
    }
}

impl From<lapin::Error> for McpError {
    fn from(err: lapin::Error) -> Self {
        McpError::Messaging(err.to_string())
    }
}

impl From<redis::RedisError> for McpError {
    fn from(err: redis::RedisError) -> Self {
        McpError::TaskStore(err.to_string())
    }
}

impl From<sqlx::Error> for McpError {
    fn from(err: sqlx::Error) -> Self {
        McpError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Schema(err.to_string())
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        McpError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_timeout_format_matches_task_error_string() {
        let err = McpError::StageTimeout {
            stage: Stage::ExecutorReasoning,
        };
        assert_eq!(err.to_string(), "stage_timeout:executor_reasoning");
    }

    #[test]
    fn test_transient_classification() {
        assert!(McpError::Messaging("publish failed".into()).is_transient());
        assert!(McpError::TaskStore("connection reset".into()).is_transient());
        assert!(!McpError::TemplateNotFound("nope".into()).is_transient());
        assert!(!McpError::StageTimeout {
            stage: Stage::Moderation
        }
        .is_transient());
    }
}
