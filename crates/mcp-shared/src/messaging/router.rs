//! # Stage Router
//!
//! Maps stages to queue names and completion channels, and builds the
//! per-task channel names. Queue and channel names are wire-level contract:
//! agents in other deployments consume the same literals.

use uuid::Uuid;

use crate::types::Stage;

/// Durable direct exchange carrying task messages.
pub const TASK_EXCHANGE: &str = "mcp.tasks";
/// Dead-letter exchange for rejected and poisoned messages.
pub const DEAD_LETTER_EXCHANGE: &str = "mcp.dlx";
/// The single queue bound to the dead-letter exchange.
pub const DEAD_LETTER_QUEUE: &str = "mcp.dead_letter";
/// Routing key used when dead-lettering.
pub const DEAD_LETTER_ROUTING_KEY: &str = "dead_letter";
/// Queue for packaged responses awaiting delivery.
pub const RESPONSES_QUEUE: &str = "responses";
/// Channel announcing a packaged final response.
pub const RESPONSE_READY_CHANNEL: &str = "ai:response:ready";

/// Queue and channel name resolution for the MCP wire layer.
#[derive(Debug, Clone, Default)]
pub struct StageRouter;

impl StageRouter {
    /// Work queue for a stage; `None` for the coordinator-internal
    /// packaging stage.
    pub fn stage_queue(&self, stage: Stage) -> Option<&'static str> {
        match stage {
            Stage::IntentAnalysis => Some("intent.task"),
            Stage::EmbeddingLookup => Some("embedding.task"),
            Stage::ExecutorReasoning => Some("executor.task"),
            Stage::Moderation => Some("moderator.task"),
            Stage::WebSearch => Some("websearch.task"),
            Stage::ResponsePackaging => None,
        }
    }

    /// Completion channel the stage's agent publishes on.
    pub fn completion_channel(&self, stage: Stage) -> Option<&'static str> {
        match stage {
            Stage::IntentAnalysis => Some("ai:intent:complete"),
            Stage::EmbeddingLookup => Some("ai:embedding:complete"),
            Stage::ExecutorReasoning => Some("ai:execution:complete"),
            Stage::Moderation => Some("ai:moderation:complete"),
            Stage::WebSearch => Some("ai:websearch:complete"),
            Stage::ResponsePackaging => None,
        }
    }

    /// All work queues, packaging excluded, plus the responses queue.
    pub fn all_queues(&self) -> Vec<&'static str> {
        vec![
            "intent.task",
            "embedding.task",
            "executor.task",
            "moderator.task",
            "websearch.task",
            RESPONSES_QUEUE,
        ]
    }

    pub fn react_channel(&self, task_id: Uuid) -> String {
        format!("ai:react:{task_id}")
    }

    /// Pattern matching every per-task ReAct channel.
    pub fn react_pattern(&self) -> &'static str {
        "ai:react:*"
    }

    pub fn progress_channel(&self, task_id: Uuid) -> String {
        format!("ai:progress:{task_id}")
    }

    pub fn frontend_channel(&self, task_id: Uuid) -> String {
        format!("frontend:stream:{task_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_queue_names() {
        let router = StageRouter;

        assert_eq!(router.stage_queue(Stage::IntentAnalysis), Some("intent.task"));
        assert_eq!(
            router.stage_queue(Stage::EmbeddingLookup),
            Some("embedding.task")
        );
        assert_eq!(
            router.stage_queue(Stage::ExecutorReasoning),
            Some("executor.task")
        );
        assert_eq!(router.stage_queue(Stage::Moderation), Some("moderator.task"));
        assert_eq!(router.stage_queue(Stage::WebSearch), Some("websearch.task"));
        assert_eq!(router.stage_queue(Stage::ResponsePackaging), None);
    }

    #[test]
    fn test_completion_channel_names() {
        let router = StageRouter;

        assert_eq!(
            router.completion_channel(Stage::ExecutorReasoning),
            Some("ai:execution:complete")
        );
        assert_eq!(
            router.completion_channel(Stage::Moderation),
            Some("ai:moderation:complete")
        );
        assert_eq!(router.completion_channel(Stage::ResponsePackaging), None);
    }

    #[test]
    fn test_per_task_channels() {
        let router = StageRouter;
        let id = Uuid::nil();

        assert_eq!(
            router.react_channel(id),
            "ai:react:00000000-0000-0000-0000-000000000000"
        );
        assert!(router.progress_channel(id).starts_with("ai:progress:"));
        assert!(router.frontend_channel(id).starts_with("frontend:stream:"));
    }

    #[test]
    fn test_all_queues_includes_responses() {
        assert!(StageRouter.all_queues().contains(&RESPONSES_QUEUE));
        assert_eq!(StageRouter.all_queues().len(), 6);
    }
}
