//! Executor reasoning agent: turns the accumulated context and sources into
//! the answer. Honors the adaptive response-style hints so downstream
//! personalization actually reaches the output.
//!
//! Content assembly here is template-based; the production agent calls the
//! LLM provider.

use async_trait::async_trait;
use serde_json::json;

use mcp_shared::errors::{McpError, McpResult};
use mcp_shared::types::{AiResponse, Stage, StageResult, TaskMessage};

use crate::harness::{ReactEmitter, StageProcessor};

pub struct ExecutorAgent;

impl ExecutorAgent {
    fn compose(message: &TaskMessage) -> AiResponse {
        let style = &message.adaptive_recommendations.response_style;
        let source_count = message.vector_hits.len();

        let mut content = if message.context.is_empty() {
            format!("I could not find grounded material for \"{}\".", message.query)
        } else if style.detail_level == "brief" {
            // Lead sentence only
            message
                .context
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        } else {
            message.context.clone()
        };

        if style.structured_format && source_count > 0 {
            let sources = message
                .vector_hits
                .iter()
                .map(|hit| format!("- {}", hit.title))
                .collect::<Vec<_>>()
                .join("\n");
            content = format!("{content}\n\nSources:\n{sources}");
        }

        let confidence_score = (0.6 + 0.1 * source_count.min(3) as f64).min(0.9);

        AiResponse {
            content,
            confidence_score,
        }
    }
}

#[async_trait]
impl StageProcessor for ExecutorAgent {
    fn agent_name(&self) -> &str {
        "executor_agent"
    }

    fn stage(&self) -> Stage {
        Stage::ExecutorReasoning
    }

    async fn process(
        &self,
        message: &TaskMessage,
        react: &ReactEmitter,
    ) -> McpResult<StageResult> {
        if message.query.trim().is_empty() {
            return Err(McpError::Processing("empty query".to_string()));
        }

        react.thought("Reasoning over the retrieved context").await;

        let response = Self::compose(message);

        react
            .observation(format!(
                "Drafted {} chars at confidence {:.2}",
                response.content.len(),
                response.confidence_score
            ))
            .await;

        Ok(StageResult::ExecutorReasoning {
            reasoning_metadata: json!({
                "strategy": "context_composition",
                "source_count": message.vector_hits.len(),
                "detail_level": message.adaptive_recommendations.response_style.detail_level,
            }),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mcp_shared::types::{DocumentHit, Recommendations};
    use uuid::Uuid;

    fn message(context: &str, hits: usize) -> TaskMessage {
        TaskMessage {
            task_id: Uuid::new_v4(),
            stage: Stage::ExecutorReasoning,
            query: "what is the policy?".to_string(),
            user_id: "u1".to_string(),
            context: context.to_string(),
            vector_hits: (0..hits)
                .map(|i| DocumentHit {
                    id: format!("d{i}"),
                    title: format!("Doc {i}"),
                    content: String::new(),
                    score: 0.5,
                    source: "vector".to_string(),
                })
                .collect(),
            template: "standard_query".to_string(),
            adaptive_recommendations: Recommendations::default(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_confidence_scales_with_sources() {
        let none = ExecutorAgent::compose(&message("ctx", 0));
        let some = ExecutorAgent::compose(&message("ctx", 2));
        let many = ExecutorAgent::compose(&message("ctx", 10));

        assert!(none.confidence_score < some.confidence_score);
        assert!((many.confidence_score - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_structured_format_appends_sources() {
        let response = ExecutorAgent::compose(&message("The policy is weekly.", 2));
        assert!(response.content.contains("Sources:"));
        assert!(response.content.contains("- Doc 0"));
    }

    #[test]
    fn test_brief_style_keeps_lead_sentence_only() {
        let mut msg = message("First line.\nSecond line.", 0);
        msg.adaptive_recommendations.response_style.detail_level = "brief".to_string();
        msg.adaptive_recommendations.response_style.structured_format = false;

        let response = ExecutorAgent::compose(&msg);
        assert_eq!(response.content, "First line.");
    }

    #[test]
    fn test_empty_context_yields_fallback_text() {
        let response = ExecutorAgent::compose(&message("", 0));
        assert!(response.content.contains("could not find"));
    }
}
