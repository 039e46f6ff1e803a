//! Intent analysis agent: classifies the query and derives processing hints
//! for the rest of the plan.

use async_trait::async_trait;

use mcp_shared::errors::McpResult;
use mcp_shared::types::{
    IntentClassification, ProcessingStrategy, Stage, StageResult, TaskMessage,
};

use crate::harness::{ReactEmitter, StageProcessor};

const RECENCY_MARKERS: &[&str] = &["latest", "news", "today", "current", "recent", "now"];
const TROUBLE_MARKERS: &[&str] = &["error", "fail", "broken", "fix", "issue", "crash"];
const QUESTION_WORDS: &[&str] = &["what", "how", "why", "when", "where", "who", "which"];

pub struct IntentAgent;

impl IntentAgent {
    fn classify(query: &str) -> (IntentClassification, ProcessingStrategy) {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();

        let primary_intent = if TROUBLE_MARKERS.iter().any(|m| lowered.contains(m)) {
            "troubleshooting"
        } else if lowered.contains("how to") || lowered.contains("steps") {
            "procedural"
        } else if words
            .first()
            .map(|first| QUESTION_WORDS.contains(first))
            .unwrap_or(false)
            || lowered.ends_with('?')
        {
            "informational"
        } else {
            "conversational"
        };

        let complexity = match words.len() {
            0..=7 => "low",
            8..=19 => "medium",
            _ => "high",
        };

        let web_search_required = RECENCY_MARKERS.iter().any(|m| lowered.contains(m));
        let approach = if web_search_required {
            "web_augmented"
        } else {
            "direct_answer"
        };

        (
            IntentClassification {
                primary_intent: primary_intent.to_string(),
                complexity: complexity.to_string(),
                confidence: if primary_intent == "conversational" {
                    0.6
                } else {
                    0.85
                },
            },
            ProcessingStrategy {
                approach: approach.to_string(),
                web_search_required,
                estimated_processing_time_ms: match complexity {
                    "low" => 2_000,
                    "medium" => 6_000,
                    _ => 15_000,
                },
            },
        )
    }
}

#[async_trait]
impl StageProcessor for IntentAgent {
    fn agent_name(&self) -> &str {
        "intent_agent"
    }

    fn stage(&self) -> Stage {
        Stage::IntentAnalysis
    }

    async fn process(
        &self,
        message: &TaskMessage,
        react: &ReactEmitter,
    ) -> McpResult<StageResult> {
        react.thought("Classifying the query intent").await;

        let (intent_classification, processing_strategy) = Self::classify(&message.query);

        react
            .observation(format!(
                "{} intent, {} complexity{}",
                intent_classification.primary_intent,
                intent_classification.complexity,
                if processing_strategy.web_search_required {
                    ", web search required"
                } else {
                    ""
                }
            ))
            .await;

        Ok(StageResult::IntentAnalysis {
            intent_classification,
            processing_strategy,
        })
    }
}
