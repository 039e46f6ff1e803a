//! Web search agent: augments the document set with external results.
//!
//! Produces deterministic result stubs keyed off the query; the production
//! agent fronts a real web-search provider.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use serde_json::json;

use mcp_shared::errors::McpResult;
use mcp_shared::types::{DocumentHit, Stage, StageResult, TaskMessage};

use crate::harness::{ReactEmitter, StageProcessor};

const RESULT_COUNT: usize = 2;

pub struct WebSearchAgent;

impl WebSearchAgent {
    fn results_for(query: &str) -> Vec<DocumentHit> {
        (0..RESULT_COUNT)
            .map(|rank| {
                let mut hasher = DefaultHasher::new();
                query.hash(&mut hasher);
                rank.hash(&mut hasher);
                let digest = hasher.finish();

                DocumentHit {
                    id: format!("web-{digest:016x}"),
                    title: format!("Web result {} for \"{query}\"", rank + 1),
                    content: format!("Search snippet {} matching: {query}", rank + 1),
                    score: 0.7 - rank as f64 * 0.1,
                    source: "web".to_string(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl StageProcessor for WebSearchAgent {
    fn agent_name(&self) -> &str {
        "websearch_agent"
    }

    fn stage(&self) -> Stage {
        Stage::WebSearch
    }

    async fn process(
        &self,
        message: &TaskMessage,
        react: &ReactEmitter,
    ) -> McpResult<StageResult> {
        react.action(format!("Searching the web for: {}", message.query)).await;

        let documents = Self::results_for(&message.query);

        react
            .observation(format!("Collected {} web results", documents.len()))
            .await;

        Ok(StageResult::WebSearch {
            search_metadata: json!({
                "provider": "stub",
                "query": message.query,
                "result_count": documents.len(),
            }),
            documents,
        })
    }
}
