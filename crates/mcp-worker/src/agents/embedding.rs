//! Embedding lookup agent: retrieves the documents most relevant to the
//! query and assembles the context scratchpad for the executor.
//!
//! Retrieval here scores term overlap against an in-process corpus; the
//! production agent asks the document-vector store instead.

use async_trait::async_trait;

use mcp_shared::errors::McpResult;
use mcp_shared::types::{DocumentHit, Stage, StageResult, TaskMessage};

use crate::harness::{ReactEmitter, StageProcessor};

const TOP_K: usize = 3;

#[derive(Debug, Clone)]
pub struct CorpusDoc {
    pub id: String,
    pub title: String,
    pub content: String,
}

pub struct EmbeddingAgent {
    corpus: Vec<CorpusDoc>,
}

impl EmbeddingAgent {
    pub fn new(corpus: Vec<CorpusDoc>) -> Self {
        Self { corpus }
    }

    /// Agent over a small built-in knowledge base; useful for demos and as
    /// the default worker body.
    pub fn with_default_corpus() -> Self {
        Self::new(vec![
            CorpusDoc {
                id: "kb-oncall".to_string(),
                title: "On-call rotation policy".to_string(),
                content: "The SRE on-call rotation runs weekly, Monday to Monday, with a \
                          primary and a secondary engineer per region."
                    .to_string(),
            },
            CorpusDoc {
                id: "kb-standup".to_string(),
                title: "Daily standup".to_string(),
                content: "The daily standup is at 09:30 local time in the team channel."
                    .to_string(),
            },
            CorpusDoc {
                id: "kb-deploy".to_string(),
                title: "Deployment checklist".to_string(),
                content: "Deployments require a green pipeline, a rollback plan, and a \
                          change-window announcement."
                    .to_string(),
            },
        ])
    }

    fn score(query: &str, doc: &CorpusDoc) -> f64 {
        let lowered = query.to_lowercase();
        let terms: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|term| term.len() > 2)
            .collect();
        if terms.is_empty() {
            return 0.0;
        }

        let haystack = format!("{} {}", doc.title, doc.content).to_lowercase();
        let matched = terms
            .iter()
            .filter(|term| haystack.contains(*term))
            .count();
        matched as f64 / terms.len() as f64
    }

    fn search(&self, query: &str) -> Vec<DocumentHit> {
        let mut scored: Vec<(f64, &CorpusDoc)> = self
            .corpus
            .iter()
            .map(|doc| (Self::score(query, doc), doc))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(TOP_K);

        scored
            .into_iter()
            .map(|(score, doc)| DocumentHit {
                id: doc.id.clone(),
                title: doc.title.clone(),
                content: doc.content.clone(),
                score,
                source: "vector".to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl StageProcessor for EmbeddingAgent {
    fn agent_name(&self) -> &str {
        "embedding_agent"
    }

    fn stage(&self) -> Stage {
        Stage::EmbeddingLookup
    }

    async fn process(
        &self,
        message: &TaskMessage,
        react: &ReactEmitter,
    ) -> McpResult<StageResult> {
        react.action("Searching the document store").await;

        let documents = self.search(&message.query);
        let context = documents
            .iter()
            .map(|doc| format!("{}: {}", doc.title, doc.content))
            .collect::<Vec<_>>()
            .join("\n");

        react
            .observation(format!("Found {} relevant documents", documents.len()))
            .await;

        Ok(StageResult::EmbeddingLookup { documents, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_ranks_relevant_doc_first() {
        let agent = EmbeddingAgent::with_default_corpus();
        let hits = agent.search("What is the SRE on-call rotation policy?");

        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "kb-oncall");
        assert_eq!(hits[0].source, "vector");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_unrelated_query_returns_nothing() {
        let agent = EmbeddingAgent::with_default_corpus();
        let hits = agent.search("quantum chromodynamics lattice spacing");
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_is_deterministic() {
        let agent = EmbeddingAgent::with_default_corpus();
        let first = agent.search("when is the daily standup?");
        let second = agent.search("when is the daily standup?");
        assert_eq!(first, second);
    }
}
