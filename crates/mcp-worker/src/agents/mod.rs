//! # Stage Agents
//!
//! Deterministic heuristic bodies for the five stages. In production
//! deployments each of these fronts an external collaborator (an LLM
//! provider, a document-vector store, a web-search provider); the inference
//! itself is outside the core, so these implementations exercise the full
//! contract (ReAct emission, stage results, personalization hints) with
//! reproducible outputs.

pub mod embedding;
pub mod executor;
pub mod intent;
pub mod moderator;
pub mod websearch;

pub use embedding::EmbeddingAgent;
pub use executor::ExecutorAgent;
pub use intent::IntentAgent;
pub use moderator::ModeratorAgent;
pub use websearch::WebSearchAgent;
