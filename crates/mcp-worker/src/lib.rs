//! # MCP Worker
//!
//! The reusable agent harness and the stage agents. An agent implementer
//! writes one [`harness::StageProcessor`]; the harness owns everything else:
//! consuming the stage queue, ReAct emission, result persistence, completion
//! events, performance samples, acknowledgment discipline, and heartbeats.

pub mod agents;
pub mod harness;

pub use harness::{AgentHarness, HarnessConfig, ReactEmitter, StageProcessor};
