//! # MCP Shared
//!
//! Shared foundation for the Master Control Program: the data model, error
//! taxonomy, configuration, the broker abstraction (task queues + event bus),
//! the TTL-bounded task store, durable state persistence, and the adaptive
//! recommendations client.
//!
//! Everything here is transport-agnostic at the seams: the queue layer, event
//! bus, task store, and state backend are enums with a production variant and
//! an in-memory variant, so the orchestration and worker crates can be
//! exercised end to end without live infrastructure.

pub mod adaptive;
pub mod config;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod resilience;
pub mod state;
pub mod taskstore;
pub mod types;

pub use config::McpConfig;
pub use errors::{McpError, McpResult};
