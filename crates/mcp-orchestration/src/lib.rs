//! # MCP Orchestration
//!
//! The Master Control Program's coordination layer: the DAG execution engine,
//! the ReAct forwarder, system status aggregation, the control API, and the
//! runtime object that owns the long-lived background workers.

pub mod api;
pub mod coordinator;
pub mod react_forwarder;
pub mod runtime;
pub mod system_status;

pub use coordinator::{Coordinator, CoordinatorConfig, TaskRequest};
pub use react_forwarder::ReActForwarder;
pub use runtime::McpRuntime;
