//! # Control API
//!
//! HTTP surface over the coordinator, task store, broker, and state
//! manager: create task, status, progress, abort, queue status, system
//! status, analytics, and per-user history.

pub mod error;
pub mod handlers;

use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use mcp_shared::messaging::Broker;
use mcp_shared::state::StateManager;
use mcp_shared::taskstore::TaskStore;

use crate::coordinator::Coordinator;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub store: TaskStore,
    pub broker: Broker,
    pub state: StateManager,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        coordinator: Coordinator,
        store: TaskStore,
        broker: Broker,
        state: StateManager,
    ) -> Self {
        Self {
            coordinator,
            store,
            broker,
            state,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Build the control API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tasks", post(handlers::create_task))
        .route("/api/v1/tasks/{task_id}", get(handlers::get_task_status))
        .route(
            "/api/v1/tasks/{task_id}/progress",
            get(handlers::get_task_progress),
        )
        .route("/api/v1/tasks/{task_id}/abort", post(handlers::abort_task))
        .route(
            "/api/v1/tasks/history/{user_id}",
            get(handlers::get_task_history),
        )
        .route("/api/v1/queues", get(handlers::get_queue_status))
        .route("/api/v1/system/status", get(handlers::get_system_status))
        .route("/api/v1/analytics/tasks", get(handlers::get_task_analytics))
        .route(
            "/api/v1/analytics/agents",
            get(handlers::get_agent_analytics),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
