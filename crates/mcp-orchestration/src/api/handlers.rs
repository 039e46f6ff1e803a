//! Control API handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mcp_shared::errors::McpError;
use mcp_shared::messaging::QueueStatus;
use mcp_shared::state::{AgentPerformanceSummary, TaskAnalytics, TaskHistoryEntry};
use mcp_shared::types::{ReActStep, TaskRecord};

use crate::coordinator::TaskRequest;
use crate::system_status::{self, SystemStatus};

use super::{AppState, ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub task_id: Uuid,
    pub status: &'static str,
    pub template: String,
    pub user_id: String,
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<CreateTaskResponse>, ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query is required".to_string()));
    }

    let record = state
        .coordinator
        .create_and_execute(TaskRequest {
            user_id: request.user_id,
            query: request.query,
            template: request.template,
            conversation_id: request.conversation_id,
        })
        .await?;

    Ok(Json(CreateTaskResponse {
        task_id: record.task_id,
        status: "created",
        template: record.template,
        user_id: record.user_id,
    }))
}

pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskRecord>, ApiError> {
    let record = state
        .coordinator
        .get_task_status(task_id)
        .await?
        .ok_or(McpError::TaskNotFound(task_id))?;
    Ok(Json(record))
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub task_id: Uuid,
    pub status: String,
    pub progress_percentage: u8,
    pub current_stage: Option<String>,
    pub thinking_steps: Vec<ReActStep>,
    pub total_stages: usize,
    pub completed_stages: Vec<String>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

/// Polling snapshot of one task's progress. Streaming clients should prefer
/// subscribing to the progress channel and replaying the stream tail; this
/// endpoint serves simple callers a consistent snapshot.
pub async fn get_task_progress(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let record = state
        .store
        .get_task(task_id)
        .await?
        .ok_or(McpError::TaskNotFound(task_id))?;
    let thinking_steps = state.store.react_stream(task_id).await?;

    Ok(Json(ProgressResponse {
        task_id,
        status: record.status.as_str().to_string(),
        progress_percentage: record.progress_percentage,
        current_stage: record.current_stage.map(|stage| stage.as_str().to_string()),
        thinking_steps,
        total_stages: record.plan.len(),
        completed_stages: record
            .completed_stages
            .iter()
            .map(|stage| stage.as_str().to_string())
            .collect(),
        last_updated: record.updated_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct AbortResponse {
    pub task_id: Uuid,
    pub status: String,
}

/// Abort is idempotent: aborting an already-terminal task reports that
/// terminal status without transitioning anything.
pub async fn abort_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<AbortResponse>, ApiError> {
    let record = state.coordinator.abort_task(task_id).await?;
    Ok(Json(AbortResponse {
        task_id,
        status: record.status.as_str().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    10
}

pub async fn get_task_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TaskHistoryEntry>>, ApiError> {
    let history = state.state.get_task_history(&user_id, query.limit).await?;
    Ok(Json(history))
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub queues: Vec<QueueStatus>,
}

pub async fn get_queue_status(
    State(state): State<AppState>,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    let health = state.broker.health_check().await;
    if !health.queues_connected {
        return Err(ApiError::ServiceUnavailable(
            "task broker unreachable".to_string(),
        ));
    }

    Ok(Json(QueueStatusResponse {
        queues: state.broker.all_queue_statuses().await,
    }))
}

/// Never errors; reports what it can see and degrades the rest.
pub async fn get_system_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let status = system_status::collect(
        &state.coordinator,
        &state.broker,
        &state.store,
        &state.state,
        state.uptime_seconds(),
    )
    .await;
    Json(status)
}

#[derive(Debug, Deserialize)]
pub struct HoursQuery {
    #[serde(default = "default_hours")]
    pub hours: i64,
}

fn default_hours() -> i64 {
    24
}

pub async fn get_task_analytics(
    State(state): State<AppState>,
    Query(query): Query<HoursQuery>,
) -> Result<Json<TaskAnalytics>, ApiError> {
    let analytics = state.state.get_task_analytics(query.hours).await?;
    Ok(Json(analytics))
}

pub async fn get_agent_analytics(
    State(state): State<AppState>,
    Query(query): Query<HoursQuery>,
) -> Result<Json<AgentPerformanceSummary>, ApiError> {
    let summary = state
        .state
        .get_agent_performance_summary(query.hours)
        .await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value as JsonValue};
    use std::time::Duration;
    use tower::util::ServiceExt;

    use mcp_shared::adaptive::AdaptiveClient;
    use mcp_shared::messaging::Broker;
    use mcp_shared::state::StateManager;
    use mcp_shared::taskstore::TaskStore;

    use crate::coordinator::{Coordinator, CoordinatorConfig};

    fn app() -> axum::Router {
        let store = TaskStore::new_in_memory(Duration::from_secs(600));
        let broker = Broker::in_memory(1000);
        let state = StateManager::new_in_memory();
        let coordinator = Coordinator::new(
            store.clone(),
            broker.clone(),
            state.clone(),
            AdaptiveClient::disabled(),
            CoordinatorConfig {
                stage_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        super::super::router(AppState::new(coordinator, store, broker, state))
    }

    async fn body_json(response: axum::response::Response) -> JsonValue {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: JsonValue) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_task_returns_created() {
        let app = app();
        let response = app
            .oneshot(post_json(
                "/api/v1/tasks",
                json!({"user_id": "u1", "query": "what is the policy?"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "created");
        assert_eq!(body["template"], "standard_query");
        assert_eq!(body["user_id"], "u1");
        assert!(body["task_id"].is_string());
    }

    #[tokio::test]
    async fn test_create_task_missing_fields_is_400() {
        let app = app();
        let response = app
            .oneshot(post_json("/api/v1/tasks", json!({"user_id": "u1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_task_unknown_template_is_404() {
        let app = app();
        let response = app
            .oneshot(post_json(
                "/api/v1/tasks",
                json!({"user_id": "u1", "query": "q", "template": "nope"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_status_unknown_task_is_404() {
        let app = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/tasks/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_progress_snapshot_shape() {
        let app = app();
        let created = app
            .clone()
            .oneshot(post_json(
                "/api/v1/tasks",
                json!({"user_id": "u1", "query": "q", "template": "quick_answer"}),
            ))
            .await
            .unwrap();
        let task_id = body_json(created).await["task_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/tasks/{task_id}/progress"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total_stages"], 3);
        assert!(body["thinking_steps"].is_array());
        assert!(body["progress_percentage"].is_number());
    }

    #[tokio::test]
    async fn test_abort_then_abort_again_reports_aborted() {
        let app = app();
        let created = app
            .clone()
            .oneshot(post_json(
                "/api/v1/tasks",
                json!({"user_id": "u1", "query": "q"}),
            ))
            .await
            .unwrap();
        let task_id = body_json(created).await["task_id"]
            .as_str()
            .unwrap()
            .to_string();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_json(
                    &format!("/api/v1/tasks/{task_id}/abort"),
                    json!({}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["status"], "aborted");
        }
    }

    #[tokio::test]
    async fn test_queue_status_lists_known_queues() {
        let app = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/queues")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let queues = body["queues"].as_array().unwrap();
        assert_eq!(queues.len(), 6);
    }

    #[tokio::test]
    async fn test_system_status_never_errors() {
        let app = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/system/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["overall_health"], "healthy");
    }

    #[tokio::test]
    async fn test_analytics_endpoints_respond() {
        let app = app();
        for uri in [
            "/api/v1/analytics/tasks?hours=24",
            "/api/v1/analytics/agents?hours=24",
        ] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["period"], "last_24_hours");
        }
    }
}
