//! Control API error mapping: missing entities to 404, bad input to 400,
//! backend outages to 503, everything else to 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use mcp_shared::errors::McpError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::ServiceUnavailable(message)
            | ApiError::Internal(message) => message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}

impl From<McpError> for ApiError {
    fn from(err: McpError) -> Self {
        match &err {
            McpError::TemplateNotFound(_) | McpError::TaskNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            McpError::Configuration(_) | McpError::Schema(_) => {
                ApiError::BadRequest(err.to_string())
            }
            McpError::Messaging(_)
            | McpError::TaskStore(_)
            | McpError::Database(_)
            | McpError::Http(_)
            | McpError::QueueOverflow { .. } => ApiError::ServiceUnavailable(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
