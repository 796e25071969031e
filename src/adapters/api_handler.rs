//! Shared HTTP plumbing: application state, the response envelope and the
//! registry endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent_server::{AgentServer, AgentServerError};
use crate::domain::ToolMetadata;
use crate::learning::{LearningError, LearningService};
use crate::registry::{RegistryStats, ToolRegistry};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: ToolRegistry,
    pub agents: Arc<AgentServer>,
    pub learning: Arc<LearningService>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }
}

/// Error side of every handler, rendered into the envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "Request failed: {}", self.message);
        }
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

impl From<AgentServerError> for ApiError {
    fn from(e: AgentServerError) -> Self {
        Self::new(e.status_code(), e.to_string())
    }
}

impl From<LearningError> for ApiError {
    fn from(e: LearningError) -> Self {
        Self::new(e.status_code(), e.to_string())
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RegistryToolsQuery {
    pub source: Option<String>,
}

pub async fn list_registry_tools(
    State(state): State<AppState>,
    Query(query): Query<RegistryToolsQuery>,
) -> ApiResult<Vec<ToolMetadata>> {
    let tools = match query.source.as_deref() {
        Some(source) => state.registry.list_tools_by_source(source).await,
        None => state.registry.list_tools().await,
    };
    ok(tools)
}

pub async fn get_registry_stats(State(state): State<AppState>) -> ApiResult<RegistryStats> {
    ok(state.registry.get_registry_stats().await)
}
