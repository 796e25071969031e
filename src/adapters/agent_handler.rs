//! HTTP mirror of the agent protocol
//!
//! Every call answers with the [`ApiResponse`](super::api_handler::ApiResponse)
//! envelope except the event stream, which is Server-Sent Events. A failed
//! tool invocation is still HTTP 200 with `status: "failed"` in the payload.

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::StreamExt;

use super::api_handler::{ok, ApiError, ApiResponse, ApiResult, AppState};
use crate::agent_server::{
    AgentEvent, AgentStatusResponse, HeartbeatRequest, HeartbeatResponse, InvokeToolRequest,
    InvokeToolResponse, ListToolsResponse, Pagination, RegisterAgentRequest,
    RegisterAgentResponse, ToolFilter, ToolInfo,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListToolsQuery {
    /// Comma separated, all must match
    pub tag: Option<String>,
    pub source: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub page_size: usize,
    pub page_token: Option<String>,
}

impl ListToolsQuery {
    fn split(self) -> (ToolFilter, Pagination) {
        let tags = self
            .tag
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        (
            ToolFilter {
                tags,
                source: self.source,
                search: self.search,
            },
            Pagination {
                page_size: self.page_size,
                page_token: self.page_token,
            },
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GetToolQuery {
    #[serde(default)]
    pub include_schema: bool,
}

pub async fn register_agent(
    State(state): State<AppState>,
    Json(request): Json<RegisterAgentRequest>,
) -> ApiResult<RegisterAgentResponse> {
    ok(state.agents.register_agent(request).await?)
}

pub async fn unregister_agent(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.agents.unregister_agent(&session_id).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn list_tools(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ListToolsQuery>,
) -> ApiResult<ListToolsResponse> {
    let (filter, page) = query.split();
    ok(state.agents.list_tools(&session_id, &filter, &page).await?)
}

pub async fn get_tool(
    State(state): State<AppState>,
    Path((session_id, name)): Path<(String, String)>,
    Query(query): Query<GetToolQuery>,
) -> ApiResult<ToolInfo> {
    ok(state
        .agents
        .get_tool(&session_id, &name, query.include_schema)
        .await?)
}

pub async fn invoke_tool(
    State(state): State<AppState>,
    Path((session_id, name)): Path<(String, String)>,
    Json(request): Json<InvokeToolRequest>,
) -> ApiResult<InvokeToolResponse> {
    ok(state.agents.invoke_tool(&session_id, &name, request).await?)
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<HeartbeatRequest>>,
) -> ApiResult<HeartbeatResponse> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    ok(state.agents.heartbeat(&session_id, request).await)
}

pub async fn get_agent_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<AgentStatusResponse> {
    ok(state.agents.get_agent_status(&session_id).await?)
}

fn to_sse(event: AgentEvent) -> Event {
    let sse = Event::default()
        .event(event.event_type.as_str())
        .id(event.event_id.clone());
    match sse.json_data(&event) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::warn!("Failed to serialize agent event: {}", e);
            Event::default().comment("unserializable event")
        }
    }
}

pub async fn stream_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = state.agents.stream_events(&session_id).await?;
    let stream = events.map(|event| Ok::<_, Infallible>(to_sse(event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
