//! Agent Session Server
//!
//! Remote agents register to obtain a session, keep it alive with heartbeats
//! and use it to discover and invoke registry tools. Sessions that miss their
//! deadline are swept by a background task; each session can hold any number
//! of event streams that end when the session does.

mod error;
mod events;
mod session;
mod types;


pub use error::AgentServerError;
pub use events::{AgentEvent, AgentEventType, EventHub};
pub use session::{AgentMetricsSnapshot, AgentSession, SessionInfo, SessionStatus};
pub use types::{
    examples_from_schema, AgentStatusResponse, HeartbeatRequest, HeartbeatResponse,
    InvocationStatus, InvokeToolRequest, InvokeToolResponse, ListToolsResponse, Pagination,
    RegisterAgentRequest, RegisterAgentResponse, ServerInfo, ToolError, ToolExample, ToolFilter,
    ToolInfo, EXECUTION_ERROR, TIMEOUT, TOOL_NOT_FOUND, TOOL_PANIC,
};

use crate::adapters::metrics_handler::MetricsCollector;
use crate::domain::{ErrorType, ExecutionContext};
use crate::learning::{classify_error, TelemetryCollector};
use crate::registry::{HandlerId, ToolRegistry};
use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

pub const SERVER_NAME: &str = "toolsmith";
const SOURCE_TYPE: &str = "agent";

/// Session lifetimes and stream buffering
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub default_timeout: Duration,
    pub max_timeout: Duration,
    pub sweep_interval: Duration,
    pub event_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(1800),
            max_timeout: Duration::from_secs(86_400),
            sweep_interval: Duration::from_secs(60),
            event_buffer_size: 100,
        }
    }
}

pub struct AgentServer {
    registry: ToolRegistry,
    collector: Option<Arc<TelemetryCollector>>,
    sessions: RwLock<HashMap<String, Arc<AgentSession>>>,
    events: Arc<EventHub>,
    config: SessionConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl AgentServer {
    pub fn new(registry: ToolRegistry, config: SessionConfig) -> Self {
        Self {
            registry,
            collector: None,
            sessions: RwLock::new(HashMap::new()),
            events: Arc::new(EventHub::new(config.event_buffer_size)),
            config,
            metrics: None,
        }
    }

    pub fn with_collector(mut self, collector: Arc<TelemetryCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.events = Arc::new(
            EventHub::new(self.config.event_buffer_size).with_metrics(metrics.clone()),
        );
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn events(&self) -> Arc<EventHub> {
        self.events.clone()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec![
                "tool_invocation".to_string(),
                "event_streaming".to_string(),
                "learning".to_string(),
            ],
            heartbeat_interval_secs: (self.config.default_timeout.as_secs() / 3).max(1),
        }
    }

    fn resolve_timeout(&self, requested_secs: u64) -> Duration {
        if requested_secs == 0 {
            self.config.default_timeout
        } else {
            Duration::from_secs(requested_secs).min(self.config.max_timeout)
        }
    }

    /// Session that exists and has not passed its deadline
    async fn active_session(&self, session_id: &str) -> Result<Arc<AgentSession>, AgentServerError> {
        let session = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AgentServerError::Unauthenticated("unknown session".to_string()))?;
        if session.is_expired(Utc::now()).await {
            return Err(AgentServerError::Unauthenticated("session expired".to_string()));
        }
        Ok(session)
    }

    async fn known_session(&self, session_id: &str) -> Result<Arc<AgentSession>, AgentServerError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AgentServerError::NotFound(format!("session {}", session_id)))
    }

    pub async fn register_agent(
        &self,
        request: RegisterAgentRequest,
    ) -> Result<RegisterAgentResponse, AgentServerError> {
        if request.agent_id.trim().is_empty() {
            return Err(AgentServerError::InvalidArgument(
                "agent_id must not be empty".to_string(),
            ));
        }
        if request.agent_name.trim().is_empty() {
            return Err(AgentServerError::InvalidArgument(
                "agent_name must not be empty".to_string(),
            ));
        }

        let timeout = self.resolve_timeout(request.timeout_secs);
        let session = Arc::new(AgentSession::new(
            request.agent_id,
            request.agent_name,
            request.agent_version,
            request.capabilities,
            request.metadata,
            timeout,
        ));
        let expires_at = session.expires_at().await;

        let tools = self
            .registry
            .list_tools()
            .await
            .into_iter()
            .map(|metadata| ToolInfo::from_metadata(metadata, true))
            .collect();

        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        if let Some(metrics) = &self.metrics {
            metrics.active_sessions.inc();
        }

        self.events.publish(AgentEvent::new(
            AgentEventType::AgentRegistered,
            Some(&session.session_id),
            json!({ "agent_id": session.agent_id, "agent_name": session.agent_name }),
        ));
        info!(
            session_id = %session.session_id,
            agent_id = %session.agent_id,
            timeout_secs = timeout.as_secs(),
            "Agent registered"
        );

        Ok(RegisterAgentResponse {
            session_id: session.session_id.clone(),
            expires_at,
            server_info: self.server_info(),
            tools,
        })
    }

    pub async fn unregister_agent(&self, session_id: &str) -> Result<(), AgentServerError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| AgentServerError::NotFound(format!("session {}", session_id)))?;
        if let Some(metrics) = &self.metrics {
            metrics.active_sessions.dec();
        }

        self.events.publish(AgentEvent::new(
            AgentEventType::AgentUnregistered,
            Some(session_id),
            json!({ "agent_id": session.agent_id }),
        ));
        self.events.close_session(session_id);
        info!(session_id, agent_id = %session.agent_id, "Agent unregistered");
        Ok(())
    }

    /// Filters, then pages over the name-sorted tool list. Refreshes the
    /// caller's `last_heartbeat`; only `heartbeat` extends its expiry.
    pub async fn list_tools(
        &self,
        session_id: &str,
        filter: &ToolFilter,
        page: &Pagination,
    ) -> Result<ListToolsResponse, AgentServerError> {
        let session = self.active_session(session_id).await?;
        session.mark_seen(Utc::now()).await;

        let offset = match page.page_token.as_deref() {
            None | Some("") => 0,
            Some(token) => token.parse::<usize>().map_err(|_| {
                AgentServerError::InvalidArgument(format!("invalid page_token: {}", token))
            })?,
        };

        let matching: Vec<_> = self
            .registry
            .list_tools()
            .await
            .into_iter()
            .filter(|tool| filter.matches(tool))
            .collect();
        let total_count = matching.len();

        let end = if page.page_size == 0 {
            total_count
        } else {
            offset.saturating_add(page.page_size).min(total_count)
        };
        let next_page_token = (end < total_count).then(|| end.to_string());

        let tools = matching
            .into_iter()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .map(|metadata| ToolInfo::from_metadata(metadata, true))
            .collect();

        Ok(ListToolsResponse {
            tools,
            next_page_token,
            total_count,
        })
    }

    pub async fn get_tool(
        &self,
        session_id: &str,
        tool_name: &str,
        include_schema: bool,
    ) -> Result<ToolInfo, AgentServerError> {
        self.active_session(session_id).await?;
        let metadata = self
            .registry
            .get_metadata(tool_name)
            .await
            .map_err(|_| AgentServerError::NotFound(format!("tool {}", tool_name)))?;
        Ok(ToolInfo::from_metadata(metadata, include_schema))
    }

    /// Runs a tool on behalf of a session. Tool failures come back as a
    /// failed payload, never as an error of this call.
    pub async fn invoke_tool(
        &self,
        session_id: &str,
        tool_name: &str,
        request: InvokeToolRequest,
    ) -> Result<InvokeToolResponse, AgentServerError> {
        let session = self.active_session(session_id).await?;

        let invocation_id = request
            .invocation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let parameters = if request.parameters.is_null() {
            json!({})
        } else {
            request.parameters
        };

        let started = Instant::now();
        let (outcome, executed) = match self.registry.get(tool_name).await {
            Err(_) => (
                Err(ToolError {
                    code: TOOL_NOT_FOUND.to_string(),
                    message: format!("Tool not found: {}", tool_name),
                    retryable: false,
                    error_type: None,
                }),
                false,
            ),
            Ok(tool) => {
                let execution = AssertUnwindSafe(tool.execute(parameters.clone())).catch_unwind();
                let result = match request.timeout_ms.filter(|ms| *ms > 0) {
                    Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), execution).await {
                        Ok(result) => settle(result),
                        Err(_) => Err(ToolError {
                            code: TIMEOUT.to_string(),
                            message: format!("Tool execution timed out after {} ms", ms),
                            retryable: true,
                            error_type: Some(ErrorType::Performance),
                        }),
                    },
                    None => settle(execution.await),
                };
                (result, true)
            }
        };
        let elapsed = started.elapsed();
        let status = if outcome.is_ok() {
            InvocationStatus::Success
        } else {
            InvocationStatus::Failed
        };

        session
            .record_invocation(tool_name, outcome.is_ok(), elapsed)
            .await;
        if let Some(metrics) = &self.metrics {
            metrics.record_invocation(tool_name, status.as_str(), elapsed.as_secs_f64());
        }

        if executed {
            if let Some(collector) = &self.collector {
                let ctx = ExecutionContext {
                    session_id: Some(session.session_id.clone()),
                    agent_id: Some(session.agent_id.clone()),
                    invocation_id: Some(invocation_id.clone()),
                    ..ExecutionContext::new(tool_name, SOURCE_TYPE)
                };
                let (output, error) = match &outcome {
                    Ok(value) => (Some(value.clone()), None),
                    Err(e) => (None, Some(e.message.clone())),
                };
                collector.spawn_collect(ctx, parameters, output, error, elapsed);
            }
        }

        let execution_time_ms = elapsed.as_secs_f64() * 1000.0;
        self.events.publish(AgentEvent::new(
            AgentEventType::ToolInvocation,
            Some(&session.session_id),
            json!({
                "tool_name": tool_name,
                "invocation_id": invocation_id,
                "status": status,
                "execution_time_ms": execution_time_ms,
            }),
        ));

        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(e) => {
                debug!(tool = tool_name, code = %e.code, "Invocation failed: {}", e.message);
                (None, Some(e))
            }
        };
        Ok(InvokeToolResponse {
            invocation_id,
            tool_name: tool_name.to_string(),
            status,
            result,
            error,
            execution_time_ms,
        })
    }

    /// Opens an event stream scoped to the session. The stream ends when the
    /// session is unregistered or expires.
    pub async fn stream_events(
        &self,
        session_id: &str,
    ) -> Result<ReceiverStream<AgentEvent>, AgentServerError> {
        let session = self.active_session(session_id).await?;
        Ok(self.events.subscribe(&session.session_id))
    }

    /// Extends the session's deadline. A session already removed reports
    /// `session_valid: false`; one past its deadline but not yet swept is
    /// kept alive.
    pub async fn heartbeat(&self, session_id: &str, request: HeartbeatRequest) -> HeartbeatResponse {
        // The sweep removes under the write lock, so touching under the read
        // guard never revives a session that is already gone.
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(session) => {
                let expires_at = session.touch(Utc::now(), request.status).await;
                HeartbeatResponse {
                    session_valid: true,
                    expires_at: Some(expires_at),
                    next_heartbeat_deadline: Some(expires_at),
                }
            }
            None => HeartbeatResponse {
                session_valid: false,
                expires_at: None,
                next_heartbeat_deadline: None,
            },
        }
    }

    pub async fn get_agent_status(
        &self,
        session_id: &str,
    ) -> Result<AgentStatusResponse, AgentServerError> {
        let session = self.known_session(session_id).await?;
        Ok(AgentStatusResponse {
            session: session.info().await,
            metrics: session.metrics_snapshot().await,
        })
    }

    /// Removes every session past its deadline and ends its streams. Returns
    /// the removed session ids.
    pub async fn sweep_expired_sessions(&self) -> Vec<String> {
        let now = Utc::now();
        let snapshot: Vec<Arc<AgentSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut candidates = Vec::new();
        for session in snapshot {
            if session.is_expired(now).await {
                candidates.push(session.session_id.clone());
            }
        }
        if candidates.is_empty() {
            return candidates;
        }

        let mut removed = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            for id in candidates {
                // A heartbeat may have landed since the snapshot.
                let still_expired = match sessions.get(&id) {
                    Some(session) => session.is_expired(now).await,
                    None => false,
                };
                if still_expired {
                    sessions.remove(&id);
                    removed.push(id);
                }
            }
        }

        for id in &removed {
            if let Some(metrics) = &self.metrics {
                metrics.active_sessions.dec();
            }
            self.events.publish(AgentEvent::new(
                AgentEventType::SessionExpired,
                Some(id),
                json!({ "session_id": id }),
            ));
            self.events.close_session(id);
            info!(session_id = %id, "Session expired");
        }
        removed
    }

    /// Periodic sweep on `sweep_interval`. Ends once the server is dropped.
    pub fn spawn_session_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(server) = weak.upgrade() else {
                    break;
                };
                let removed = server.sweep_expired_sessions().await;
                if !removed.is_empty() {
                    debug!(count = removed.len(), "Expired sessions swept");
                }
            }
        })
    }

    /// Republishes registry mutations to every open stream as `tools_changed`.
    pub async fn forward_registry_events(&self) -> HandlerId {
        let events = self.events.clone();
        self.registry
            .add_event_handler(move |event| {
                events.publish(AgentEvent::new(
                    AgentEventType::ToolsChanged,
                    None,
                    json!({
                        "change": event.event_type,
                        "tool_name": event.tool_name,
                        "version": event.metadata.version,
                    }),
                ));
            })
            .await
    }
}

fn settle(
    result: Result<anyhow::Result<Value>, Box<dyn std::any::Any + Send>>,
) -> Result<Value, ToolError> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            let message = format!("{:#}", e);
            let error_type = classify_error(&message);
            Err(ToolError {
                code: EXECUTION_ERROR.to_string(),
                retryable: error_type.is_retryable(),
                error_type: Some(error_type),
                message,
            })
        }
        Err(_) => {
            warn!("Tool panicked during execution");
            Err(ToolError {
                code: TOOL_PANIC.to_string(),
                message: "Tool panicked during execution".to_string(),
                retryable: false,
                error_type: Some(ErrorType::Logic),
            })
        }
    }
}
