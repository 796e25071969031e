use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Idle,
    Busy,
    Error,
}

#[derive(Debug)]
struct SessionState {
    last_heartbeat: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: SessionStatus,
}

#[derive(Debug, Default)]
struct AgentMetrics {
    total_invocations: u64,
    successful_invocations: u64,
    failed_invocations: u64,
    total_response_time_ms: f64,
    last_invocation: Option<DateTime<Utc>>,
    tool_usage: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetricsSnapshot {
    pub total_invocations: u64,
    pub successful_invocations: u64,
    pub failed_invocations: u64,
    pub total_response_time_ms: f64,
    pub average_response_time_ms: f64,
    pub last_invocation: Option<DateTime<Utc>>,
    pub tool_usage_count: HashMap<String, u64>,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub agent_version: String,
    pub capabilities: Vec<String>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
}

/// A registered agent. Identity fields never change after registration;
/// liveness and counters sit behind their own locks.
#[derive(Debug)]
pub struct AgentSession {
    pub session_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub agent_version: String,
    pub capabilities: Vec<String>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub timeout: Duration,
    state: RwLock<SessionState>,
    metrics: Mutex<AgentMetrics>,
}

impl AgentSession {
    pub fn new(
        agent_id: String,
        agent_name: String,
        agent_version: String,
        capabilities: Vec<String>,
        metadata: HashMap<String, Value>,
        timeout: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            agent_id,
            agent_name,
            agent_version,
            capabilities,
            metadata,
            created_at: now,
            timeout,
            state: RwLock::new(SessionState {
                last_heartbeat: now,
                expires_at: now + chrono_duration(timeout),
                status: SessionStatus::Active,
            }),
            metrics: Mutex::new(AgentMetrics::default()),
        }
    }

    pub async fn expires_at(&self) -> DateTime<Utc> {
        self.state.read().await.expires_at
    }

    pub async fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.state.read().await.expires_at
    }

    /// Records a heartbeat. Expiry only ever moves forward.
    pub async fn touch(&self, now: DateTime<Utc>, status: Option<SessionStatus>) -> DateTime<Utc> {
        let mut state = self.state.write().await;
        state.last_heartbeat = now;
        state.expires_at = state.expires_at.max(now + chrono_duration(self.timeout));
        if let Some(status) = status {
            state.status = status;
        }
        state.expires_at
    }

    /// Refreshes `last_heartbeat` without extending the deadline.
    pub async fn mark_seen(&self, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.last_heartbeat = state.last_heartbeat.max(now);
    }

    pub async fn record_invocation(&self, tool_name: &str, success: bool, elapsed: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_invocations += 1;
        if success {
            metrics.successful_invocations += 1;
        } else {
            metrics.failed_invocations += 1;
        }
        metrics.total_response_time_ms += elapsed.as_secs_f64() * 1000.0;
        metrics.last_invocation = Some(Utc::now());
        *metrics.tool_usage.entry(tool_name.to_string()).or_insert(0) += 1;
    }

    pub async fn metrics_snapshot(&self) -> AgentMetricsSnapshot {
        let metrics = self.metrics.lock().await;
        let average = if metrics.total_invocations == 0 {
            0.0
        } else {
            metrics.total_response_time_ms / metrics.total_invocations as f64
        };
        AgentMetricsSnapshot {
            total_invocations: metrics.total_invocations,
            successful_invocations: metrics.successful_invocations,
            failed_invocations: metrics.failed_invocations,
            total_response_time_ms: metrics.total_response_time_ms,
            average_response_time_ms: average,
            last_invocation: metrics.last_invocation,
            tool_usage_count: metrics.tool_usage.clone(),
        }
    }

    pub async fn info(&self) -> SessionInfo {
        let state = self.state.read().await;
        SessionInfo {
            session_id: self.session_id.clone(),
            agent_id: self.agent_id.clone(),
            agent_name: self.agent_name.clone(),
            agent_version: self.agent_version.clone(),
            capabilities: self.capabilities.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            last_heartbeat: state.last_heartbeat,
            expires_at: state.expires_at,
            status: state.status,
        }
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
