//! Live event feed for agent sessions
//!
//! Each stream subscriber owns a bounded channel. Publishing never waits: a
//! full channel drops the event for that subscriber only, and a closed one is
//! pruned on the next publish.

use crate::adapters::metrics_handler::MetricsCollector;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventType {
    Connected,
    AgentRegistered,
    AgentUnregistered,
    ToolInvocation,
    SessionExpired,
    ToolsChanged,
}

impl AgentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentEventType::Connected => "connected",
            AgentEventType::AgentRegistered => "agent_registered",
            AgentEventType::AgentUnregistered => "agent_unregistered",
            AgentEventType::ToolInvocation => "tool_invocation",
            AgentEventType::SessionExpired => "session_expired",
            AgentEventType::ToolsChanged => "tools_changed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: AgentEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl AgentEvent {
    pub fn new(event_type: AgentEventType, session_id: Option<&str>, data: Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type,
            session_id: session_id.map(str::to_string),
            timestamp: Utc::now(),
            data,
        }
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<AgentEvent>,
}

pub struct EventHub {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    buffer_size: usize,
    next_id: AtomicU64,
    dropped: AtomicU64,
    metrics: Option<Arc<MetricsCollector>>,
}

impl EventHub {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer_size: buffer_size.max(1),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Opens a stream scoped to `session_id`. The first item is always a
    /// `connected` event.
    pub fn subscribe(&self, session_id: &str) -> ReceiverStream<AgentEvent> {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let connected = AgentEvent::new(
            AgentEventType::Connected,
            Some(session_id),
            json!({ "subscriber_id": id }),
        );
        // Fresh channel with capacity >= 1 cannot be full.
        let _ = tx.try_send(connected);

        self.subscribers
            .write()
            .entry(session_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        debug!(session_id, subscriber_id = id, "Event stream opened");

        ReceiverStream::new(rx)
    }

    /// Delivers to every subscriber without blocking.
    pub fn publish(&self, event: AgentEvent) {
        let mut closed: Vec<(String, u64)> = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for (session_id, subs) in subscribers.iter() {
                for sub in subs {
                    match sub.tx.try_send(event.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            if let Some(metrics) = &self.metrics {
                                metrics.stream_events_dropped.inc();
                            }
                            warn!(
                                session_id = %session_id,
                                subscriber_id = sub.id,
                                event = event.event_type.as_str(),
                                "Subscriber buffer full, dropping event"
                            );
                        }
                        Err(TrySendError::Closed(_)) => {
                            closed.push((session_id.clone(), sub.id));
                        }
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write();
            for (session_id, id) in closed {
                if let Some(subs) = subscribers.get_mut(&session_id) {
                    subs.retain(|sub| sub.id != id);
                    if subs.is_empty() {
                        subscribers.remove(&session_id);
                    }
                }
            }
        }
    }

    /// Ends every stream scoped to `session_id`. Safe to call repeatedly.
    pub fn close_session(&self, session_id: &str) -> usize {
        let removed = self
            .subscribers
            .write()
            .remove(session_id)
            .map(|subs| subs.len())
            .unwrap_or(0);
        if removed > 0 {
            debug!(session_id, removed, "Event streams closed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().values().map(Vec::len).sum()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
