//! Registry change events and their admission-controlled delivery

use crate::domain::ToolMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolRegistryEventType {
    Added,
    Removed,
    Updated,
}

impl ToolRegistryEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolRegistryEventType::Added => "added",
            ToolRegistryEventType::Removed => "removed",
            ToolRegistryEventType::Updated => "updated",
        }
    }
}

/// Snapshot of one registry mutation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistryEvent {
    #[serde(rename = "type")]
    pub event_type: ToolRegistryEventType,
    pub tool_name: String,
    pub metadata: ToolMetadata,
    pub timestamp: DateTime<Utc>,
}

impl ToolRegistryEvent {
    pub(crate) fn new(event_type: ToolRegistryEventType, metadata: ToolMetadata) -> Self {
        Self {
            event_type,
            tool_name: metadata.name.clone(),
            metadata,
            timestamp: Utc::now(),
        }
    }
}

pub type HandlerId = u64;

pub(crate) type EventHandlerFn = Arc<dyn Fn(&ToolRegistryEvent) + Send + Sync>;

/// A subscribed handler: its own bounded FIFO queue drained by a dedicated
/// worker task. A full queue drops the event for that handler only.
pub(crate) struct HandlerSlot {
    pub(crate) id: HandlerId,
    active: Arc<AtomicBool>,
    queue: mpsc::Sender<Arc<ToolRegistryEvent>>,
    dropped: Arc<AtomicU64>,
}

impl HandlerSlot {
    /// Stops delivery. Events already queued are discarded by the worker.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Shared admission gate for handler executions across all subscribers.
pub(crate) struct EventDispatcher {
    permits: Arc<Semaphore>,
    queue_size: usize,
    dropped: Arc<AtomicU64>,
}

impl EventDispatcher {
    pub(crate) fn new(max_concurrent_handlers: usize, queue_size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent_handlers.max(1))),
            queue_size: queue_size.max(1),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Events discarded because a handler's queue was full
    pub(crate) fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawns the worker for a new handler. Must be called inside a tokio runtime.
    pub(crate) fn spawn_handler(&self, id: HandlerId, handler: EventHandlerFn) -> HandlerSlot {
        let (queue, mut rx) = mpsc::channel::<Arc<ToolRegistryEvent>>(self.queue_size);
        let active = Arc::new(AtomicBool::new(true));
        let permits = self.permits.clone();
        let worker_active = active.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !worker_active.load(Ordering::Acquire) {
                    break;
                }
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                // Removal may have raced the permit wait.
                if !worker_active.load(Ordering::Acquire) {
                    break;
                }

                let handler = handler.clone();
                let delivered = event.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    handler(&delivered);
                })
                .await;

                if let Err(e) = outcome {
                    if e.is_panic() {
                        error!(
                            handler_id = id,
                            tool = %event.tool_name,
                            event = event.event_type.as_str(),
                            "Registry event handler panicked"
                        );
                    } else {
                        warn!(handler_id = id, "Registry event handler was cancelled: {}", e);
                    }
                }
            }
            debug!(handler_id = id, "Registry event handler worker stopped");
        });

        HandlerSlot {
            id,
            active,
            queue,
            dropped: self.dropped.clone(),
        }
    }

    /// Queues each event for every active handler, preserving mutation order.
    /// Never blocks; delivery happens on the handler workers.
    pub(crate) fn enqueue(handlers: &[HandlerSlot], events: Vec<ToolRegistryEvent>) {
        for event in events {
            let event = Arc::new(event);
            for slot in handlers {
                match slot.queue.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        slot.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            handler_id = slot.id,
                            tool = %event.tool_name,
                            event = event.event_type.as_str(),
                            "Registry event handler queue full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!(handler_id = slot.id, "Registry event handler worker is gone");
                    }
                }
            }
        }
    }
}
