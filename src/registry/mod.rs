//! Tool Registry
//!
//! The single source of truth for which tools exist right now. Many readers
//! (session invocations) share the map with occasional writers (imports,
//! config reloads). Every mutation produces [`ToolRegistryEvent`]s that are
//! queued for subscribers while the write lock is held, so each subscriber sees
//! them in mutation order, and are executed by per-subscriber workers after the
//! lock is gone, bounded by a shared semaphore.

mod builtin;
mod events;

#[cfg(test)]
mod registry_test;

pub use builtin::{BUILTIN_SOURCE, ECHO_TOOL, STATUS_TOOL};
pub use events::{HandlerId, ToolRegistryEvent, ToolRegistryEventType};

use crate::domain::{Tool, ToolMetadata};
use chrono::{DateTime, Utc};
use events::{EventDispatcher, EventHandlerFn, HandlerSlot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const DEFAULT_SOURCE: &str = "manual";
pub const DEFAULT_VERSION: &str = "1.0.0";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Invalid tool: {0}")]
    InvalidTool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_true")]
    pub builtin_tools: bool,
    #[serde(default = "default_max_concurrent_handlers")]
    pub max_concurrent_handlers: usize,
    /// Pending events per handler before new ones are dropped
    #[serde(default = "default_handler_queue_size")]
    pub handler_queue_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_handlers() -> usize {
    50
}

fn default_handler_queue_size() -> usize {
    1024
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            builtin_tools: true,
            max_concurrent_handlers: default_max_concurrent_handlers(),
            handler_queue_size: default_handler_queue_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryStats {
    pub total_tools: usize,
    pub sources: BTreeMap<String, usize>,
    pub tags: BTreeMap<String, usize>,
    pub event_handlers: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct RegistryEntry {
    tool: Arc<dyn Tool>,
    version: String,
    source: String,
    registered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RegistryEntry {
    /// Tool-reported metadata overlaid with what the registry tracks.
    fn metadata(&self, name: &str) -> ToolMetadata {
        let mut metadata = self.tool.metadata();
        metadata.name = name.to_string();
        metadata.version = self.version.clone();
        metadata.source = self.source.clone();
        metadata.created_at = self.registered_at;
        metadata.updated_at = self.updated_at;
        metadata
    }
}

struct RegistryState {
    tools: HashMap<String, RegistryEntry>,
    handlers: Vec<HandlerSlot>,
    last_updated: Option<DateTime<Utc>>,
}

impl RegistryState {
    fn upsert(&mut self, tool: Arc<dyn Tool>, source: &str, version: &str) -> ToolRegistryEvent {
        let name = tool.name().to_string();
        let now = Utc::now();
        let (event_type, registered_at) = match self.tools.get(&name) {
            Some(existing) => {
                if existing.source != source {
                    debug!(
                        tool = %name,
                        from = %existing.source,
                        to = %source,
                        "Tool ownership reassigned"
                    );
                }
                (ToolRegistryEventType::Updated, existing.registered_at)
            }
            None => (ToolRegistryEventType::Added, now),
        };

        let entry = RegistryEntry {
            tool,
            version: version.to_string(),
            source: source.to_string(),
            registered_at,
            updated_at: now,
        };
        let metadata = entry.metadata(&name);
        self.tools.insert(name, entry);
        self.last_updated = Some(now);
        ToolRegistryEvent::new(event_type, metadata)
    }

    fn remove(&mut self, name: &str) -> Option<ToolRegistryEvent> {
        let entry = self.tools.remove(name)?;
        self.last_updated = Some(Utc::now());
        Some(ToolRegistryEvent::new(
            ToolRegistryEventType::Removed,
            entry.metadata(name),
        ))
    }

    fn entry(&self, name: &str) -> Result<&RegistryEntry, RegistryError> {
        self.tools
            .get(name)
            .ok_or_else(|| RegistryError::ToolNotFound(name.to_string()))
    }

    fn sorted_metadata<F>(&self, keep: F) -> Vec<ToolMetadata>
    where
        F: Fn(&RegistryEntry) -> bool,
    {
        let mut tools: Vec<ToolMetadata> = self
            .tools
            .iter()
            .filter(|(_, entry)| keep(entry))
            .map(|(name, entry)| entry.metadata(name))
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}

pub(crate) struct RegistryInner {
    state: RwLock<RegistryState>,
    dispatcher: EventDispatcher,
    next_handler_id: AtomicU64,
}

/// Concurrent map of tool name to implementation, version and source.
///
/// Cheap to clone; clones share the same map.
#[derive(Clone)]
pub struct ToolRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl ToolRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let inner = Arc::new_cyclic(|weak| {
            let mut state = RegistryState {
                tools: HashMap::new(),
                handlers: Vec::new(),
                last_updated: None,
            };
            if config.builtin_tools {
                for tool in builtin::builtin_tools(weak.clone()) {
                    let version = tool.metadata().version;
                    state.upsert(tool, BUILTIN_SOURCE, &version);
                }
            }
            RegistryInner {
                state: RwLock::new(state),
                dispatcher: EventDispatcher::new(config.max_concurrent_handlers, config.handler_queue_size),
                next_handler_id: AtomicU64::new(1),
            }
        });
        Self { inner }
    }

    /// Registers under the tool's own metadata source and version, falling back
    /// to [`DEFAULT_SOURCE`] and [`DEFAULT_VERSION`].
    pub async fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let metadata = tool.metadata();
        let source = non_empty_or(&metadata.source, DEFAULT_SOURCE);
        let version = non_empty_or(&metadata.version, DEFAULT_VERSION);
        self.register_with_source(tool, &source, &version).await
    }

    /// Inserts or replaces. Replacing an existing name is an update even when
    /// the source differs: the last writer owns the entry.
    pub async fn register_with_source(
        &self,
        tool: Arc<dyn Tool>,
        source: &str,
        version: &str,
    ) -> Result<(), RegistryError> {
        validate_tool(tool.as_ref())?;

        let mut state = self.inner.state.write().await;
        let event = state.upsert(tool, source, version);
        debug!(
            tool = %event.tool_name,
            source = %source,
            event = event.event_type.as_str(),
            "Tool registered"
        );
        EventDispatcher::enqueue(&state.handlers, vec![event]);
        Ok(())
    }

    /// All-or-nothing: every name is validated before anything is inserted, and
    /// the inserts happen under one write lock.
    pub async fn register_batch(
        &self,
        tools: Vec<Arc<dyn Tool>>,
        source: &str,
    ) -> Result<usize, RegistryError> {
        for tool in &tools {
            validate_tool(tool.as_ref())?;
        }

        let count = tools.len();
        let mut state = self.inner.state.write().await;
        let events: Vec<ToolRegistryEvent> = tools
            .into_iter()
            .map(|tool| {
                let version = non_empty_or(&tool.metadata().version, DEFAULT_VERSION);
                state.upsert(tool, source, &version)
            })
            .collect();
        EventDispatcher::enqueue(&state.handlers, events);
        drop(state);

        info!(source = %source, count, "Registered tool batch");
        Ok(count)
    }

    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let mut state = self.inner.state.write().await;
        let event = state
            .remove(name)
            .ok_or_else(|| RegistryError::ToolNotFound(name.to_string()))?;
        EventDispatcher::enqueue(&state.handlers, vec![event]);
        debug!(tool = %name, "Tool unregistered");
        Ok(())
    }

    /// Removes every tool owned by `source` as one atomic step. Returns how many
    /// were removed.
    pub async fn unregister_by_source(&self, source: &str) -> usize {
        let mut state = self.inner.state.write().await;
        let mut names: Vec<String> = state
            .tools
            .iter()
            .filter(|(_, entry)| entry.source == source)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        let events: Vec<ToolRegistryEvent> =
            names.iter().filter_map(|name| state.remove(name)).collect();
        let removed = events.len();
        EventDispatcher::enqueue(&state.handlers, events);
        drop(state);

        if removed > 0 {
            info!(source = %source, removed, "Unregistered tools by source");
        }
        removed
    }

    /// Swaps the whole tool set owned by `source` under one write lock, so
    /// readers see either the old set or the new one. Tools of the old set
    /// that reappear are updates, the rest are removals. All-or-nothing on
    /// validation like [`register_batch`](Self::register_batch).
    pub async fn replace_source(
        &self,
        tools: Vec<Arc<dyn Tool>>,
        source: &str,
    ) -> Result<usize, RegistryError> {
        for tool in &tools {
            validate_tool(tool.as_ref())?;
        }

        let count = tools.len();
        let incoming: std::collections::HashSet<String> =
            tools.iter().map(|tool| tool.name().to_string()).collect();

        let mut state = self.inner.state.write().await;
        let mut stale: Vec<String> = state
            .tools
            .iter()
            .filter(|(name, entry)| entry.source == source && !incoming.contains(*name))
            .map(|(name, _)| name.clone())
            .collect();
        stale.sort();

        let mut events: Vec<ToolRegistryEvent> =
            stale.iter().filter_map(|name| state.remove(name)).collect();
        events.extend(tools.into_iter().map(|tool| {
            let version = non_empty_or(&tool.metadata().version, DEFAULT_VERSION);
            state.upsert(tool, source, &version)
        }));
        EventDispatcher::enqueue(&state.handlers, events);
        drop(state);

        info!(source = %source, count, removed = stale.len(), "Replaced tools of source");
        Ok(count)
    }

    pub async fn get(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        let state = self.inner.state.read().await;
        Ok(state.entry(name)?.tool.clone())
    }

    pub async fn get_version(&self, name: &str) -> Result<String, RegistryError> {
        let state = self.inner.state.read().await;
        Ok(state.entry(name)?.version.clone())
    }

    pub async fn get_source(&self, name: &str) -> Result<String, RegistryError> {
        let state = self.inner.state.read().await;
        Ok(state.entry(name)?.source.clone())
    }

    pub async fn get_metadata(&self, name: &str) -> Result<ToolMetadata, RegistryError> {
        let state = self.inner.state.read().await;
        Ok(state.entry(name)?.metadata(name))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.state.read().await.tools.contains_key(name)
    }

    pub async fn count(&self) -> usize {
        self.inner.state.read().await.tools.len()
    }

    /// Snapshot of all metadata, sorted by name.
    pub async fn list_tools(&self) -> Vec<ToolMetadata> {
        self.inner.state.read().await.sorted_metadata(|_| true)
    }

    pub async fn list_tools_by_source(&self, source: &str) -> Vec<ToolMetadata> {
        self.inner
            .state
            .read()
            .await
            .sorted_metadata(|entry| entry.source == source)
    }

    /// Source name to number of tools it owns.
    pub async fn get_tool_sources(&self) -> BTreeMap<String, usize> {
        let state = self.inner.state.read().await;
        let mut sources = BTreeMap::new();
        for entry in state.tools.values() {
            *sources.entry(entry.source.clone()).or_insert(0) += 1;
        }
        sources
    }

    pub async fn get_registry_stats(&self) -> RegistryStats {
        let state = self.inner.state.read().await;
        let mut sources = BTreeMap::new();
        let mut tags = BTreeMap::new();
        for (name, entry) in &state.tools {
            *sources.entry(entry.source.clone()).or_insert(0) += 1;
            for tag in entry.metadata(name).tags {
                *tags.entry(tag).or_insert(0) += 1;
            }
        }
        RegistryStats {
            total_tools: state.tools.len(),
            sources,
            tags,
            event_handlers: state.handlers.len(),
            last_updated: state.last_updated,
        }
    }

    /// Subscribes to registry events. The handler runs on a blocking worker, so
    /// it may call back into the registry through `Handle::block_on`.
    pub async fn add_event_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ToolRegistryEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let handler: EventHandlerFn = Arc::new(handler);
        let mut state = self.inner.state.write().await;
        let slot = self.inner.dispatcher.spawn_handler(id, handler);
        state.handlers.push(slot);
        debug!(handler_id = id, "Registry event handler added");
        id
    }

    /// Returns false for an unknown id. After this returns true the handler
    /// receives nothing further.
    pub async fn remove_event_handler(&self, id: HandlerId) -> bool {
        let mut state = self.inner.state.write().await;
        match state.handlers.iter().position(|slot| slot.id == id) {
            Some(index) => {
                let slot = state.handlers.remove(index);
                slot.deactivate();
                debug!(handler_id = id, "Registry event handler removed");
                true
            }
            None => false,
        }
    }

    /// Events discarded because a handler fell behind its queue
    pub fn dropped_events(&self) -> u64 {
        self.inner.dispatcher.dropped_events()
    }

    #[cfg(test)]
    pub(crate) fn available_handler_permits(&self) -> usize {
        self.inner.dispatcher.available_permits()
    }
}

fn validate_tool(tool: &dyn Tool) -> Result<(), RegistryError> {
    if tool.name().trim().is_empty() {
        return Err(RegistryError::InvalidTool(
            "tool name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
