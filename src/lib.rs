//! # Toolsmith - Tool Runtime with Self-Learning
//!
//! Toolsmith hosts a live catalog of tools, lets remote agents discover and
//! invoke them through sessions, and learns from every invocation.
//!
//! ## Features
//!
//! - **Tool Registry**: concurrent catalog with change events and per-source ownership
//! - **Agent Sessions**: registration, heartbeats, expiry sweeps and SSE event streams
//! - **Telemetry**: sampled, sanitized and classified execution records in SQLite
//! - **Learning**: error, latency and usage patterns turned into prioritized insights
//! - **Metrics**: Prometheus metrics for monitoring
//! - **Health Checks**: Kubernetes-ready health endpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use toolsmith::config::Settings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let settings = Settings::new()?;
//!
//!     // Server will start on configured host:port
//!     println!("{}:{}", settings.server.host, settings.server.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Domain**: plain types and the `Tool` capability trait
//! - **Registry / Agent Server / Learning**: the core services
//! - **Persistence**: the durable learning store
//! - **Adapters**: HTTP handlers, metrics, config-defined tools
//! - **Config**: configuration management

pub mod adapters;
pub mod agent_server;
pub mod cli;
pub mod config;
pub mod domain;
pub mod learning;
pub mod persistence;
pub mod registry;

use crate::adapters::api_handler::{self, AppState};
use crate::adapters::config_tool::register_config_tools;
use crate::adapters::health_handler::HealthHandler;
use crate::adapters::metrics_handler::{MetricsCollector, MetricsHandler};
use crate::adapters::{agent_handler, learning_handler};
use crate::agent_server::AgentServer;
use crate::config::Settings;
use crate::learning::LearningService;
use crate::persistence::{open_store, LearningStore};
use crate::registry::ToolRegistry;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Every long-lived service, wired together from [`Settings`].
pub struct Runtime {
    pub state: AppState,
    pub health: Arc<HealthHandler>,
    pub metrics: Arc<MetricsHandler>,
}

impl Runtime {
    pub fn router(&self) -> Router {
        create_app(self.state.clone(), self.health.clone(), self.metrics.clone())
    }

    /// Starts the session sweeper and the learning maintenance loop. Both
    /// stop on their own once the runtime is dropped.
    pub fn spawn_background_tasks(&self) {
        self.state.agents.spawn_session_sweeper();
        self.state.learning.spawn_maintenance();
    }
}

/// Opens the learning store, registers configured tools and connects the
/// agent server to the registry and the telemetry collector.
pub async fn build_runtime(settings: &Settings) -> anyhow::Result<Runtime> {
    let store: Arc<dyn LearningStore> = open_store(&settings.persistence).await?;
    let metrics_collector = Arc::new(MetricsCollector::new()?);

    let learning = Arc::new(LearningService::new(
        store,
        settings.learning.clone(),
        Some(metrics_collector.clone()),
    ));

    let registry = ToolRegistry::new(settings.registry.clone());
    let configured = register_config_tools(&registry, &settings.tools).await?;
    info!("Registered {} configured tools", configured);

    let agents = Arc::new(
        AgentServer::new(registry.clone(), (&settings.sessions).into())
            .with_collector(learning.collector())
            .with_metrics(metrics_collector.clone()),
    );
    agents.forward_registry_events().await;

    let health = Arc::new(HealthHandler::new(agents.clone(), learning.clone()));
    let metrics = Arc::new(MetricsHandler::new(metrics_collector).with_registry(registry.clone()));

    Ok(Runtime {
        state: AppState {
            registry,
            agents,
            learning,
        },
        health,
        metrics,
    })
}

/// Creates the Axum application router with all endpoints configured.
///
/// # Arguments
///
/// * `state` - Registry, agent server and learning service shared by the API handlers
/// * `health_handler` - Health check handler
/// * `metrics_handler` - Metrics collection handler
///
/// # Returns
///
/// Configured Axum Router
pub fn create_app(
    state: AppState,
    health_handler: Arc<HealthHandler>,
    metrics_handler: Arc<MetricsHandler>,
) -> Router {
    let ops_router = Router::new()
        // Health check endpoints
        .route("/health", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.health().await }
            }
        }))
        .route("/health/ready", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.ready().await }
            }
        }))
        .route("/health/live", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.live().await }
            }
        }))
        // Metrics endpoint
        .route("/metrics", get({
            let handler = metrics_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.metrics().await }
            }
        }));

    let api_router = Router::new()
        // Agent protocol
        .route("/agents", post(agent_handler::register_agent))
        .route("/sessions/:session_id", delete(agent_handler::unregister_agent))
        .route("/sessions/:session_id/tools", get(agent_handler::list_tools))
        .route("/sessions/:session_id/tools/:name", get(agent_handler::get_tool))
        .route("/sessions/:session_id/tools/:name/invoke", post(agent_handler::invoke_tool))
        .route("/sessions/:session_id/heartbeat", post(agent_handler::heartbeat))
        .route("/sessions/:session_id/status", get(agent_handler::get_agent_status))
        .route("/sessions/:session_id/events", get(agent_handler::stream_events))
        // Learning queries
        .route("/learning/stats", get(learning_handler::get_stats))
        .route("/learning/insights", get(learning_handler::list_insights))
        .route("/learning/patterns", get(learning_handler::list_patterns))
        .route("/learning/tools/:name/insights", get(learning_handler::get_tool_insights))
        .route("/learning/analyze", post(learning_handler::run_analysis))
        .route("/learning/config", get(learning_handler::get_config).put(learning_handler::update_config))
        // Registry
        .route("/registry/tools", get(api_handler::list_registry_tools))
        .route("/registry/stats", get(api_handler::get_registry_stats))
        .with_state(state);

    ops_router
        .nest("/api/v1", api_router)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}
