use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent_server::AgentServer;
use crate::learning::LearningService;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub store: String,
    pub tools: usize,
    pub sessions: usize,
}

pub struct HealthHandler {
    agents: Arc<AgentServer>,
    learning: Arc<LearningService>,
    start_time: std::time::Instant,
}

impl HealthHandler {
    pub fn new(agents: Arc<AgentServer>, learning: Arc<LearningService>) -> Self {
        Self {
            agents,
            learning,
            start_time: std::time::Instant::now(),
        }
    }

    /// Overall status with component checks. Degraded when the store is
    /// unreachable.
    pub async fn health(&self) -> impl IntoResponse {
        let store = match self.learning.health_check().await {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("error: {}", e),
        };
        let status = if store == "ok" { "healthy" } else { "degraded" };

        let body = HealthStatus {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            checks: HealthChecks {
                store,
                tools: self.agents.registry().count().await,
                sessions: self.agents.session_count().await,
            },
        };

        (StatusCode::OK, Json(body))
    }

    /// Readiness check - ready once the learning store answers
    pub async fn ready(&self) -> impl IntoResponse {
        match self.learning.health_check().await {
            Ok(()) => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "ready",
                    "message": "Server is ready to accept requests"
                })),
            ),
            Err(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "message": format!("Learning store unavailable: {}", e)
                })),
            ),
        }
    }

    /// Liveness check - returns 200 if server is alive
    pub async fn live(&self) -> impl IntoResponse {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "alive",
                "message": "Server is alive"
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_server::SessionConfig;
    use crate::learning::LearningConfig;
    use crate::persistence::{open_store, LearningStore, PersistenceConfig};
    use crate::registry::{RegistryConfig, ToolRegistry};

    async fn handler() -> (HealthHandler, Arc<dyn LearningStore>) {
        let store: Arc<dyn LearningStore> = open_store(&PersistenceConfig {
            url: "sqlite::memory:".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        let agents = Arc::new(AgentServer::new(
            ToolRegistry::new(RegistryConfig::default()),
            SessionConfig::default(),
        ));
        let learning = Arc::new(LearningService::new(
            store.clone(),
            LearningConfig::default(),
            None,
        ));
        (HealthHandler::new(agents, learning), store)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (handler, _store) = handler().await;
        let response = handler.health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_follows_store() {
        let (handler, store) = handler().await;
        let response = handler.ready().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        store.close().await;
        let response = handler.ready().await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_live_endpoint() {
        let (handler, _store) = handler().await;
        let response = handler.live().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
