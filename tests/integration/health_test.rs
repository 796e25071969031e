use super::common;

use axum::http::StatusCode;
use common::test_server::TestServer;

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::new().await;
    let (status, body) = server.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["uptime_seconds"].is_number());
    assert!(body["version"].is_string());
    assert_eq!(body["checks"]["store"], "ok");
    assert_eq!(body["checks"]["tools"], 5);
}

#[tokio::test]
async fn test_health_ready_endpoint() {
    let server = TestServer::new().await;
    let (status, body) = server.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_health_live_endpoint() {
    let server = TestServer::new().await;
    let (status, body) = server.get("/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = TestServer::new().await;
    let session = server.register("agent-metrics").await;
    server
        .post(
            &format!("/api/v1/sessions/{}/tools/echo/invoke", session),
            serde_json::json!({ "parameters": { "x": 1 } }),
        )
        .await;

    let (status, body) = server.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = body.as_str().unwrap();
    assert!(text.contains("toolsmith_registered_tools 5"));
    assert!(text.contains("toolsmith_active_sessions 1"));
    assert!(text.contains("toolsmith_invocations_total"));
}
