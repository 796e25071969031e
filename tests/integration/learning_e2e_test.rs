use super::common;

use axum::http::StatusCode;
use common::test_server::TestServer;
use serde_json::json;

async fn invoke_times(server: &TestServer, session: &str, tool: &str, times: usize) {
    for i in 0..times {
        let (status, _) = server
            .post(
                &format!("/api/v1/sessions/{}/tools/{}/invoke", session, tool),
                json!({ "parameters": { "n": i } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    server.runtime.state.learning.collector().flush().await;
}

#[tokio::test]
async fn test_successful_invocations_show_up_in_stats() {
    let server = TestServer::new().await;
    let session = server.register("agent-stats").await;
    invoke_times(&server, &session, "echo", 5).await;

    let (status, body) = server.get("/api/v1/learning/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_executions"], 5);
    assert_eq!(body["data"]["success_rate"], 1.0);
    assert_eq!(body["data"]["top_tools"][0]["tool_name"], "echo");
}

#[tokio::test]
async fn test_successful_invocations_produce_no_error_patterns() {
    let server = TestServer::new().await;
    let session = server.register("agent-clean").await;
    invoke_times(&server, &session, "echo", 5).await;

    let (status, body) = server.post("/api/v1/learning/analyze", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let report = &body["data"];
    assert_eq!(report["stats"]["total_executions"], 5);
    assert_eq!(report["stats"]["success_rate"], 1.0);
    let patterns = report["patterns"].as_array().unwrap();
    assert!(patterns.iter().all(|p| p["type"] != "error"));

    let (_, body) = server.get("/api/v1/learning/patterns?type=error").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_timeouts_become_reliability_insight() {
    let server = TestServer::new().await;
    let session = server.register("agent-learn").await;
    invoke_times(&server, &session, "flaky_upstream", 5).await;

    let (status, body) = server.post("/api/v1/learning/analyze", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let patterns = body["data"]["patterns"].as_array().unwrap();
    let error_pattern = patterns
        .iter()
        .find(|p| p["type"] == "error")
        .expect("no error pattern");
    assert_eq!(error_pattern["frequency"], 5);
    assert_eq!(error_pattern["metadata"]["tool_name"], "flaky_upstream");
    assert_eq!(error_pattern["metadata"]["error_type"], "performance");

    let (_, body) = server
        .get("/api/v1/learning/insights?type=reliability&tool=flaky_upstream")
        .await;
    let insights = body["data"].as_array().unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0]["priority"], "low");

    let (_, body) = server
        .get("/api/v1/learning/tools/flaky_upstream/insights")
        .await;
    assert!(!body["data"].as_array().unwrap().is_empty());

    let (_, body) = server.get("/api/v1/learning/patterns?type=error").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_config_round_trip_and_validation() {
    let server = TestServer::new().await;

    let (status, body) = server.get("/api/v1/learning/config").await;
    assert_eq!(status, StatusCode::OK);
    let mut config = body["data"].clone();
    assert_eq!(config["sample_rate"], 1.0);

    config["include_successful"] = json!(false);
    let (status, body) = server.request("PUT", "/api/v1/learning/config", Some(config.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["include_successful"], false);

    config["sample_rate"] = json!(1.5);
    let (status, body) = server.request("PUT", "/api/v1/learning/config", Some(config)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = server.get("/api/v1/learning/insights?priority=urgent").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_tool_is_not_recorded() {
    let server = TestServer::new().await;
    let session = server.register("agent-ghost").await;
    invoke_times(&server, &session, "ghost", 3).await;

    let (_, body) = server.get("/api/v1/learning/stats").await;
    assert_eq!(body["data"]["total_executions"], 0);
}
