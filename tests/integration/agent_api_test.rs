use super::common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::test_server::TestServer;
use http_body_util::BodyExt;
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test]
async fn test_register_returns_catalog() {
    let server = TestServer::new().await;
    let (status, body) = server
        .post(
            "/api/v1/agents",
            json!({
                "agent_id": "agent-1",
                "agent_name": "Planner",
                "capabilities": ["tools"],
                "timeout_secs": 120
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["server_info"]["name"], "toolsmith");

    let names: Vec<&str> = body["data"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"weather"));
    assert!(names.contains(&"echo"));
}

#[tokio::test]
async fn test_register_rejects_blank_agent() {
    let server = TestServer::new().await;
    let (status, body) = server
        .post("/api/v1/agents", json!({ "agent_id": "  ", "agent_name": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_unknown_session_is_unauthenticated() {
    let server = TestServer::new().await;
    let (status, _) = server.get("/api/v1/sessions/nope/tools").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server.get("/api/v1/sessions/nope/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_tools_filters_and_pages() {
    let server = TestServer::new().await;
    let session = server.register("agent-filter").await;

    let (status, body) = server
        .get(&format!("/api/v1/sessions/{}/tools?tag=net,read", session))
        .await;
    assert_eq!(status, StatusCode::OK);
    let tools = body["data"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "weather");

    let (_, body) = server
        .get(&format!("/api/v1/sessions/{}/tools?source=config&page_size=2", session))
        .await;
    assert_eq!(body["data"]["total_count"], 3);
    assert_eq!(body["data"]["tools"].as_array().unwrap().len(), 2);
    let token = body["data"]["next_page_token"].as_str().unwrap().to_string();

    let (_, body) = server
        .get(&format!(
            "/api/v1/sessions/{}/tools?source=config&page_size=2&page_token={}",
            session, token
        ))
        .await;
    assert_eq!(body["data"]["tools"].as_array().unwrap().len(), 1);
    assert!(body["data"]["next_page_token"].is_null());

    let (status, _) = server
        .get(&format!("/api/v1/sessions/{}/tools?page_token=banana", session))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_tool_with_schema_and_examples() {
    let server = TestServer::new().await;
    let session = server.register("agent-schema").await;

    let (status, body) = server
        .get(&format!(
            "/api/v1/sessions/{}/tools/weather?include_schema=true",
            session
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["input_schema"]["required"][0], "city");
    let examples = body["data"]["examples"].as_array().unwrap();
    assert!(examples.iter().any(|e| e["input"]["city"] == "Oslo"));

    let (status, _) = server
        .get(&format!("/api/v1/sessions/{}/tools/ghost", session))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invoke_success_and_failure_payloads() {
    let server = TestServer::new().await;
    let session = server.register("agent-invoke").await;

    let (status, body) = server
        .post(
            &format!("/api/v1/sessions/{}/tools/greet/invoke", session),
            json!({ "invocation_id": "inv-1", "parameters": { "name": "Ada" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["invocation_id"], "inv-1");
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["result"], "Hello Ada!");

    let (status, body) = server
        .post(
            &format!("/api/v1/sessions/{}/tools/flaky_upstream/invoke", session),
            json!({ "parameters": {} }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "failed");
    assert_eq!(body["data"]["error"]["code"], "EXECUTION_ERROR");
    assert_eq!(body["data"]["error"]["error_type"], "performance");
    assert_eq!(body["data"]["error"]["retryable"], true);

    let (_, body) = server
        .post(
            &format!("/api/v1/sessions/{}/tools/ghost/invoke", session),
            json!({}),
        )
        .await;
    assert_eq!(body["data"]["error"]["code"], "TOOL_NOT_FOUND");
    assert_eq!(body["data"]["error"]["retryable"], false);

    let (status, body) = server
        .get(&format!("/api/v1/sessions/{}/status", session))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["metrics"]["total_invocations"], 3);
    assert_eq!(body["data"]["metrics"]["successful_invocations"], 1);
}

#[tokio::test]
async fn test_heartbeat_and_unregister() {
    let server = TestServer::new().await;
    let session = server.register("agent-hb").await;

    let (status, body) = server
        .post(
            &format!("/api/v1/sessions/{}/heartbeat", session),
            json!({ "status": "busy" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["session_valid"], true);

    let (_, body) = server
        .get(&format!("/api/v1/sessions/{}/status", session))
        .await;
    assert_eq!(body["data"]["session"]["status"], "busy");

    let (status, body) = server
        .request("DELETE", &format!("/api/v1/sessions/{}", session), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = server
        .post(&format!("/api/v1/sessions/{}/heartbeat", session), json!({}))
        .await;
    assert_eq!(body["data"]["session_valid"], false);

    let (status, _) = server
        .request("DELETE", &format!("/api/v1/sessions/{}", session), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_stream_opens_with_connected() {
    let server = TestServer::new().await;
    let session = server.register("agent-sse").await;

    let request = Request::builder()
        .uri(format!("/api/v1/sessions/{}/events", session))
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("stream produced no event")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: connected"));
    assert!(text.contains(&session));
}

#[tokio::test]
async fn test_registry_endpoints() {
    let server = TestServer::new().await;

    let (status, body) = server.get("/api/v1/registry/tools?source=config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (_, body) = server.get("/api/v1/registry/stats").await;
    assert_eq!(body["data"]["total_tools"], 5);
    assert_eq!(body["data"]["sources"]["config"], 3);
}
