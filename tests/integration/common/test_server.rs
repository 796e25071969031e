use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use toolsmith::config::{Settings, ToolConfig};
use toolsmith::persistence::PersistenceConfig;
use toolsmith::Runtime;
use tower::ServiceExt;

/// A fully wired runtime over a throwaway SQLite file.
pub struct TestServer {
    pub runtime: Runtime,
    pub app: Router,
    _dir: TempDir,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_tools(default_tools()).await
    }

    pub async fn with_tools(tools: Vec<ToolConfig>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            persistence: PersistenceConfig {
                url: format!("sqlite://{}", dir.path().join("learning.db").display()),
                ..Default::default()
            },
            tools,
            ..Default::default()
        };

        let runtime = toolsmith::build_runtime(&settings).await.unwrap();
        let app = runtime.router();
        TestServer {
            runtime,
            app,
            _dir: dir,
        }
    }

    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body)).await
    }

    /// Registers an agent and returns its session id.
    pub async fn register(&self, agent_id: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/agents",
                json!({ "agent_id": agent_id, "agent_name": "Test Agent" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["data"]["session_id"].as_str().unwrap().to_string()
    }
}

pub fn tool(value: Value) -> ToolConfig {
    serde_json::from_value(value).unwrap()
}

fn default_tools() -> Vec<ToolConfig> {
    vec![
        tool(json!({
            "name": "weather",
            "description": "Current weather for a city",
            "tags": ["net", "read"],
            "input_schema": {
                "type": "object",
                "properties": { "city": { "type": "string", "example": "Oslo" } },
                "required": ["city"]
            },
            "static_response": { "temperature": 21 }
        })),
        tool(json!({
            "name": "flaky_upstream",
            "description": "Always times out",
            "tags": ["net"],
            "fail_with": "upstream request timed out"
        })),
        tool(json!({
            "name": "greet",
            "description": "Renders a greeting",
            "template": "Hello {{ name }}!"
        })),
    ]
}
