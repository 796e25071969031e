//! Request and response payloads of the agent protocol

use super::session::{AgentMetricsSnapshot, SessionInfo, SessionStatus};
use crate::domain::{ErrorType, ToolMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterAgentRequest {
    pub agent_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub agent_version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// 0 selects the server default
    #[serde(default)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentResponse {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
    pub server_info: ServerInfo,
    pub tools: Vec<ToolInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExample {
    pub name: String,
    pub description: String,
    pub input: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub source: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<ToolExample>,
    pub updated_at: DateTime<Utc>,
}

impl ToolInfo {
    pub fn from_metadata(metadata: ToolMetadata, include_schema: bool) -> Self {
        let (input_schema, output_schema, examples) = if include_schema {
            let examples = examples_from_schema(&metadata.input_schema);
            (Some(metadata.input_schema), metadata.output_schema, examples)
        } else {
            (None, None, Vec::new())
        };
        Self {
            name: metadata.name,
            description: metadata.description,
            version: metadata.version,
            source: metadata.source,
            tags: metadata.tags.into_iter().collect(),
            input_schema,
            output_schema,
            examples,
            updated_at: metadata.updated_at,
        }
    }
}

/// Placeholder value for one schema property. `example` wins over `default`.
fn example_value(name: &str, property: &Value) -> Value {
    if let Some(example) = property.get("example") {
        return example.clone();
    }
    if let Some(default) = property.get("default") {
        return default.clone();
    }
    if let Some(first) = property
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
    {
        return first.clone();
    }
    match property.get("type").and_then(Value::as_str) {
        Some("string") => json!(format!("<{}>", name)),
        Some("integer") => json!(1),
        Some("number") => json!(1.0),
        Some("boolean") => json!(true),
        Some("array") => json!([]),
        Some("object") => json!({}),
        _ => Value::Null,
    }
}

/// Builds invocation examples from an object schema's `properties`: one with
/// only the required fields, and one with every field when that differs.
pub fn examples_from_schema(schema: &Value) -> Vec<ToolExample> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    if properties.is_empty() {
        return Vec::new();
    }

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let full: Map<String, Value> = properties
        .iter()
        .map(|(name, property)| (name.clone(), example_value(name, property)))
        .collect();

    let mut examples = Vec::new();
    if !required.is_empty() && required.len() < full.len() {
        let minimal: Map<String, Value> = full
            .iter()
            .filter(|(name, _)| required.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        examples.push(ToolExample {
            name: "minimal".to_string(),
            description: "Required parameters only".to_string(),
            input: Value::Object(minimal),
        });
    }
    examples.push(ToolExample {
        name: "complete".to_string(),
        description: "All parameters".to_string(),
        input: Value::Object(full),
    });
    examples
}

/// Every listed tag must be present; `search` matches name or description,
/// case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolFilter {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl ToolFilter {
    pub fn matches(&self, tool: &ToolMetadata) -> bool {
        if !self.tags.iter().all(|tag| tool.has_tag(tag)) {
            return false;
        }
        if let Some(source) = &self.source {
            if &tool.source != source {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !tool.name.to_lowercase().contains(&needle)
                && !tool.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    /// 0 returns everything from the offset on
    #[serde(default)]
    pub page_size: usize,
    /// Offset returned as `next_page_token` by the previous page
    #[serde(default)]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResponse {
    pub tools: Vec<ToolInfo>,
    pub next_page_token: Option<String>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeToolRequest {
    #[serde(default)]
    pub invocation_id: Option<String>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Success,
    Failed,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Success => "success",
            InvocationStatus::Failed => "failed",
        }
    }
}

pub const TOOL_NOT_FOUND: &str = "TOOL_NOT_FOUND";
pub const EXECUTION_ERROR: &str = "EXECUTION_ERROR";
pub const TIMEOUT: &str = "TIMEOUT";
pub const TOOL_PANIC: &str = "TOOL_PANIC";

/// Failure detail carried inside a failed invocation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeToolResponse {
    pub invocation_id: String,
    pub tool_name: String,
    pub status: InvocationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    pub execution_time_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub status: Option<SessionStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub session_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_heartbeat_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusResponse {
    pub session: SessionInfo,
    pub metrics: AgentMetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_examples_prefer_example_then_default() {
        let schema = json!({
            "type": "object",
            "properties": {
                "city": { "type": "string", "example": "Lisbon" },
                "units": { "type": "string", "default": "metric" },
                "days": { "type": "integer" }
            },
            "required": ["city"]
        });

        let examples = examples_from_schema(&schema);
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].name, "minimal");
        assert_eq!(examples[0].input, json!({ "city": "Lisbon" }));
        assert_eq!(
            examples[1].input,
            json!({ "city": "Lisbon", "units": "metric", "days": 1 })
        );
    }

    #[test]
    fn test_no_properties_no_examples() {
        assert!(examples_from_schema(&json!({ "type": "object" })).is_empty());
    }

    #[test]
    fn test_filter_requires_every_tag() {
        let tool = ToolMetadata::new("weather", "Current conditions")
            .with_source("config")
            .with_tags(["net", "read"]);

        let both = ToolFilter {
            tags: vec!["net".into(), "read".into()],
            ..Default::default()
        };
        assert!(both.matches(&tool));

        let missing = ToolFilter {
            tags: vec!["net".into(), "write".into()],
            ..Default::default()
        };
        assert!(!missing.matches(&tool));

        let search = ToolFilter {
            search: Some("CONDITIONS".into()),
            source: Some("config".into()),
            ..Default::default()
        };
        assert!(search.matches(&tool));
    }
}
