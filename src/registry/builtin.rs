use super::RegistryInner;
use crate::domain::{FunctionTool, Tool, ToolMetadata};
use anyhow::anyhow;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};

/// Reserved source for the diagnostic tools the registry installs itself.
pub const BUILTIN_SOURCE: &str = "builtin";

pub const ECHO_TOOL: &str = "echo";
pub const STATUS_TOOL: &str = "registry_status";

const BUILTIN_VERSION: &str = "1.0.0";

pub(super) fn builtin_tools(registry: Weak<RegistryInner>) -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(echo_tool()), Arc::new(status_tool(registry))]
}

fn echo_tool() -> FunctionTool {
    let metadata = ToolMetadata::new(ECHO_TOOL, "Returns its input unchanged")
        .with_version(BUILTIN_VERSION)
        .with_source(BUILTIN_SOURCE)
        .with_tags(["builtin", "diagnostic"])
        .with_input_schema(json!({
            "type": "object",
            "additionalProperties": true
        }));

    FunctionTool::new(metadata, |input: Value| async move { Ok(input) })
}

fn status_tool(registry: Weak<RegistryInner>) -> FunctionTool {
    let metadata = ToolMetadata::new(STATUS_TOOL, "Reports how many tools are registered")
        .with_version(BUILTIN_VERSION)
        .with_source(BUILTIN_SOURCE)
        .with_tags(["builtin", "diagnostic"])
        .with_input_schema(json!({ "type": "object", "properties": {} }))
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "status": { "type": "string" },
                "tool_count": { "type": "integer" }
            }
        }));

    FunctionTool::new(metadata, move |_input: Value| {
        let registry = registry.clone();
        async move {
            let inner = registry
                .upgrade()
                .ok_or_else(|| anyhow!("registry is no longer available"))?;
            let tool_count = inner.state.read().await.tools.len();
            Ok(json!({
                "status": "ok",
                "tool_count": tool_count,
                "timestamp": Utc::now().to_rfc3339(),
            }))
        }
    })
}
