//! Tools declared in configuration files
//!
//! A [`ToolConfig`] picks one behavior: fail with a fixed message, return a
//! static payload, render a Tera template against the input, or echo the
//! input back. With none set the tool acknowledges the call.

use crate::config::ToolConfig;
use crate::domain::{Tool, ToolMetadata};
use crate::registry::ToolRegistry;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tera::{Context, Tera};

pub const CONFIG_SOURCE: &str = "config";

enum Behavior {
    Fail(String),
    Static(Value),
    Template(Tera),
    Echo,
    Acknowledge,
}

pub struct ConfigTool {
    metadata: ToolMetadata,
    behavior: Behavior,
    latency: Option<Duration>,
}

impl ConfigTool {
    /// Templates are compiled here, so a broken template fails at load time.
    pub fn from_config(config: &ToolConfig) -> anyhow::Result<Self> {
        let behavior = if let Some(message) = &config.fail_with {
            Behavior::Fail(message.clone())
        } else if let Some(response) = &config.static_response {
            Behavior::Static(response.clone())
        } else if let Some(template) = &config.template {
            let mut tera = Tera::default();
            tera.add_raw_template(&config.name, template)
                .map_err(|e| anyhow::anyhow!("Invalid template for tool {}: {}", config.name, e))?;
            Behavior::Template(tera)
        } else if config.echo {
            Behavior::Echo
        } else {
            Behavior::Acknowledge
        };

        let mut metadata = ToolMetadata::new(&config.name, &config.description)
            .with_source(CONFIG_SOURCE)
            .with_tags(config.tags.iter().cloned())
            .with_input_schema(config.input_schema.clone());
        if let Some(version) = &config.version {
            metadata = metadata.with_version(version);
        }
        if let Some(schema) = &config.output_schema {
            metadata = metadata.with_output_schema(schema.clone());
        }

        Ok(Self {
            metadata,
            behavior,
            latency: config.latency_ms.map(Duration::from_millis),
        })
    }

    fn render(&self, tera: &Tera, input: &Value) -> anyhow::Result<Value> {
        let mut context = Context::new();
        if let Some(obj) = input.as_object() {
            for (k, v) in obj {
                context.insert(k, v);
            }
        }
        let rendered = tera.render(&self.metadata.name, &context)?;

        // JSON output stays structured, anything else is a plain string
        Ok(serde_json::from_str::<Value>(&rendered).unwrap_or(Value::String(rendered)))
    }
}

#[async_trait]
impl Tool for ConfigTool {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn description(&self) -> &str {
        &self.metadata.description
    }

    async fn execute(&self, input: Value) -> anyhow::Result<Value> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match &self.behavior {
            Behavior::Fail(message) => Err(anyhow::anyhow!("{}", message)),
            Behavior::Static(response) => Ok(response.clone()),
            Behavior::Template(tera) => self.render(tera, &input),
            Behavior::Echo => Ok(input),
            Behavior::Acknowledge => Ok(json!({ "status": "executed", "tool": self.metadata.name })),
        }
    }

    fn metadata(&self) -> ToolMetadata {
        self.metadata.clone()
    }
}

/// Replaces every `config`-sourced tool with the given definitions in one
/// registry step. Returns how many were registered.
pub async fn register_config_tools(
    registry: &ToolRegistry,
    configs: &[ToolConfig],
) -> anyhow::Result<usize> {
    let tools = configs
        .iter()
        .map(|config| ConfigTool::from_config(config).map(|tool| Arc::new(tool) as Arc<dyn Tool>))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(registry.replace_source(tools, CONFIG_SOURCE).await?)
}
