use config::{Config, File};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

pub mod validator;

use crate::agent_server::SessionConfig;
use crate::cli::Cli;
use crate::learning::LearningConfig;
use crate::persistence::PersistenceConfig;
use crate::registry::RegistryConfig;

pub const CONFIG_FILE_STEM: &str = "toolsmith";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub sessions: SessionSettings,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Declarative tools, registered under the `config` source
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    #[serde(default = "default_session_timeout")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,
    /// Upper bound for timeouts requested at registration
    #[serde(default = "default_max_timeout")]
    pub max_timeout_secs: u64,
}

fn default_session_timeout() -> u64 {
    1800
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_event_buffer() -> usize {
    100
}

fn default_max_timeout() -> u64 {
    86_400
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_session_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            event_buffer_size: default_event_buffer(),
            max_timeout_secs: default_max_timeout(),
        }
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        SessionConfig {
            default_timeout: Duration::from_secs(settings.default_timeout_secs),
            max_timeout: Duration::from_secs(settings.max_timeout_secs),
            sweep_interval: Duration::from_secs(settings.sweep_interval_secs),
            event_buffer_size: settings.event_buffer_size,
        }
    }
}

/// A tool defined entirely in configuration. At most one behavior field
/// (`fail_with`, `static_response`, `template`, `echo`) may be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub static_response: Option<Value>,
    /// Tera template rendered with the input object as context
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub echo: bool,
    /// Error message returned on every call
    #[serde(default)]
    pub fail_with: Option<String>,
    /// Artificial delay before responding
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

fn default_input_schema() -> Value {
    json!({ "type": "object" })
}

impl ToolConfig {
    pub fn behavior_count(&self) -> usize {
        [
            self.fail_with.is_some(),
            self.static_response.is_some(),
            self.template.is_some(),
            self.echo,
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_root(".")
    }

    /// Create settings from CLI arguments (config file, then CLI and env overrides)
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let config_path = &cli.config;
        let root = config_path
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or(".");

        let mut settings = Self::load(File::from(config_path.clone()).required(false))?;
        settings.apply_cli_overrides(cli);
        settings.load_external_configs(root)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_root(root: &str) -> Result<Self, anyhow::Error> {
        let config_path = Path::new(root).join(CONFIG_FILE_STEM);
        let mut settings = Self::load(File::from(config_path).required(false))?;
        settings.load_external_configs(root)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load<S>(source: S) -> Result<Self, anyhow::Error>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let s = Config::builder()
            .add_source(source)
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .build()?;
        Ok(s.try_deserialize()?)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        validator::ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                error_messages.join("\n")
            )
        })
    }

    /// CLI > env vars > config file
    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(url) = &cli.database_url {
            self.persistence.url = url.clone();
        }
    }

    fn load_external_configs(&mut self, root: &str) -> Result<(), anyhow::Error> {
        let dir = Path::new(root).join("config").join("tools");
        let tools = load_tools_from_dir(&dir)?;
        if !tools.is_empty() {
            tracing::debug!(count = tools.len(), dir = %dir.display(), "Loaded tool definitions");
        }
        self.tools.extend(tools);
        Ok(())
    }
}

/// Reads every `*.json`, `*.yaml`, `*.yml` and `*.toml` file in `dir` as one
/// tool definition, in file name order. A missing directory yields nothing.
pub fn load_tools_from_dir(dir: &Path) -> Result<Vec<ToolConfig>, anyhow::Error> {
    let pattern = format!("{}/*", dir.display());
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern)? {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => tracing::warn!("Failed to read glob entry: {}", e),
        }
    }
    paths.sort();

    let mut tools = Vec::new();
    for path in paths {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !matches!(ext, "json" | "yaml" | "yml" | "toml") {
            continue;
        }
        let content = std::fs::read_to_string(&path)?;
        let tool: ToolConfig = match ext {
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        tools.push(tool);
    }
    Ok(tools)
}
