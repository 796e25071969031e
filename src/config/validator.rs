use std::collections::HashMap;
use thiserror::Error;

use crate::config::{ServerSettings, SessionSettings, Settings, ToolConfig};
use crate::learning::LearningConfig;
use crate::persistence::PersistenceConfig;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Checks a whole settings tree and reports every problem at once.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        Self::validate_server(&settings.server, &mut errors);
        Self::validate_sessions(&settings.sessions, &mut errors);
        Self::validate_learning(&settings.learning, &mut errors);
        Self::validate_persistence(&settings.persistence, &mut errors);
        Self::validate_tools(&settings.tools, &mut errors);
        if settings.registry.max_concurrent_handlers == 0 {
            errors.push(invalid(
                "registry.max_concurrent_handlers",
                "Must be greater than 0",
            ));
        }
        if settings.registry.handler_queue_size == 0 {
            errors.push(invalid(
                "registry.handler_queue_size",
                "Must be greater than 0",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(server: &ServerSettings, errors: &mut Vec<ValidationError>) {
        if server.host.is_empty() {
            errors.push(ValidationError::MissingField("server.host".to_string()));
        }
        if server.port == 0 {
            errors.push(invalid("server.port", "Port must be greater than 0"));
        }
    }

    fn validate_sessions(sessions: &SessionSettings, errors: &mut Vec<ValidationError>) {
        if sessions.default_timeout_secs == 0 {
            errors.push(invalid("sessions.default_timeout_secs", "Must be greater than 0"));
        }
        if sessions.sweep_interval_secs == 0 {
            errors.push(invalid("sessions.sweep_interval_secs", "Must be greater than 0"));
        }
        if sessions.event_buffer_size == 0 {
            errors.push(invalid("sessions.event_buffer_size", "Must be greater than 0"));
        }
        if sessions.max_timeout_secs < sessions.default_timeout_secs {
            errors.push(invalid(
                "sessions.max_timeout_secs",
                "Must not be lower than default_timeout_secs",
            ));
        }
    }

    fn validate_learning(learning: &LearningConfig, errors: &mut Vec<ValidationError>) {
        if !(0.0..=1.0).contains(&learning.sample_rate) {
            errors.push(invalid("learning.sample_rate", "Must be within [0, 1]"));
        }
        let positive = [
            ("learning.max_input_size", learning.max_input_size as u64),
            ("learning.max_output_size", learning.max_output_size as u64),
            ("learning.retention_days", u64::from(learning.retention_days)),
            ("learning.analysis_interval_secs", learning.analysis_interval_secs),
            ("learning.analysis_window_hours", u64::from(learning.analysis_window_hours)),
            ("learning.min_error_occurrences", learning.min_error_occurrences),
        ];
        for (field, value) in positive {
            if value == 0 {
                errors.push(invalid(field, "Must be greater than 0"));
            }
        }
    }

    fn validate_persistence(persistence: &PersistenceConfig, errors: &mut Vec<ValidationError>) {
        if persistence.url.is_empty() {
            errors.push(ValidationError::MissingField("persistence.url".to_string()));
        } else if !persistence.url.starts_with("sqlite:") {
            errors.push(invalid("persistence.url", "Only sqlite URLs are supported"));
        }
        if persistence.max_connections == 0 {
            errors.push(invalid("persistence.max_connections", "Must be greater than 0"));
        }
    }

    fn validate_tools(tools: &[ToolConfig], errors: &mut Vec<ValidationError>) {
        let mut seen_names = HashMap::new();

        for (idx, tool) in tools.iter().enumerate() {
            if tool.name.trim().is_empty() {
                errors.push(ValidationError::MissingField(format!("tools[{}].name", idx)));
            } else if let Some(prev_idx) = seen_names.insert(tool.name.as_str(), idx) {
                errors.push(ValidationError::Duplicate(format!(
                    "Tool name '{}' appears at indices {} and {}",
                    tool.name, prev_idx, idx
                )));
            }

            if tool.description.is_empty() {
                errors.push(ValidationError::MissingField(format!(
                    "tools[{}].description",
                    idx
                )));
            }

            if !tool.input_schema.is_object() {
                errors.push(invalid(
                    format!("tools[{}].input_schema", idx),
                    "Must be a JSON object",
                ));
            }

            if tool.behavior_count() > 1 {
                errors.push(invalid(
                    format!("tools[{}]", idx),
                    "Only one of 'fail_with', 'static_response', 'template' or 'echo' may be set",
                ));
            }
        }
    }
}
