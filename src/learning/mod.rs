//! Self-learning pipeline
//!
//! Tool executions flow through the [`TelemetryCollector`] (sampling,
//! sanitizing, classifying) into the store. The [`PatternAnalyzer`] scans a
//! trailing window of records for error clusters, latency outliers and usage
//! skew; the [`InsightReflector`] turns those patterns plus fresh aggregate
//! stats into prioritized insights. [`LearningService`] ties the pieces
//! together for the query surface and the periodic maintenance task.

pub mod analyzer;
pub mod classifier;
pub mod collector;
pub mod reflector;
pub mod sanitize;
pub mod service;
pub mod stats;

pub use analyzer::PatternAnalyzer;
pub use classifier::classify_error;
pub use collector::{CollectOutcome, TelemetryCollector};
pub use reflector::InsightReflector;
pub use service::{AnalysisReport, LearningService, MaintenanceReport};

use crate::persistence::PersistenceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error(transparent)]
    Store(#[from] PersistenceError),

    #[error("Invalid learning configuration: {0}")]
    InvalidConfig(String),
}

impl LearningError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        match self {
            Self::Store(e) => e.status_code(),
            Self::InvalidConfig(_) => axum::http::StatusCode::BAD_REQUEST,
        }
    }
}

/// Collection and analysis settings. Mutable at runtime through the
/// learning config endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fraction of executions recorded, in [0, 1]
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    #[serde(default = "default_true")]
    pub include_successful: bool,

    /// Bytes
    #[serde(default = "default_payload_size")]
    pub max_input_size: usize,

    /// Bytes
    #[serde(default = "default_payload_size")]
    pub max_output_size: usize,

    #[serde(default = "default_true")]
    pub redact_pii: bool,

    /// Persist off the caller's task
    #[serde(default = "default_true")]
    pub async_collection: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,

    #[serde(default = "default_analysis_window")]
    pub analysis_window_hours: u32,

    #[serde(default = "default_min_error_occurrences")]
    pub min_error_occurrences: u64,

    #[serde(default = "default_top_tools")]
    pub top_tools: usize,
}

fn default_true() -> bool {
    true
}

fn default_sample_rate() -> f64 {
    1.0
}

fn default_payload_size() -> usize {
    4096
}

fn default_retention_days() -> u32 {
    30
}

fn default_analysis_interval() -> u64 {
    3600
}

fn default_analysis_window() -> u32 {
    24
}

fn default_min_error_occurrences() -> u64 {
    3
}

fn default_top_tools() -> usize {
    10
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: default_sample_rate(),
            include_successful: true,
            max_input_size: default_payload_size(),
            max_output_size: default_payload_size(),
            redact_pii: true,
            async_collection: true,
            retention_days: default_retention_days(),
            analysis_interval_secs: default_analysis_interval(),
            analysis_window_hours: default_analysis_window(),
            min_error_occurrences: default_min_error_occurrences(),
            top_tools: default_top_tools(),
        }
    }
}

impl LearningConfig {
    pub fn validate(&self) -> Result<(), LearningError> {
        if !(0.0..=1.0).contains(&self.sample_rate) || self.sample_rate.is_nan() {
            return Err(LearningError::InvalidConfig(format!(
                "sample_rate must be between 0.0 and 1.0, got {}",
                self.sample_rate
            )));
        }
        if self.max_input_size == 0 || self.max_output_size == 0 {
            return Err(LearningError::InvalidConfig(
                "max_input_size and max_output_size must be greater than 0".to_string(),
            ));
        }
        if self.analysis_interval_secs == 0 {
            return Err(LearningError::InvalidConfig(
                "analysis_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.analysis_window_hours == 0 {
            return Err(LearningError::InvalidConfig(
                "analysis_window_hours must be greater than 0".to_string(),
            ));
        }
        if self.min_error_occurrences == 0 {
            return Err(LearningError::InvalidConfig(
                "min_error_occurrences must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
