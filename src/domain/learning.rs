//! Records and derived artifacts of the self-learning pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Coarse classification of a tool error message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Network,
    Validation,
    Configuration,
    Performance,
    Logic,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Network => "network",
            ErrorType::Validation => "validation",
            ErrorType::Configuration => "configuration",
            ErrorType::Performance => "performance",
            ErrorType::Logic => "logic",
            ErrorType::Unknown => "unknown",
        }
    }

    /// Transient failures worth retrying as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorType::Network | ErrorType::Performance)
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed tool execution. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub id: String,
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    pub source_type: String,
}

impl ExecutionRecord {
    /// Store key: zero-padded unix seconds then id, so lexical order is time order.
    pub fn storage_key(&self) -> String {
        execution_key(self.timestamp, &self.id)
    }
}

pub fn execution_key(timestamp: DateTime<Utc>, id: &str) -> String {
    format!("{:020}_{}", timestamp.timestamp().max(0), id)
}

/// Where an execution came from. Passed explicitly down the call chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub tool_name: String,
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(tool_name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            source_type: source_type.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Error,
    Performance,
    Usage,
    Success,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Error => "error",
            PatternType::Performance => "performance",
            PatternType::Usage => "usage",
            PatternType::Success => "success",
        }
    }
}

impl FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(PatternType::Error),
            "performance" => Ok(PatternType::Performance),
            "usage" => Ok(PatternType::Usage),
            "success" => Ok(PatternType::Success),
            other => Err(format!("unknown pattern type '{}'", other)),
        }
    }
}

/// A recurring phenomenon found across execution records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pattern {
    pub id: String,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub description: String,
    pub frequency: u64,
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Pattern {
    /// Tool this pattern is about, when it is about a single tool
    pub fn tool_name(&self) -> Option<&str> {
        self.metadata.get("tool_name").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Optimization,
    Configuration,
    Reliability,
    Performance,
    Usage,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::Optimization => "optimization",
            InsightType::Configuration => "configuration",
            InsightType::Reliability => "reliability",
            InsightType::Performance => "performance",
            InsightType::Usage => "usage",
        }
    }
}

impl FromStr for InsightType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimization" => Ok(InsightType::Optimization),
            "configuration" => Ok(InsightType::Configuration),
            "reliability" => Ok(InsightType::Reliability),
            "performance" => Ok(InsightType::Performance),
            "usage" => Ok(InsightType::Usage),
            other => Err(format!("unknown insight type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Prioritized, human-actionable recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub id: String,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub suggestion: String,
    pub evidence: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Insight {
    pub fn tool_name(&self) -> Option<&str> {
        self.metadata.get("tool_name").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolStats {
    pub tool_name: String,
    pub executions: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub last_used: DateTime<Utc>,
}

/// Aggregate view recomputed from execution records on demand
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningStats {
    pub total_executions: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub error_types: BTreeMap<ErrorType, u64>,
    pub top_tools: Vec<ToolStats>,
    pub recent_patterns: Vec<Pattern>,
    pub active_insights: Vec<Insight>,
    pub last_updated: DateTime<Utc>,
}

impl Default for LearningStats {
    fn default() -> Self {
        Self {
            total_executions: 0,
            success_rate: 0.0,
            avg_latency_ms: 0.0,
            error_types: BTreeMap::new(),
            top_tools: Vec::new(),
            recent_patterns: Vec::new(),
            active_insights: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_execution_key_orders_by_time() {
        let early = Utc.timestamp_opt(9, 0).unwrap();
        let late = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let a = execution_key(early, "zzz");
        let b = execution_key(late, "aaa");
        assert!(a < b);
        assert_eq!(a.len(), 20 + 1 + 3);
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!("Critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!("ERROR".parse::<PatternType>().unwrap(), PatternType::Error);
        assert!("bogus".parse::<InsightType>().is_err());
    }

    #[test]
    fn test_error_types_serialize_lowercase() {
        let json = serde_json::to_value(ErrorType::Performance).unwrap();
        assert_eq!(json, "performance");
        assert!(ErrorType::Network.is_retryable());
        assert!(!ErrorType::Validation.is_retryable());
    }
}
