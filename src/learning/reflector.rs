//! Turns patterns and aggregate stats into prioritized insights

use super::LearningError;
use crate::domain::{
    ErrorType, Insight, InsightType, LearningStats, Pattern, PatternType, Priority,
};
use crate::persistence::LearningStore;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const MIN_ERROR_PATTERN_CONFIDENCE: f64 = 0.6;
const LOW_SUCCESS_RATE: f64 = 0.8;
const CRITICAL_SUCCESS_RATE: f64 = 0.5;
const MIN_EXECUTIONS_FOR_SUCCESS_RATE: u64 = 100;
const NETWORK_ERROR_SHARE: f64 = 0.1;

pub struct InsightReflector {
    store: Arc<dyn LearningStore>,
}

impl InsightReflector {
    pub fn new(store: Arc<dyn LearningStore>) -> Self {
        Self { store }
    }

    /// Derives insights and persists each one.
    pub async fn reflect(
        &self,
        patterns: &[Pattern],
        stats: &LearningStats,
    ) -> Result<Vec<Insight>, LearningError> {
        let insights = derive_insights(patterns, stats);
        for insight in &insights {
            self.store.save_insight(insight).await?;
        }
        info!(
            patterns = patterns.len(),
            insights = insights.len(),
            "Reflection complete"
        );
        Ok(insights)
    }
}

/// Pattern-driven insights followed by the stats-driven ones.
pub fn derive_insights(patterns: &[Pattern], stats: &LearningStats) -> Vec<Insight> {
    let mut insights: Vec<Insight> = patterns
        .iter()
        .filter_map(|pattern| match pattern.pattern_type {
            PatternType::Error => error_insight(pattern),
            PatternType::Performance => Some(performance_insight(pattern)),
            PatternType::Usage => Some(usage_insight(pattern)),
            PatternType::Success => None,
        })
        .collect();
    insights.extend(success_rate_insight(stats));
    insights.extend(network_insight(stats));
    insights
}

pub fn error_priority(frequency: u64) -> Priority {
    match frequency {
        f if f >= 50 => Priority::Critical,
        f if f >= 20 => Priority::High,
        f if f >= 10 => Priority::Medium,
        _ => Priority::Low,
    }
}

fn insight(
    insight_type: InsightType,
    priority: Priority,
    title: String,
    description: String,
    suggestion: String,
    evidence: Vec<String>,
    metadata: HashMap<String, Value>,
) -> Insight {
    Insight {
        id: uuid::Uuid::new_v4().to_string(),
        insight_type,
        priority,
        title,
        description,
        suggestion,
        evidence,
        created_at: Utc::now(),
        metadata,
    }
}

fn pattern_metadata(pattern: &Pattern) -> HashMap<String, Value> {
    let mut metadata = HashMap::new();
    metadata.insert("pattern_id".to_string(), json!(pattern.id));
    if let Some(tool) = pattern.tool_name() {
        metadata.insert("tool_name".to_string(), json!(tool));
    }
    metadata
}

fn error_suggestion(tool: &str, kind: ErrorType) -> String {
    match kind {
        ErrorType::Network => format!(
            "Check connectivity from this host to the service behind {} and retry transient failures with backoff.",
            tool
        ),
        ErrorType::Performance => format!(
            "Raise the timeout for {} or reduce its load with caching and client-side rate limiting.",
            tool
        ),
        ErrorType::Configuration => format!(
            "Verify the credentials and settings {} depends on.",
            tool
        ),
        ErrorType::Validation => format!(
            "Review the input schema of {}; callers are sending payloads it rejects.",
            tool
        ),
        ErrorType::Logic => format!(
            "Inspect the implementation of {} for unhandled cases.",
            tool
        ),
        ErrorType::Unknown => format!(
            "Inspect recent error messages from {} to find the root cause.",
            tool
        ),
    }
}

fn error_insight(pattern: &Pattern) -> Option<Insight> {
    if pattern.confidence < MIN_ERROR_PATTERN_CONFIDENCE {
        return None;
    }
    let tool = pattern.tool_name().unwrap_or("unknown tool");
    let kind: ErrorType = pattern
        .metadata
        .get("error_type")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or(ErrorType::Unknown);

    let mut evidence = vec![
        format!("Occurrences: {}", pattern.frequency),
        format!("Confidence: {:.0}%", pattern.confidence * 100.0),
        format!("Error type: {}", kind),
        format!(
            "Observed between {} and {}",
            pattern.first_seen.to_rfc3339(),
            pattern.last_seen.to_rfc3339()
        ),
    ];
    if let Some(samples) = pattern.metadata.get("sample_errors").and_then(Value::as_array) {
        evidence.extend(
            samples
                .iter()
                .filter_map(Value::as_str)
                .map(|s| format!("Sample error: {}", s)),
        );
    }

    let mut metadata = pattern_metadata(pattern);
    metadata.insert("error_type".to_string(), json!(kind));

    Some(insight(
        InsightType::Reliability,
        error_priority(pattern.frequency),
        format!("Recurring {} errors in {}", kind, tool),
        format!(
            "{} failed {} times with {} errors during the analysis window.",
            tool, pattern.frequency, kind
        ),
        error_suggestion(tool, kind),
        evidence,
        metadata,
    ))
}

fn performance_insight(pattern: &Pattern) -> Insight {
    let tool = pattern.tool_name().unwrap_or("unknown tool");
    let avg = pattern
        .metadata
        .get("avg_latency_ms")
        .and_then(Value::as_f64)
        .unwrap_or_default();
    let system_avg = pattern
        .metadata
        .get("system_avg_latency_ms")
        .and_then(Value::as_f64)
        .unwrap_or_default();

    let priority = if pattern.frequency >= 100 {
        Priority::High
    } else {
        Priority::Medium
    };

    insight(
        InsightType::Performance,
        priority,
        format!("{} is much slower than other tools", tool),
        pattern.description.clone(),
        format!(
            "Profile {} and cache repeated results, or move it off latency-sensitive paths.",
            tool
        ),
        vec![
            format!("Average latency: {:.1} ms", avg),
            format!("System average latency: {:.1} ms", system_avg),
            format!("Executions: {}", pattern.frequency),
        ],
        pattern_metadata(pattern),
    )
}

fn usage_insight(pattern: &Pattern) -> Insight {
    let tool = pattern.tool_name().unwrap_or("unknown tool");
    let share = pattern
        .metadata
        .get("share")
        .and_then(Value::as_f64)
        .unwrap_or_default();

    insight(
        InsightType::Usage,
        Priority::Medium,
        format!("{} dominates tool usage", tool),
        pattern.description.clone(),
        format!(
            "Optimize {} first; it carries most of the traffic and benefits most from caching or dedicated capacity.",
            tool
        ),
        vec![
            format!("Share of executions: {:.1}%", share * 100.0),
            format!("Executions: {}", pattern.frequency),
        ],
        pattern_metadata(pattern),
    )
}

fn success_rate_insight(stats: &LearningStats) -> Option<Insight> {
    if stats.total_executions <= MIN_EXECUTIONS_FOR_SUCCESS_RATE
        || stats.success_rate >= LOW_SUCCESS_RATE
    {
        return None;
    }
    let priority = if stats.success_rate < CRITICAL_SUCCESS_RATE {
        Priority::Critical
    } else {
        Priority::High
    };
    let failed = stats.total_executions
        - (stats.success_rate * stats.total_executions as f64).round() as u64;

    let mut evidence = vec![
        format!("Success rate: {:.1}%", stats.success_rate * 100.0),
        format!("Total executions: {}", stats.total_executions),
        format!("Failed executions: {}", failed),
    ];
    evidence.extend(
        stats
            .error_types
            .iter()
            .map(|(kind, count)| format!("{} errors: {}", kind, count)),
    );

    Some(insight(
        InsightType::Configuration,
        priority,
        "Low overall success rate".to_string(),
        format!(
            "Only {:.1}% of {} tool executions succeeded.",
            stats.success_rate * 100.0,
            stats.total_executions
        ),
        "Review tool configuration and upstream availability; the error breakdown shows where failures concentrate.".to_string(),
        evidence,
        HashMap::new(),
    ))
}

fn network_insight(stats: &LearningStats) -> Option<Insight> {
    let network = stats
        .error_types
        .get(&ErrorType::Network)
        .copied()
        .unwrap_or(0);
    if stats.total_executions == 0 {
        return None;
    }
    let share = network as f64 / stats.total_executions as f64;
    if share <= NETWORK_ERROR_SHARE {
        return None;
    }

    Some(insight(
        InsightType::Reliability,
        Priority::High,
        "Frequent network errors".to_string(),
        format!(
            "{:.1}% of executions failed with network errors.",
            share * 100.0
        ),
        "Check DNS, proxies and upstream health; add retries with backoff for network-bound tools.".to_string(),
        vec![
            format!("Network errors: {}", network),
            format!("Total executions: {}", stats.total_executions),
            format!("Network error share: {:.1}%", share * 100.0),
        ],
        HashMap::new(),
    ))
}
