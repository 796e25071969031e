//! Pattern detection over a trailing window of execution records
//!
//! Three detectors run over the same record set:
//!
//! - error clusters: failures grouped by (tool, error type)
//! - performance outliers: tools averaging more than twice the system latency
//! - usage concentration: one tool carrying the majority of executions
//!
//! Every run persists what it finds as new patterns. Earlier patterns for the
//! same phenomenon are left untouched.

use super::{LearningConfig, LearningError};
use crate::domain::{ErrorType, ExecutionRecord, Pattern, PatternType};
use crate::persistence::LearningStore;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const PERFORMANCE_OUTLIER_FACTOR: f64 = 2.0;
const PERFORMANCE_CONFIDENCE: f64 = 0.8;
const USAGE_SHARE_THRESHOLD: f64 = 0.5;
const USAGE_CONFIDENCE: f64 = 0.9;
const MAX_SAMPLE_ERRORS: usize = 3;

pub struct PatternAnalyzer {
    store: Arc<dyn LearningStore>,
    config: Arc<RwLock<LearningConfig>>,
}

impl PatternAnalyzer {
    pub fn new(store: Arc<dyn LearningStore>, config: Arc<RwLock<LearningConfig>>) -> Self {
        Self { store, config }
    }

    /// Scans the configured window, persists and returns the detected patterns.
    pub async fn analyze(&self) -> Result<Vec<Pattern>, LearningError> {
        let (window_hours, min_errors) = {
            let config = self.config.read().await;
            (config.analysis_window_hours, config.min_error_occurrences)
        };
        let since = Utc::now() - Duration::hours(i64::from(window_hours));
        let records = self.store.list_executions(Some(since), None, None).await?;

        let patterns = analyze_records(&records, min_errors);
        for pattern in &patterns {
            self.store.save_pattern(pattern).await?;
        }

        info!(
            records = records.len(),
            patterns = patterns.len(),
            "Pattern analysis complete"
        );
        Ok(patterns)
    }
}

/// Pure detection over a record set.
pub fn analyze_records(records: &[ExecutionRecord], min_error_occurrences: u64) -> Vec<Pattern> {
    if records.is_empty() {
        return Vec::new();
    }
    let mut patterns = detect_error_patterns(records, min_error_occurrences);
    patterns.extend(detect_performance_patterns(records));
    patterns.extend(detect_usage_pattern(records));
    patterns
}

/// `count / total`, +0.2 at 10 occurrences and another +0.2 at 50, capped at 1.
pub fn error_confidence(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let mut confidence = count as f64 / total as f64;
    if count >= 10 {
        confidence += 0.2;
    }
    if count >= 50 {
        confidence += 0.2;
    }
    confidence.min(1.0)
}

struct Span {
    first: DateTime<Utc>,
    last: DateTime<Utc>,
}

impl Span {
    fn of<'a>(records: impl Iterator<Item = &'a ExecutionRecord>) -> Option<Self> {
        records.fold(None, |span: Option<Span>, record| match span {
            None => Some(Span {
                first: record.timestamp,
                last: record.timestamp,
            }),
            Some(span) => Some(Span {
                first: span.first.min(record.timestamp),
                last: span.last.max(record.timestamp),
            }),
        })
    }
}

fn new_pattern(
    pattern_type: PatternType,
    description: String,
    frequency: u64,
    confidence: f64,
    span: Span,
    metadata: HashMap<String, Value>,
) -> Pattern {
    Pattern {
        id: uuid::Uuid::new_v4().to_string(),
        pattern_type,
        description,
        frequency,
        confidence,
        first_seen: span.first,
        last_seen: span.last,
        metadata,
    }
}

fn detect_error_patterns(records: &[ExecutionRecord], min_occurrences: u64) -> Vec<Pattern> {
    let total = records.len() as u64;
    let mut groups: BTreeMap<(&str, ErrorType), Vec<&ExecutionRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.success) {
        let kind = record.error_type.unwrap_or(ErrorType::Unknown);
        groups
            .entry((record.tool_name.as_str(), kind))
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .filter(|(_, group)| group.len() as u64 >= min_occurrences)
        .filter_map(|((tool, kind), group)| {
            let count = group.len() as u64;
            let span = Span::of(group.iter().copied())?;

            let mut samples: Vec<&str> = Vec::new();
            for message in group.iter().filter_map(|r| r.error_message.as_deref()) {
                if samples.len() >= MAX_SAMPLE_ERRORS {
                    break;
                }
                if !samples.contains(&message) {
                    samples.push(message);
                }
            }

            let mut metadata = HashMap::new();
            metadata.insert("tool_name".to_string(), json!(tool));
            metadata.insert("error_type".to_string(), json!(kind));
            metadata.insert("total_executions".to_string(), json!(total));
            metadata.insert("sample_errors".to_string(), json!(samples));

            debug!(tool, error_type = %kind, count, "Error pattern detected");
            Some(new_pattern(
                PatternType::Error,
                format!("{} fails repeatedly with {} errors", tool, kind),
                count,
                error_confidence(count, total),
                span,
                metadata,
            ))
        })
        .collect()
}

fn detect_performance_patterns(records: &[ExecutionRecord]) -> Vec<Pattern> {
    let total_ms: f64 = records.iter().map(|r| r.duration_ms).sum();
    let system_avg = total_ms / records.len() as f64;
    if system_avg <= 0.0 {
        return Vec::new();
    }

    let mut per_tool: BTreeMap<&str, Vec<&ExecutionRecord>> = BTreeMap::new();
    for record in records {
        per_tool.entry(record.tool_name.as_str()).or_default().push(record);
    }

    per_tool
        .into_iter()
        .filter_map(|(tool, group)| {
            let count = group.len() as u64;
            let avg = group.iter().map(|r| r.duration_ms).sum::<f64>() / count as f64;
            if avg <= system_avg * PERFORMANCE_OUTLIER_FACTOR {
                return None;
            }
            let span = Span::of(group.iter().copied())?;

            let mut metadata = HashMap::new();
            metadata.insert("tool_name".to_string(), json!(tool));
            metadata.insert("avg_latency_ms".to_string(), json!(avg));
            metadata.insert("system_avg_latency_ms".to_string(), json!(system_avg));

            Some(new_pattern(
                PatternType::Performance,
                format!(
                    "{} averages {:.1} ms, over {}x the system average of {:.1} ms",
                    tool, avg, PERFORMANCE_OUTLIER_FACTOR, system_avg
                ),
                count,
                PERFORMANCE_CONFIDENCE,
                span,
                metadata,
            ))
        })
        .collect()
}

fn detect_usage_pattern(records: &[ExecutionRecord]) -> Option<Pattern> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for record in records {
        *counts.entry(record.tool_name.as_str()).or_insert(0) += 1;
    }
    let (tool, count) = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))?;

    let share = count as f64 / records.len() as f64;
    if share <= USAGE_SHARE_THRESHOLD {
        return None;
    }
    let span = Span::of(records.iter().filter(|r| r.tool_name == tool))?;

    let mut metadata = HashMap::new();
    metadata.insert("tool_name".to_string(), json!(tool));
    metadata.insert("share".to_string(), json!(share));
    metadata.insert("total_executions".to_string(), json!(records.len()));

    Some(new_pattern(
        PatternType::Usage,
        format!("{} accounts for {:.0}% of executions", tool, share * 100.0),
        count,
        USAGE_CONFIDENCE,
        span,
        metadata,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(tool: &str, error: Option<ErrorType>, ms: f64) -> ExecutionRecord {
        ExecutionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool.to_string(),
            timestamp: Utc::now(),
            duration_ms: ms,
            success: error.is_none(),
            input: None,
            output: None,
            error_message: error.map(|kind| format!("{} failure", kind)),
            error_type: error,
            context: Default::default(),
            source_type: "test".into(),
        }
    }

    fn error_patterns(patterns: &[Pattern]) -> Vec<&Pattern> {
        patterns
            .iter()
            .filter(|p| p.pattern_type == PatternType::Error)
            .collect()
    }

    #[test]
    fn test_two_occurrences_are_not_a_pattern() {
        let mut records = vec![rec("a", Some(ErrorType::Network), 5.0); 2];
        records.extend(vec![rec("b", None, 5.0); 4]);

        let patterns = analyze_records(&records, 3);
        assert!(error_patterns(&patterns).is_empty());
    }

    #[test]
    fn test_three_occurrences_are_a_pattern() {
        let mut records = vec![rec("a", Some(ErrorType::Network), 5.0); 3];
        records.extend(vec![rec("b", None, 5.0); 3]);

        let patterns = analyze_records(&records, 3);
        let errors = error_patterns(&patterns);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].frequency, 3);
        assert_eq!(errors[0].confidence, 0.5);
        assert_eq!(errors[0].tool_name(), Some("a"));
        assert_eq!(errors[0].metadata["error_type"], "network");
    }

    #[test]
    fn test_groups_split_by_error_type() {
        let mut records = vec![rec("a", Some(ErrorType::Network), 5.0); 3];
        records.extend(vec![rec("a", Some(ErrorType::Validation), 5.0); 2]);

        let patterns = analyze_records(&records, 3);
        let errors = error_patterns(&patterns);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].metadata["error_type"], "network");
    }

    #[test]
    fn test_confidence_boosts_and_cap() {
        assert_eq!(error_confidence(3, 6), 0.5);
        assert!((error_confidence(10, 100) - 0.3).abs() < 1e-9);
        assert!((error_confidence(50, 1000) - 0.45).abs() < 1e-9);
        assert_eq!(error_confidence(60, 60), 1.0);
        assert_eq!(error_confidence(1, 0), 0.0);
    }

    #[test]
    fn test_performance_outlier() {
        let mut records = vec![rec("fast", None, 10.0); 9];
        records.push(rec("slow", None, 500.0));

        let patterns = analyze_records(&records, 3);
        let slow: Vec<&Pattern> = patterns
            .iter()
            .filter(|p| p.pattern_type == PatternType::Performance)
            .collect();
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].tool_name(), Some("slow"));
        assert_eq!(slow[0].confidence, PERFORMANCE_CONFIDENCE);
        assert_eq!(slow[0].frequency, 1);
    }

    #[test]
    fn test_usage_concentration_requires_majority() {
        let even = vec![rec("a", None, 1.0), rec("b", None, 1.0)];
        assert!(analyze_records(&even, 3)
            .iter()
            .all(|p| p.pattern_type != PatternType::Usage));

        let skewed = vec![rec("a", None, 1.0), rec("a", None, 1.0), rec("b", None, 1.0)];
        let usage: Vec<Pattern> = analyze_records(&skewed, 3)
            .into_iter()
            .filter(|p| p.pattern_type == PatternType::Usage)
            .collect();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].tool_name(), Some("a"));
        assert_eq!(usage[0].frequency, 2);
        assert_eq!(usage[0].confidence, USAGE_CONFIDENCE);
    }

    #[test]
    fn test_empty_window_yields_nothing() {
        assert!(analyze_records(&[], 3).is_empty());
    }
}
