use crate::domain::{ExecutionRecord, LearningStats, ToolStats};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct ToolAccumulator {
    executions: u64,
    successes: u64,
    total_ms: f64,
    last_used: Option<DateTime<Utc>>,
}

/// Pure aggregation over a record set. Patterns and insights are attached by
/// the caller.
pub fn compute_stats(records: &[ExecutionRecord], top_n: usize) -> LearningStats {
    let total = records.len() as u64;
    let mut successes = 0u64;
    let mut total_ms = 0.0;
    let mut error_types = BTreeMap::new();
    let mut per_tool: HashMap<&str, ToolAccumulator> = HashMap::new();

    for record in records {
        total_ms += record.duration_ms;
        if record.success {
            successes += 1;
        } else if let Some(kind) = record.error_type {
            *error_types.entry(kind).or_insert(0) += 1;
        }

        let tool = per_tool.entry(record.tool_name.as_str()).or_default();
        tool.executions += 1;
        tool.total_ms += record.duration_ms;
        if record.success {
            tool.successes += 1;
        }
        if tool.last_used.map_or(true, |last| record.timestamp > last) {
            tool.last_used = Some(record.timestamp);
        }
    }

    let mut top_tools: Vec<ToolStats> = per_tool
        .into_iter()
        .map(|(name, acc)| ToolStats {
            tool_name: name.to_string(),
            executions: acc.executions,
            success_rate: ratio(acc.successes as f64, acc.executions as f64),
            avg_latency_ms: ratio(acc.total_ms, acc.executions as f64),
            last_used: acc.last_used.unwrap_or_else(Utc::now),
        })
        .collect();
    top_tools.sort_by(|a, b| {
        b.executions
            .cmp(&a.executions)
            .then_with(|| a.tool_name.cmp(&b.tool_name))
    });
    top_tools.truncate(top_n);

    LearningStats {
        total_executions: total,
        success_rate: ratio(successes as f64, total as f64),
        avg_latency_ms: ratio(total_ms, total as f64),
        error_types,
        top_tools,
        recent_patterns: Vec::new(),
        active_insights: Vec::new(),
        last_updated: Utc::now(),
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
