//! Durable store for execution records, patterns, insights and cached stats

use crate::domain::{
    ExecutionRecord, Insight, InsightType, LearningStats, Pattern, PatternType, Priority,
};
use crate::persistence::error::PersistenceError;
use crate::persistence::pool::ConnectionPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternFilter {
    pub pattern_type: Option<PatternType>,
    pub tool_name: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightFilter {
    pub insight_type: Option<InsightType>,
    pub priority: Option<Priority>,
    pub tool_name: Option<String>,
    pub limit: Option<usize>,
}

/// Rows deleted by one retention pass, per collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub executions: u64,
    pub patterns: u64,
    pub insights: u64,
    pub stats: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.executions + self.patterns + self.insights + self.stats
    }
}

/// Storage contract of the learning pipeline.
///
/// Records are independent JSON documents; implementations only index what
/// the filters need. Saves are insert-or-replace by id.
#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), PersistenceError>;
    async fn get_execution(&self, id: &str) -> Result<ExecutionRecord, PersistenceError>;
    /// Oldest first, bounded by `[since, until]` when given.
    async fn list_executions(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionRecord>, PersistenceError>;
    /// Newest first.
    async fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionRecord>, PersistenceError>;
    /// Newest first.
    async fn executions_for_tool(
        &self,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, PersistenceError>;
    async fn count_executions(&self) -> Result<u64, PersistenceError>;

    async fn save_pattern(&self, pattern: &Pattern) -> Result<(), PersistenceError>;
    async fn get_pattern(&self, id: &str) -> Result<Pattern, PersistenceError>;
    async fn update_pattern(&self, pattern: &Pattern) -> Result<(), PersistenceError>;
    async fn delete_pattern(&self, id: &str) -> Result<(), PersistenceError>;
    /// Most recently seen first.
    async fn list_patterns(&self, filter: &PatternFilter) -> Result<Vec<Pattern>, PersistenceError>;

    async fn save_insight(&self, insight: &Insight) -> Result<(), PersistenceError>;
    async fn get_insight(&self, id: &str) -> Result<Insight, PersistenceError>;
    async fn update_insight(&self, insight: &Insight) -> Result<(), PersistenceError>;
    async fn delete_insight(&self, id: &str) -> Result<(), PersistenceError>;
    /// Newest first.
    async fn list_insights(&self, filter: &InsightFilter) -> Result<Vec<Insight>, PersistenceError>;

    async fn save_stats_cache(&self, key: &str, stats: &LearningStats) -> Result<(), PersistenceError>;
    async fn load_stats_cache(&self, key: &str) -> Result<Option<LearningStats>, PersistenceError>;

    /// Deletes everything older than `cutoff` from all collections in one transaction.
    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<CleanupReport, PersistenceError>;

    async fn health_check(&self) -> Result<(), PersistenceError>;
    async fn close(&self);
}

/// SQLite-backed [`LearningStore`]
pub struct SqlxLearningStore {
    pool: ConnectionPool,
}

impl SqlxLearningStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

fn decode<T: serde::de::DeserializeOwned>(row: &SqliteRow) -> Result<T, PersistenceError> {
    let data: String = row.try_get("data")?;
    serde_json::from_str(&data).map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn decode_all<T: serde::de::DeserializeOwned>(
    rows: &[SqliteRow],
) -> Result<Vec<T>, PersistenceError> {
    rows.iter().map(decode).collect()
}

fn push_limit(query: &mut QueryBuilder<'_, Sqlite>, limit: Option<usize>) {
    if let Some(limit) = limit {
        query.push(" LIMIT ").push_bind(limit as i64);
    }
}

#[async_trait]
impl LearningStore for SqlxLearningStore {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(record)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions (key, id, tool_name, timestamp_ms, success, error_type, data)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.storage_key())
        .bind(&record.id)
        .bind(&record.tool_name)
        .bind(record.timestamp.timestamp_millis())
        .bind(record.success)
        .bind(record.error_type.map(|t| t.as_str()))
        .bind(data)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<ExecutionRecord, PersistenceError> {
        let row = sqlx::query("SELECT data FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?
            .ok_or_else(|| PersistenceError::not_found("execution", id))?;
        decode(&row)
    }

    async fn list_executions(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionRecord>, PersistenceError> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT data FROM executions WHERE 1 = 1");
        if let Some(since) = since {
            query.push(" AND timestamp_ms >= ").push_bind(since.timestamp_millis());
        }
        if let Some(until) = until {
            query.push(" AND timestamp_ms <= ").push_bind(until.timestamp_millis());
        }
        query.push(" ORDER BY timestamp_ms ASC, key ASC");
        push_limit(&mut query, limit);

        let rows = query.build().fetch_all(self.pool.pool()).await?;
        decode_all(&rows)
    }

    async fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionRecord>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT data FROM executions ORDER BY timestamp_ms DESC, key DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(self.pool.pool())
        .await?;
        decode_all(&rows)
    }

    async fn executions_for_tool(
        &self,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT data FROM executions WHERE tool_name = ? ORDER BY timestamp_ms DESC, key DESC LIMIT ?",
        )
        .bind(tool_name)
        .bind(limit as i64)
        .fetch_all(self.pool.pool())
        .await?;
        decode_all(&rows)
    }

    async fn count_executions(&self) -> Result<u64, PersistenceError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM executions")
            .fetch_one(self.pool.pool())
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn save_pattern(&self, pattern: &Pattern) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(pattern)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO patterns (id, pattern_type, tool_name, last_seen_ms, data)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&pattern.id)
        .bind(pattern.pattern_type.as_str())
        .bind(pattern.tool_name())
        .bind(pattern.last_seen.timestamp_millis())
        .bind(data)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }

    async fn get_pattern(&self, id: &str) -> Result<Pattern, PersistenceError> {
        let row = sqlx::query("SELECT data FROM patterns WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?
            .ok_or_else(|| PersistenceError::not_found("pattern", id))?;
        decode(&row)
    }

    async fn update_pattern(&self, pattern: &Pattern) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(pattern)?;
        let result = sqlx::query(
            "UPDATE patterns SET pattern_type = ?, tool_name = ?, last_seen_ms = ?, data = ? WHERE id = ?",
        )
        .bind(pattern.pattern_type.as_str())
        .bind(pattern.tool_name())
        .bind(pattern.last_seen.timestamp_millis())
        .bind(data)
        .bind(&pattern.id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("pattern", &pattern.id));
        }
        Ok(())
    }

    async fn delete_pattern(&self, id: &str) -> Result<(), PersistenceError> {
        let result = sqlx::query("DELETE FROM patterns WHERE id = ?")
            .bind(id)
            .execute(self.pool.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("pattern", id));
        }
        Ok(())
    }

    async fn list_patterns(&self, filter: &PatternFilter) -> Result<Vec<Pattern>, PersistenceError> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT data FROM patterns WHERE 1 = 1");
        if let Some(pattern_type) = filter.pattern_type {
            query.push(" AND pattern_type = ").push_bind(pattern_type.as_str());
        }
        if let Some(tool_name) = &filter.tool_name {
            query.push(" AND tool_name = ").push_bind(tool_name.clone());
        }
        query.push(" ORDER BY last_seen_ms DESC, id ASC");
        push_limit(&mut query, filter.limit);

        let rows = query.build().fetch_all(self.pool.pool()).await?;
        decode_all(&rows)
    }

    async fn save_insight(&self, insight: &Insight) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(insight)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO insights (id, insight_type, priority, tool_name, created_at_ms, data)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&insight.id)
        .bind(insight.insight_type.as_str())
        .bind(insight.priority.as_str())
        .bind(insight.tool_name())
        .bind(insight.created_at.timestamp_millis())
        .bind(data)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }

    async fn get_insight(&self, id: &str) -> Result<Insight, PersistenceError> {
        let row = sqlx::query("SELECT data FROM insights WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?
            .ok_or_else(|| PersistenceError::not_found("insight", id))?;
        decode(&row)
    }

    async fn update_insight(&self, insight: &Insight) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(insight)?;
        let result = sqlx::query(
            "UPDATE insights SET insight_type = ?, priority = ?, tool_name = ?, created_at_ms = ?, data = ? WHERE id = ?",
        )
        .bind(insight.insight_type.as_str())
        .bind(insight.priority.as_str())
        .bind(insight.tool_name())
        .bind(insight.created_at.timestamp_millis())
        .bind(data)
        .bind(&insight.id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("insight", &insight.id));
        }
        Ok(())
    }

    async fn delete_insight(&self, id: &str) -> Result<(), PersistenceError> {
        let result = sqlx::query("DELETE FROM insights WHERE id = ?")
            .bind(id)
            .execute(self.pool.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("insight", id));
        }
        Ok(())
    }

    async fn list_insights(&self, filter: &InsightFilter) -> Result<Vec<Insight>, PersistenceError> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT data FROM insights WHERE 1 = 1");
        if let Some(insight_type) = filter.insight_type {
            query.push(" AND insight_type = ").push_bind(insight_type.as_str());
        }
        if let Some(priority) = filter.priority {
            query.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(tool_name) = &filter.tool_name {
            query.push(" AND tool_name = ").push_bind(tool_name.clone());
        }
        query.push(" ORDER BY created_at_ms DESC, id ASC");
        push_limit(&mut query, filter.limit);

        let rows = query.build().fetch_all(self.pool.pool()).await?;
        decode_all(&rows)
    }

    async fn save_stats_cache(&self, key: &str, stats: &LearningStats) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(stats)?;
        sqlx::query("INSERT OR REPLACE INTO stats_cache (key, updated_at_ms, data) VALUES (?, ?, ?)")
            .bind(key)
            .bind(stats.last_updated.timestamp_millis())
            .bind(data)
            .execute(self.pool.pool())
            .await?;
        Ok(())
    }

    async fn load_stats_cache(&self, key: &str) -> Result<Option<LearningStats>, PersistenceError> {
        let row = sqlx::query("SELECT data FROM stats_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool.pool())
            .await?;
        row.as_ref().map(decode::<LearningStats>).transpose()
    }

    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<CleanupReport, PersistenceError> {
        let cutoff_ms = cutoff.timestamp_millis();
        let mut tx = self.pool.pool().begin().await?;

        let executions = sqlx::query("DELETE FROM executions WHERE timestamp_ms < ?")
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let patterns = sqlx::query("DELETE FROM patterns WHERE last_seen_ms < ?")
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let insights = sqlx::query("DELETE FROM insights WHERE created_at_ms < ?")
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let stats = sqlx::query("DELETE FROM stats_cache WHERE updated_at_ms < ?")
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        let report = CleanupReport {
            executions,
            patterns,
            insights,
            stats,
        };
        tracing::debug!(?report, "Retention cleanup finished");
        Ok(report)
    }

    async fn health_check(&self) -> Result<(), PersistenceError> {
        self.pool.health_check().await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
