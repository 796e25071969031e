//! Schema migrations for the learning store

use crate::persistence::error::PersistenceError;
use crate::persistence::pool::ConnectionPool;
use sqlx::Row;

/// Execution records. `key` is `{unix_seconds:020}_{id}`; `timestamp_ms` backs
/// range scans and retention.
const MIGRATION_001_EXECUTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS executions (
    key TEXT PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    tool_name TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    success INTEGER NOT NULL,
    error_type TEXT,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_executions_time ON executions(timestamp_ms);
CREATE INDEX IF NOT EXISTS idx_executions_tool ON executions(tool_name, timestamp_ms);
"#;

const MIGRATION_002_LEARNING_ARTIFACTS: &str = r#"
CREATE TABLE IF NOT EXISTS patterns (
    id TEXT PRIMARY KEY,
    pattern_type TEXT NOT NULL,
    tool_name TEXT,
    last_seen_ms INTEGER NOT NULL,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS insights (
    id TEXT PRIMARY KEY,
    insight_type TEXT NOT NULL,
    priority TEXT NOT NULL,
    tool_name TEXT,
    created_at_ms INTEGER NOT NULL,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stats_cache (
    key TEXT PRIMARY KEY,
    updated_at_ms INTEGER NOT NULL,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patterns_type ON patterns(pattern_type);
CREATE INDEX IF NOT EXISTS idx_patterns_tool ON patterns(tool_name);
CREATE INDEX IF NOT EXISTS idx_patterns_seen ON patterns(last_seen_ms);
CREATE INDEX IF NOT EXISTS idx_insights_type ON insights(insight_type, priority);
CREATE INDEX IF NOT EXISTS idx_insights_tool ON insights(tool_name);
CREATE INDEX IF NOT EXISTS idx_insights_created ON insights(created_at_ms);
"#;

struct Migration {
    name: &'static str,
    sql: &'static str,
    checksum: &'static str,
}

fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            name: "001_executions",
            sql: MIGRATION_001_EXECUTIONS,
            checksum: "v1",
        },
        Migration {
            name: "002_learning_artifacts",
            sql: MIGRATION_002_LEARNING_ARTIFACTS,
            checksum: "v1",
        },
    ]
}

/// Splits a migration script into executable statements, ignoring `--` comment lines.
fn statements(sql: &str) -> impl Iterator<Item = String> + '_ {
    sql.split(';').filter_map(|chunk| {
        let statement: Vec<&str> = chunk
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("--"))
            .collect();
        if statement.is_empty() {
            None
        } else {
            Some(statement.join("\n"))
        }
    })
}

pub struct MigrationRunner {
    pool: ConnectionPool,
}

impl MigrationRunner {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations, each inside its own transaction
    pub async fn migrate_up(&self) -> Result<MigrationResult, PersistenceError> {
        let mut applied = 0;
        let mut skipped = 0;

        self.ensure_migrations_table().await?;

        for migration in get_migrations() {
            if self.is_migration_applied(migration.name).await? {
                tracing::debug!("Migration '{}' already applied, skipping", migration.name);
                skipped += 1;
                continue;
            }

            tracing::info!("Applying migration: {}", migration.name);

            let mut tx = self.pool.pool().begin().await?;
            for statement in statements(migration.sql) {
                sqlx::query(&statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        PersistenceError::Migration(format!(
                            "Failed to execute migration '{}': {}",
                            migration.name, e
                        ))
                    })?;
            }

            sqlx::query(
                "INSERT INTO _toolsmith_migrations (name, applied_at, checksum) VALUES (?, ?, ?)",
            )
            .bind(migration.name)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(migration.checksum)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                PersistenceError::Migration(format!("Failed to record migration: {}", e))
            })?;

            tx.commit().await?;
            applied += 1;
        }

        Ok(MigrationResult { applied, skipped })
    }

    pub async fn status(&self) -> Result<Vec<MigrationStatus>, PersistenceError> {
        self.ensure_migrations_table().await?;

        let mut statuses = Vec::new();
        for migration in get_migrations() {
            let applied_at = self.get_migration_applied_at(migration.name).await?;
            statuses.push(MigrationStatus {
                name: migration.name.to_string(),
                applied: applied_at.is_some(),
                applied_at,
            });
        }
        Ok(statuses)
    }

    async fn ensure_migrations_table(&self) -> Result<(), PersistenceError> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS _toolsmith_migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                applied_at TEXT NOT NULL,
                checksum TEXT NOT NULL
            )
        "#;

        sqlx::query(sql)
            .execute(self.pool.pool())
            .await
            .map_err(|e| {
                PersistenceError::Migration(format!("Failed to create migrations table: {}", e))
            })?;

        Ok(())
    }

    async fn is_migration_applied(&self, name: &str) -> Result<bool, PersistenceError> {
        Ok(self.get_migration_applied_at(name).await?.is_some())
    }

    async fn get_migration_applied_at(
        &self,
        name: &str,
    ) -> Result<Option<String>, PersistenceError> {
        let row = sqlx::query("SELECT applied_at FROM _toolsmith_migrations WHERE name = ?")
            .bind(name)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| {
                PersistenceError::Migration(format!("Failed to check migration status: {}", e))
            })?;

        match row {
            Some(row) => Ok(Some(row.try_get("applied_at")?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug)]
pub struct MigrationResult {
    pub applied: usize,
    /// Already applied before this run
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub name: String,
    pub applied: bool,
    pub applied_at: Option<String>,
}
