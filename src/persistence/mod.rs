//! Durable storage for the learning pipeline
//!
//! Embedded SQLite via sqlx. Four collections live side by side:
//!
//! - `executions`: one row per observed tool execution, keyed by time then id
//! - `patterns`: analyzer output
//! - `insights`: reflector output
//! - `stats_cache`: the last computed [`LearningStats`](crate::domain::LearningStats)
//!
//! # Example
//!
//! ```rust,no_run
//! use toolsmith::persistence::{open_store, PersistenceConfig, LearningStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = open_store(&PersistenceConfig::default()).await?;
//!     println!("{} executions stored", store.count_executions().await?);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod store;


pub use error::PersistenceError;
pub use migrations::{MigrationResult, MigrationRunner, MigrationStatus};
pub use pool::ConnectionPool;
pub use store::{CleanupReport, InsightFilter, LearningStore, PatternFilter, SqlxLearningStore};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    /// `sqlite://toolsmith.db` or `sqlite::memory:`
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Run migrations when the store is opened
    #[serde(default = "default_auto_migrate")]
    pub auto_migrate: bool,
}

fn default_url() -> String {
    "sqlite://toolsmith.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_auto_migrate() -> bool {
    true
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            auto_migrate: default_auto_migrate(),
        }
    }
}

/// Connects, migrates when configured, and returns the ready store.
pub async fn open_store(config: &PersistenceConfig) -> Result<Arc<SqlxLearningStore>, PersistenceError> {
    let pool = ConnectionPool::new(
        &config.url,
        config.max_connections,
        config.connect_timeout_secs,
    )
    .await?;

    if config.auto_migrate {
        let result = MigrationRunner::new(pool.clone()).migrate_up().await?;
        tracing::info!(
            applied = result.applied,
            skipped = result.skipped,
            "Learning store migrations complete"
        );
    }

    Ok(Arc::new(SqlxLearningStore::new(pool)))
}
