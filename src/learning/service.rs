use super::analyzer::PatternAnalyzer;
use super::collector::TelemetryCollector;
use super::reflector::InsightReflector;
use super::stats::compute_stats;
use super::{LearningConfig, LearningError};
use crate::adapters::metrics_handler::MetricsCollector;
use crate::domain::{Insight, LearningStats, Pattern};
use crate::persistence::{CleanupReport, InsightFilter, LearningStore, PatternFilter};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub const STATS_CACHE_KEY: &str = "latest";
const STATS_PATTERN_LIMIT: usize = 10;
const STATS_INSIGHT_LIMIT: usize = 10;

/// Outcome of one analysis and reflection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub patterns: Vec<Pattern>,
    pub insights: Vec<Insight>,
    pub stats: LearningStats,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub analysis: AnalysisReport,
    pub cleanup: CleanupReport,
}

/// Query surface and maintenance driver of the learning pipeline.
pub struct LearningService {
    store: Arc<dyn LearningStore>,
    config: Arc<RwLock<LearningConfig>>,
    collector: Arc<TelemetryCollector>,
    analyzer: PatternAnalyzer,
    reflector: InsightReflector,
}

impl LearningService {
    pub fn new(
        store: Arc<dyn LearningStore>,
        config: LearningConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let config = Arc::new(RwLock::new(config));
        let mut collector = TelemetryCollector::new(store.clone(), config.clone());
        if let Some(metrics) = metrics {
            collector = collector.with_metrics(metrics);
        }
        Self {
            analyzer: PatternAnalyzer::new(store.clone(), config.clone()),
            reflector: InsightReflector::new(store.clone()),
            collector: Arc::new(collector),
            store,
            config,
        }
    }

    pub fn collector(&self) -> Arc<TelemetryCollector> {
        self.collector.clone()
    }

    pub fn store(&self) -> Arc<dyn LearningStore> {
        self.store.clone()
    }

    /// Fresh aggregate over every retained record, with the most recent
    /// patterns and insights attached.
    pub async fn get_stats(&self) -> Result<LearningStats, LearningError> {
        let (retention_days, top_n) = {
            let config = self.config.read().await;
            (config.retention_days, config.top_tools)
        };
        let since = Utc::now() - Duration::days(i64::from(retention_days));
        let records = self.store.list_executions(Some(since), None, None).await?;

        let mut stats = compute_stats(&records, top_n);
        stats.recent_patterns = self
            .store
            .list_patterns(&PatternFilter {
                limit: Some(STATS_PATTERN_LIMIT),
                ..Default::default()
            })
            .await?;
        stats.active_insights = self
            .store
            .list_insights(&InsightFilter {
                limit: Some(STATS_INSIGHT_LIMIT),
                ..Default::default()
            })
            .await?;
        Ok(stats)
    }

    /// Stats stored by the last analysis pass, if any.
    pub async fn cached_stats(&self) -> Result<Option<LearningStats>, LearningError> {
        Ok(self.store.load_stats_cache(STATS_CACHE_KEY).await?)
    }

    pub async fn list_insights(&self, filter: &InsightFilter) -> Result<Vec<Insight>, LearningError> {
        Ok(self.store.list_insights(filter).await?)
    }

    pub async fn list_patterns(&self, filter: &PatternFilter) -> Result<Vec<Pattern>, LearningError> {
        Ok(self.store.list_patterns(filter).await?)
    }

    pub async fn get_tool_insights(&self, tool_name: &str) -> Result<Vec<Insight>, LearningError> {
        self.list_insights(&InsightFilter {
            tool_name: Some(tool_name.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Analyze the window, reflect on the result and cache the stats.
    pub async fn run_analysis(&self) -> Result<AnalysisReport, LearningError> {
        let started = std::time::Instant::now();
        let (window_hours, top_n) = {
            let config = self.config.read().await;
            (config.analysis_window_hours, config.top_tools)
        };

        let patterns = self.analyzer.analyze().await?;

        let since = Utc::now() - Duration::hours(i64::from(window_hours));
        let records = self.store.list_executions(Some(since), None, None).await?;
        let mut stats = compute_stats(&records, top_n);

        let insights = self.reflector.reflect(&patterns, &stats).await?;

        stats.recent_patterns = patterns.clone();
        stats.active_insights = insights.clone();
        self.store.save_stats_cache(STATS_CACHE_KEY, &stats).await?;

        Ok(AnalysisReport {
            patterns,
            insights,
            stats,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Analysis followed by retention cleanup.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, LearningError> {
        let analysis = self.run_analysis().await?;
        let retention_days = self.config.read().await.retention_days;
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let cleanup = self.store.cleanup(cutoff).await?;

        info!(
            patterns = analysis.patterns.len(),
            insights = analysis.insights.len(),
            removed = cleanup.total(),
            "Learning maintenance finished"
        );
        Ok(MaintenanceReport { analysis, cleanup })
    }

    pub async fn get_config(&self) -> LearningConfig {
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, config: LearningConfig) -> Result<LearningConfig, LearningError> {
        config.validate()?;
        *self.config.write().await = config.clone();
        info!(
            enabled = config.enabled,
            sample_rate = config.sample_rate,
            "Learning configuration updated"
        );
        Ok(config)
    }

    pub async fn health_check(&self) -> Result<(), LearningError> {
        Ok(self.store.health_check().await?)
    }

    /// Periodic maintenance on `analysis_interval_secs`. The task ends once
    /// the service is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let interval_secs = match weak.upgrade() {
                    Some(service) => service.config.read().await.analysis_interval_secs.max(1),
                    None => break,
                };
                tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;

                let Some(service) = weak.upgrade() else {
                    break;
                };
                if !service.config.read().await.enabled {
                    continue;
                }
                if let Err(e) = service.run_maintenance().await {
                    error!("Learning maintenance failed: {}", e);
                }
            }
        })
    }
}
