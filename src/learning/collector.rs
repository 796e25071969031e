//! Telemetry collection: sampling, sanitizing and persisting execution records

use super::classifier::classify_error;
use super::sanitize::sanitize;
use super::{LearningConfig, LearningError};
use crate::adapters::metrics_handler::MetricsCollector;
use crate::domain::{ExecutionContext, ExecutionRecord};
use crate::persistence::LearningStore;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, warn};

/// What happened to one `collect_execution` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    Disabled,
    SampledOut,
    /// Successful execution while `include_successful` is off
    SkippedSuccess,
    /// Written before returning
    Persisted(String),
    /// Handed to a background write
    Queued(String),
}

impl CollectOutcome {
    pub fn record_id(&self) -> Option<&str> {
        match self {
            CollectOutcome::Persisted(id) | CollectOutcome::Queued(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Default)]
struct PendingWrites {
    count: AtomicUsize,
    idle: Notify,
}

pub struct TelemetryCollector {
    store: Arc<dyn LearningStore>,
    config: Arc<RwLock<LearningConfig>>,
    rng: Mutex<StdRng>,
    pending: Arc<PendingWrites>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl TelemetryCollector {
    pub fn new(store: Arc<dyn LearningStore>, config: Arc<RwLock<LearningConfig>>) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
            pending: Arc::new(PendingWrites::default()),
            metrics: None,
        }
    }

    /// Deterministic sampling for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> Arc<RwLock<LearningConfig>> {
        self.config.clone()
    }

    /// Decide whether to record the execution, build the record and persist it
    /// (inline or in the background, per `async_collection`). Store failures
    /// in background mode are logged and swallowed.
    pub async fn collect_execution(
        &self,
        ctx: &ExecutionContext,
        input: &Value,
        output: Option<&Value>,
        error: Option<&str>,
        duration: Duration,
    ) -> Result<CollectOutcome, LearningError> {
        let config = self.config.read().await.clone();

        if !config.enabled {
            return Ok(CollectOutcome::Disabled);
        }
        if !self.should_sample(config.sample_rate) {
            return Ok(CollectOutcome::SampledOut);
        }
        if error.is_none() && !config.include_successful {
            return Ok(CollectOutcome::SkippedSuccess);
        }

        let record = build_record(&config, ctx, input, output, error, duration);
        let id = record.id.clone();

        if config.async_collection {
            let store = self.store.clone();
            let metrics = self.metrics.clone();
            self.track(async move {
                let _ = persist(store.as_ref(), metrics.as_deref(), &record).await;
            });
            Ok(CollectOutcome::Queued(id))
        } else {
            persist(self.store.as_ref(), self.metrics.as_deref(), &record).await?;
            Ok(CollectOutcome::Persisted(id))
        }
    }

    /// Runs the whole collection off the caller's task. Used on the
    /// invocation path so the response never waits on telemetry.
    pub fn spawn_collect(
        self: &Arc<Self>,
        ctx: ExecutionContext,
        input: Value,
        output: Option<Value>,
        error: Option<String>,
        duration: Duration,
    ) {
        let collector = self.clone();
        self.track(async move {
            if let Err(e) = collector
                .collect_execution(&ctx, &input, output.as_ref(), error.as_deref(), duration)
                .await
            {
                warn!(tool = %ctx.tool_name, "Telemetry collection failed: {}", e);
            }
        });
    }

    /// Waits until every background write started so far has finished.
    pub async fn flush(&self) {
        loop {
            let idle = self.pending.idle.notified();
            if self.pending.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    fn should_sample(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            false
        } else if rate >= 1.0 {
            true
        } else {
            self.rng.lock().gen::<f64>() < rate
        }
    }

    fn track<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pending = self.pending.clone();
        pending.count.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            task.await;
            if pending.count.fetch_sub(1, Ordering::AcqRel) == 1 {
                pending.idle.notify_waiters();
            }
        });
    }
}

async fn persist(
    store: &dyn LearningStore,
    metrics: Option<&MetricsCollector>,
    record: &ExecutionRecord,
) -> Result<(), LearningError> {
    match store.save_execution(record).await {
        Ok(()) => {
            if let Some(metrics) = metrics {
                metrics.telemetry_persisted.inc();
            }
            debug!(tool = %record.tool_name, id = %record.id, "Execution recorded");
            Ok(())
        }
        Err(e) => {
            if let Some(metrics) = metrics {
                metrics.telemetry_failed.inc();
            }
            warn!(tool = %record.tool_name, "Failed to persist execution record: {}", e);
            Err(e.into())
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builds the sanitized record for one execution.
pub fn build_record(
    config: &LearningConfig,
    ctx: &ExecutionContext,
    input: &Value,
    output: Option<&Value>,
    error: Option<&str>,
    duration: Duration,
) -> ExecutionRecord {
    let input = (!input.is_null())
        .then(|| sanitize(&render(input), config.max_input_size, config.redact_pii));
    let output = output
        .filter(|value| !value.is_null())
        .map(|value| sanitize(&render(value), config.max_output_size, config.redact_pii));

    let mut context = HashMap::new();
    if let Some(session_id) = &ctx.session_id {
        context.insert("session_id".to_string(), json!(session_id));
    }
    if let Some(agent_id) = &ctx.agent_id {
        context.insert("agent_id".to_string(), json!(agent_id));
    }
    if let Some(invocation_id) = &ctx.invocation_id {
        context.insert("invocation_id".to_string(), json!(invocation_id));
    }

    ExecutionRecord {
        id: uuid::Uuid::new_v4().to_string(),
        tool_name: ctx.tool_name.clone(),
        timestamp: Utc::now(),
        duration_ms: duration.as_secs_f64() * 1000.0,
        success: error.is_none(),
        input,
        output,
        error_message: error.map(|message| {
            if config.redact_pii {
                super::sanitize::redact_pii(message)
            } else {
                message.to_string()
            }
        }),
        error_type: error.map(classify_error),
        context,
        source_type: ctx.source_type.clone(),
    }
}
