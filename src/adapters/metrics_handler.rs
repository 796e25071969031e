use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts,
    Registry, TextEncoder,
};
use crate::registry::ToolRegistry;
use std::sync::Arc;

pub struct MetricsCollector {
    registry: Registry,

    // Invocation metrics
    pub invocations_total: CounterVec,
    pub invocation_duration: HistogramVec,

    // Session metrics
    pub active_sessions: IntGauge,
    pub stream_events_dropped: IntCounter,

    // Registry metrics
    pub registered_tools: IntGauge,

    // Telemetry metrics
    pub telemetry_persisted: Counter,
    pub telemetry_failed: Counter,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let invocations_total = CounterVec::new(
            Opts::new("toolsmith_invocations_total", "Total tool invocations"),
            &["tool", "status"],
        )?;
        registry.register(Box::new(invocations_total.clone()))?;

        let invocation_duration = HistogramVec::new(
            HistogramOpts::new(
                "toolsmith_invocation_duration_seconds",
                "Tool execution duration in seconds",
            ),
            &["tool"],
        )?;
        registry.register(Box::new(invocation_duration.clone()))?;

        let active_sessions =
            IntGauge::new("toolsmith_active_sessions", "Number of live agent sessions")?;
        registry.register(Box::new(active_sessions.clone()))?;

        let stream_events_dropped = IntCounter::new(
            "toolsmith_stream_events_dropped_total",
            "Events dropped because a subscriber buffer was full",
        )?;
        registry.register(Box::new(stream_events_dropped.clone()))?;

        let registered_tools =
            IntGauge::new("toolsmith_registered_tools", "Number of registered tools")?;
        registry.register(Box::new(registered_tools.clone()))?;

        let telemetry_persisted = Counter::new(
            "toolsmith_telemetry_persisted_total",
            "Execution records written to the learning store",
        )?;
        registry.register(Box::new(telemetry_persisted.clone()))?;

        let telemetry_failed = Counter::new(
            "toolsmith_telemetry_failed_total",
            "Execution records that failed to persist",
        )?;
        registry.register(Box::new(telemetry_failed.clone()))?;

        Ok(Self {
            registry,
            invocations_total,
            invocation_duration,
            active_sessions,
            stream_events_dropped,
            registered_tools,
            telemetry_persisted,
            telemetry_failed,
        })
    }

    pub fn record_invocation(&self, tool: &str, status: &str, duration_secs: f64) {
        self.invocations_total
            .with_label_values(&[tool, status])
            .inc();
        self.invocation_duration
            .with_label_values(&[tool])
            .observe(duration_secs);
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub struct MetricsHandler {
    collector: Arc<MetricsCollector>,
    registry: Option<ToolRegistry>,
}

impl MetricsHandler {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector,
            registry: None,
        }
    }

    /// Refresh the registered tools gauge from `registry` on every scrape.
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub async fn metrics(&self) -> String {
        if let Some(registry) = &self.registry {
            self.collector
                .registered_tools
                .set(registry.count().await as i64);
        }
        self.collector.encode().unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
            String::from("# Error encoding metrics\n")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_encoding() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_invocation("echo", "success", 0.002);
        collector.active_sessions.set(3);
        collector.telemetry_persisted.inc();

        let text = collector.encode().unwrap();
        assert!(text.contains("toolsmith_invocations_total"));
        assert!(text.contains("toolsmith_active_sessions 3"));
        assert!(text.contains("toolsmith_telemetry_persisted_total 1"));
    }

    #[tokio::test]
    async fn test_metrics_handler() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let handler = MetricsHandler::new(collector.clone());

        collector.stream_events_dropped.inc();

        let output = handler.metrics().await;
        assert!(output.contains("toolsmith_stream_events_dropped_total 1"));
    }

    #[tokio::test]
    async fn test_scrape_refreshes_registered_tools() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let registry = ToolRegistry::new(crate::registry::RegistryConfig::default());
        let handler = MetricsHandler::new(collector).with_registry(registry.clone());

        let output = handler.metrics().await;
        let expected = format!("toolsmith_registered_tools {}", registry.count().await);
        assert!(output.contains(&expected));
    }
}
