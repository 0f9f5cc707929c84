mod registry;

pub use registry::MetricsRegistry;

use fluxbase_core::observability::{LogEntry, LogLevel, Metric, MetricLabels};

/// Thin convenience wrapper around `MetricsRegistry` with the label
/// conventions used across the gateway, procedure runtime, and scheduler.
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: MetricsRegistry,
}

impl Default for ObservabilityState {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservabilityState {
    pub fn new() -> Self {
        Self {
            metrics: MetricsRegistry::new(),
        }
    }

    pub async fn incr_counter(&self, name: &str, labels: &MetricLabels, delta: f64) {
        self.metrics.incr_counter(name, labels, delta).await;
    }

    pub async fn set_gauge(&self, name: &str, labels: &MetricLabels, value: f64) {
        self.metrics.set_gauge(name, labels, value).await;
    }

    pub async fn observe_duration(&self, name: &str, labels: &MetricLabels, seconds: f64) {
        self.metrics.observe_duration(name, labels, seconds).await;
    }

    /// Ingest a fully-built [`Metric`] (the call-site type used by gateway
    /// middleware and the scheduler) into the registry.
    pub async fn record(&self, metric: Metric) {
        self.metrics.record(metric).await;
    }

    /// Emit a structured [`LogEntry`] through `tracing`. Levels are dynamic
    /// at the call site but `tracing`'s macros require a literal level, hence
    /// the match.
    pub fn log(&self, entry: LogEntry) {
        let target = entry.target.as_deref().unwrap_or("fluxbase");
        match entry.level {
            LogLevel::Trace => tracing::trace!(target: "fluxbase", log_target = target, fields = ?entry.fields, "{}", entry.message),
            LogLevel::Debug => tracing::debug!(target: "fluxbase", log_target = target, fields = ?entry.fields, "{}", entry.message),
            LogLevel::Info => tracing::info!(target: "fluxbase", log_target = target, fields = ?entry.fields, "{}", entry.message),
            LogLevel::Warn => tracing::warn!(target: "fluxbase", log_target = target, fields = ?entry.fields, "{}", entry.message),
            LogLevel::Error => tracing::error!(target: "fluxbase", log_target = target, fields = ?entry.fields, "{}", entry.message),
        }
    }

    /// Render the current snapshot in Prometheus text exposition format.
    pub async fn render_prometheus(&self) -> String {
        self.metrics.render().await
    }
}
