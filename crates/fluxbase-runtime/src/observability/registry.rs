use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use fluxbase_core::observability::{Metric, MetricKind, MetricLabels, MetricValue};

fn label_key(labels: &MetricLabels) -> String {
    let mut pairs: Vec<_> = labels.iter().collect();
    pairs.sort_by_key(|(k, _)| k.clone());
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn render_labels(labels: &MetricLabels) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<_> = labels.iter().collect();
    pairs.sort_by_key(|(k, _)| k.clone());
    let rendered = pairs
        .into_iter()
        .map(|(k, v)| format!("{k}=\"{}\"", v.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{rendered}}}")
}

#[derive(Default)]
struct Series {
    counters: HashMap<String, AtomicU64Bits>,
    gauges: HashMap<String, AtomicU64Bits>,
    histograms: HashMap<String, Histogram>,
}

/// An f64 stored bit-for-bit in an AtomicU64 so counters/gauges can be
/// updated without a lock on the hot path.
struct AtomicU64Bits(AtomicU64);

impl AtomicU64Bits {
    fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn add(&self, delta: f64) {
        loop {
            let cur = self.0.load(Ordering::Relaxed);
            let new = (f64::from_bits(cur) + delta).to_bits();
            if self
                .0
                .compare_exchange_weak(cur, new, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn set(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

struct Histogram {
    bounds: Vec<f64>,
    bucket_counts: Vec<AtomicU64>,
    sum: AtomicU64Bits,
    count: AtomicU64,
}

impl Histogram {
    fn new(bounds: Vec<f64>) -> Self {
        let bucket_counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            bucket_counts,
            sum: AtomicU64Bits::new(0.0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, value: f64) {
        self.sum.add(value);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (i, bound) in self.bounds.iter().enumerate() {
            if value <= *bound {
                self.bucket_counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.bucket_counts[self.bounds.len()].fetch_add(1, Ordering::Relaxed);
    }
}

/// Default latency bucket bounds in seconds, matching common HTTP SLOs.
fn default_duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
}

/// In-process Prometheus-style metrics registry.
///
/// Each named metric owns one `Series` keyed by its rendered label set, so
/// distinct label combinations accumulate independently without needing a
/// lock per observation on separate series.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<RwLock<HashMap<String, Series>>>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn incr_counter(&self, name: &str, labels: &MetricLabels, delta: f64) {
        let key = label_key(labels);
        let mut map = self.inner.write().await;
        let series = map.entry(name.to_string()).or_default();
        series
            .counters
            .entry(key)
            .or_insert_with(|| AtomicU64Bits::new(0.0))
            .add(delta);
    }

    pub async fn set_gauge(&self, name: &str, labels: &MetricLabels, value: f64) {
        let key = label_key(labels);
        let mut map = self.inner.write().await;
        let series = map.entry(name.to_string()).or_default();
        series
            .gauges
            .entry(key)
            .or_insert_with(|| AtomicU64Bits::new(0.0))
            .set(value);
    }

    pub async fn observe_duration(&self, name: &str, labels: &MetricLabels, seconds: f64) {
        let key = label_key(labels);
        let mut map = self.inner.write().await;
        let series = map.entry(name.to_string()).or_default();
        series
            .histograms
            .entry(key)
            .or_insert_with(|| Histogram::new(default_duration_buckets()))
            .observe(seconds);
    }

    /// Ingest a [`Metric`] produced elsewhere in the crate, dispatching it
    /// onto the lock-free counter/gauge storage above. Histogram/summary
    /// values carry pre-aggregated buckets rather than a raw observation, so
    /// there is nothing for this registry's own bucketing to do with them;
    /// those are rendered by the caller directly instead of accumulated here.
    pub async fn record(&self, metric: Metric) {
        match (metric.kind, metric.value.as_value()) {
            (MetricKind::Counter, Some(v)) => {
                self.incr_counter(&metric.name, &metric.labels, v).await;
            }
            (MetricKind::Gauge, Some(v)) => {
                self.set_gauge(&metric.name, &metric.labels, v).await;
            }
            _ => {}
        }
    }

    /// Render all series in Prometheus text exposition format.
    pub async fn render(&self) -> String {
        let map = self.inner.read().await;
        let mut out = String::new();

        for (name, series) in map.iter() {
            for (label_key, value) in &series.counters {
                let labels = reconstitute_labels(label_key);
                out.push_str(&format!(
                    "{name}{} {}\n",
                    render_labels(&labels),
                    value.get()
                ));
            }
            for (label_key, value) in &series.gauges {
                let labels = reconstitute_labels(label_key);
                out.push_str(&format!(
                    "{name}{} {}\n",
                    render_labels(&labels),
                    value.get()
                ));
            }
            for (label_key, hist) in &series.histograms {
                let labels = reconstitute_labels(label_key);
                let mut cumulative = 0u64;
                for (i, bound) in hist.bounds.iter().enumerate() {
                    cumulative += hist.bucket_counts[i].load(Ordering::Relaxed);
                    let mut le_labels = labels.clone();
                    le_labels.insert("le".to_string(), bound.to_string());
                    out.push_str(&format!(
                        "{name}_bucket{} {}\n",
                        render_labels(&le_labels),
                        cumulative
                    ));
                }
                let total = hist.count.load(Ordering::Relaxed);
                let mut inf_labels = labels.clone();
                inf_labels.insert("le".to_string(), "+Inf".to_string());
                out.push_str(&format!(
                    "{name}_bucket{} {}\n",
                    render_labels(&inf_labels),
                    total
                ));
                out.push_str(&format!(
                    "{name}_sum{} {}\n",
                    render_labels(&labels),
                    hist.sum.get()
                ));
                out.push_str(&format!("{name}_count{} {}\n", render_labels(&labels), total));
            }
        }

        out
    }
}

fn reconstitute_labels(label_key: &str) -> MetricLabels {
    let mut labels = MetricLabels::new();
    if label_key.is_empty() {
        return labels;
    }
    for pair in label_key.split(',') {
        if let Some((k, v)) = pair.split_once('=') {
            labels.insert(k.to_string(), v.to_string());
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counter_accumulates() {
        let registry = MetricsRegistry::new();
        let labels = MetricLabels::new();
        registry.incr_counter("requests_total", &labels, 1.0).await;
        registry.incr_counter("requests_total", &labels, 1.0).await;

        let rendered = registry.render().await;
        assert!(rendered.contains("requests_total 2"));
    }

    #[tokio::test]
    async fn test_gauge_overwrites() {
        let registry = MetricsRegistry::new();
        let labels = MetricLabels::new();
        registry.set_gauge("in_flight", &labels, 3.0).await;
        registry.set_gauge("in_flight", &labels, 5.0).await;

        let rendered = registry.render().await;
        assert!(rendered.contains("in_flight 5"));
    }

    #[tokio::test]
    async fn test_histogram_buckets_cumulative() {
        let registry = MetricsRegistry::new();
        let labels = MetricLabels::new();
        registry
            .observe_duration("request_duration_seconds", &labels, 0.02)
            .await;

        let rendered = registry.render().await;
        assert!(rendered.contains("request_duration_seconds_bucket"));
        assert!(rendered.contains("request_duration_seconds_count"));
    }

    #[tokio::test]
    async fn test_record_dispatches_counter_metric() {
        let registry = MetricsRegistry::new();
        registry.record(Metric::counter("http_requests_total", 1.0)).await;
        registry.record(Metric::counter("http_requests_total", 1.0)).await;

        let rendered = registry.render().await;
        assert!(rendered.contains("http_requests_total 2"));
    }

    #[tokio::test]
    async fn test_distinct_labels_tracked_separately() {
        let registry = MetricsRegistry::new();
        let mut get = MetricLabels::new();
        get.insert("method".to_string(), "GET".to_string());
        let mut post = MetricLabels::new();
        post.insert("method".to_string(), "POST".to_string());

        registry.incr_counter("requests_total", &get, 1.0).await;
        registry.incr_counter("requests_total", &post, 1.0).await;
        registry.incr_counter("requests_total", &post, 1.0).await;

        let rendered = registry.render().await;
        assert!(rendered.contains("method=\"GET\"} 1"));
        assert!(rendered.contains("method=\"POST\"} 2"));
    }
}
