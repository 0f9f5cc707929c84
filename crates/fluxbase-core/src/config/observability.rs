use serde::{Deserialize, Serialize};

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable metrics collection.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Enable structured logging.
    #[serde(default = "default_true")]
    pub logging_enabled: bool,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            logging_enabled: true,
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (passed through to `tracing_subscriber::EnvFilter`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Slow query threshold in milliseconds; queries above this are logged at `warn`.
    #[serde(default = "default_slow_query_threshold")]
    pub slow_query_threshold_ms: u64,

    /// Whether to output JSON format.
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            slow_query_threshold_ms: default_slow_query_threshold(),
            json_format: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_slow_query_threshold() -> u64 {
    100
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Port the Prometheus exposition endpoint listens on.
    #[serde(default = "default_metrics_port")]
    pub port: u16,

    /// Prometheus endpoint path.
    #[serde(default = "default_prometheus_path")]
    pub prometheus_path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
            prometheus_path: default_prometheus_path(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_prometheus_path() -> String {
    "/metrics".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_observability_config() {
        let config = ObservabilityConfig::default();
        assert!(config.metrics_enabled);
        assert!(config.logging_enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_observability_config() {
        let toml = r#"
            metrics_enabled = true
            logging_enabled = true

            [logging]
            level = "debug"
            slow_query_threshold_ms = 50

            [metrics]
            port = 9091
        "#;

        let config: ObservabilityConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.metrics.port, 9091);
    }
}
