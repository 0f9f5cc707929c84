mod log;
mod metric;

pub use log::{LogEntry, LogLevel};
pub use metric::{Metric, MetricKind, MetricLabels, MetricValue};
