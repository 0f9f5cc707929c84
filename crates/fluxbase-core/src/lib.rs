pub mod auth;
pub mod config;
pub mod cron;
pub mod error;
pub mod observability;
pub mod principal;
pub mod procedure;
pub mod rate_limit;

// Testing utilities - available when the "testing" feature is enabled or in test mode
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::{Claims, ClaimsBuilder, TokenType};
pub use config::FluxbaseConfig;
pub use cron::{CronContext, CronLog, CronSchedule};
pub use error::{FluxbaseError, Result};
pub use observability::{LogEntry, LogLevel, Metric, MetricKind, MetricLabels, MetricValue};
pub use principal::{ExecutionContext, Principal, PrincipalRole, RequestMetadata};
pub use procedure::{Execution, ExecutionStatus, Procedure, ProcedureSource};
pub use rate_limit::{RateLimitConfig, RateLimitHeaders, RateLimitKey, RateLimitResult};
