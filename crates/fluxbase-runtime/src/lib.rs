//! Everything that touches a live `PgPool`: the connection broker, the
//! procedure runtime, the scheduler, the HTTP gateway, schema introspection,
//! and the in-process metrics registry.
//!
//! `fluxbase_core` owns the pure data model and logic; this crate wires it to
//! PostgreSQL and to the network.

pub mod auth;
pub mod cron;
pub mod db;
pub mod gateway;
pub mod observability;
pub mod procedure;
pub mod rate_limit;
pub mod schema;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::AuthService;
pub use cron::{ScheduledEntry, Scheduler, SchedulerHandle};
pub use db::{BrokeredTransaction, Database, DatabasePool};
pub use gateway::{GatewayConfig, GatewayServer};
pub use observability::ObservabilityState;
pub use procedure::{ProcedureExecutor, ProcedureStore};
pub use rate_limit::{InMemoryRateLimiter, PostgresRateLimiter, RateLimiter, SharedRateLimiter};
pub use schema::{ColumnInfo, ForeignKeyInfo, SchemaInspector, TableInfo};
