//! Process wiring: builds every `fluxbase-runtime` component from a
//! `FluxbaseConfig` and runs the gateway, the scheduler, and the pool-metrics
//! poller until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use fluxbase_core::config::FluxbaseConfig;
use fluxbase_core::error::{FluxbaseError, Result};
use fluxbase_core::observability::MetricLabels;
use fluxbase_runtime::cron::{ScheduleRegistry, Scheduler, SchedulerHandle};
use fluxbase_runtime::gateway::{AppState, GatewayConfig, GatewayServer};
use fluxbase_runtime::observability::ObservabilityState;
use fluxbase_runtime::procedure::ProcedureExecutor;
use fluxbase_runtime::procedure::ProcedureStore;
use fluxbase_runtime::rate_limit::{InMemoryRateLimiter, SharedRateLimiter};
use fluxbase_runtime::schema::SchemaInspector;
use fluxbase_runtime::{AuthService, Database};

/// Interval on which pool-level connection metrics are polled and pushed
/// into the observability registry, since `sqlx` exposes no push-based hook.
const POOL_METRICS_INTERVAL: Duration = Duration::from_secs(15);

/// Prelude for embedders that want to construct a `Fluxbase` runtime
/// programmatically rather than through the `fluxbase` CLI.
pub mod prelude {
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;

    pub type Timestamp = DateTime<Utc>;

    pub use fluxbase_core::config::FluxbaseConfig;
    pub use fluxbase_core::error::{FluxbaseError, Result};
    pub use fluxbase_core::principal::{Principal, PrincipalRole};

    pub use crate::{Fluxbase, FluxbaseBuilder};
}

/// The assembled platform: every component `serve` needs, built but not yet
/// running.
pub struct Fluxbase {
    config: FluxbaseConfig,
    db: Database,
    state: AppState,
    registry: ScheduleRegistry,
    shutdown_tx: broadcast::Sender<()>,
}

impl Fluxbase {
    /// Start a builder for configuring and constructing the runtime.
    pub fn builder() -> FluxbaseBuilder {
        FluxbaseBuilder::new()
    }

    pub fn config(&self) -> &FluxbaseConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run the gateway and the scheduler until `ctrl_c`, `SIGTERM`, or an
    /// explicit call to `shutdown` stops them, then drain in-flight work and
    /// close the pool.
    pub async fn serve(self) -> Result<()> {
        tracing::info!("fluxbase starting");

        let scheduler = Scheduler::new(
            self.registry.clone(),
            self.state.executor.clone(),
            self.state.observability.clone(),
            self.config.scheduler.clone(),
        );
        let scheduler_handle = scheduler.spawn();

        let metrics_task = spawn_pool_metrics_poller(self.db.clone(), self.state.observability.clone());

        let gateway_config = GatewayConfig::from(self.config.gateway.clone());
        let gateway = GatewayServer::new(gateway_config, self.state.clone());
        let addr = gateway.addr();

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let server = gateway
            .into_router()
            .into_make_service_with_connect_info::<std::net::SocketAddr>();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| FluxbaseError::Internal(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "gateway listening");

        let serve_result = axum::serve(listener, server).with_graceful_shutdown(async move {
            tokio::select! {
                _ = wait_for_termination() => {
                    tracing::info!("received shutdown signal");
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("received shutdown notification");
                }
            }
        });

        let result = serve_result.await.map_err(|e| FluxbaseError::Internal(format!("gateway error: {e}")));

        tracing::info!("draining scheduler");
        shutdown_scheduler(scheduler_handle).await;
        metrics_task.abort();
        self.db.close().await;
        tracing::info!("fluxbase stopped");

        result
    }

    /// Request shutdown of a running `serve` future from elsewhere in the
    /// process (e.g. a test harness).
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn shutdown_scheduler(handle: SchedulerHandle) {
    handle.stop().await;
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

fn spawn_pool_metrics_poller(db: Database, observability: ObservabilityState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(POOL_METRICS_INTERVAL);
        loop {
            interval.tick().await;
            let pool = db.pool();
            let labels = MetricLabels::new();
            observability
                .set_gauge("db_pool_size", &labels, pool.size() as f64)
                .await;
            observability
                .set_gauge("db_pool_idle", &labels, pool.num_idle() as f64)
                .await;
        }
    })
}

/// Builder assembling a [`Fluxbase`] runtime from configuration.
pub struct FluxbaseBuilder {
    config: Option<FluxbaseConfig>,
}

impl FluxbaseBuilder {
    pub fn new() -> Self {
        Self { config: None }
    }

    pub fn config(mut self, config: FluxbaseConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Connect to the database and build every component. Procedures are
    /// loaded from storage into the in-memory cache as part of
    /// `ProcedureStore::load`; the filesystem sync (if configured) is a
    /// separate, explicit step via `fluxbase procedures sync`.
    pub async fn build(self) -> Result<Fluxbase> {
        let config = self
            .config
            .ok_or_else(|| FluxbaseError::Config("configuration is required".to_string()))?;

        let db = Database::from_config(&config.database).await?;
        let pool = db.pool().clone();

        let auth = AuthService::new(pool.clone(), config.security.auth.clone());
        let store = ProcedureStore::load(pool.clone()).await?;
        let executor = ProcedureExecutor::new(store.clone(), db.clone());
        let inspector = SchemaInspector::new(pool.clone());
        let observability = ObservabilityState::new();
        let rate_limiter: SharedRateLimiter = Arc::new(InMemoryRateLimiter::new());

        let state = AppState {
            auth,
            executor,
            store,
            inspector,
            rate_limiter,
            observability,
            rate_limit_settings: config.security.rate_limit.clone(),
        };

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Fluxbase {
            config,
            db,
            state,
            registry: ScheduleRegistry::new(),
            shutdown_tx,
        })
    }
}

impl Default for FluxbaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_config() {
        let builder = FluxbaseBuilder::new();
        assert!(builder.config.is_none());
    }
}
