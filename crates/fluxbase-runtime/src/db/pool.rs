use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use fluxbase_core::config::DatabaseConfig;
use fluxbase_core::error::{FluxbaseError, Result};
use fluxbase_core::principal::Principal;

/// Connection and transaction broker.
///
/// Every request that touches the database goes through `acquire`, which
/// opens one transaction, sets the session's Postgres role and claims so
/// row-level security policies see the calling principal, and hands the
/// transaction to the caller. The caller must explicitly `commit` or
/// `rollback`; dropping a `BrokeredTransaction` without doing either rolls
/// back, so a panicking handler never leaves a write half-applied.
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
    config: DatabaseConfig,
}

impl Database {
    /// Create a new database connection from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::create_pool(config)
            .await
            .map_err(|e| FluxbaseError::Database(format!("failed to connect: {e}")))?;

        Ok(Self {
            pool: Arc::new(pool),
            config: config.clone(),
        })
    }

    async fn create_pool(config: &DatabaseConfig) -> sqlx::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(config.pool_size)
            .min_connections(config.min_pool_size)
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
            .connect(&config.url)
            .await
    }

    /// Raw pool access for migrations, health checks, and code that predates
    /// a principal (e.g. loading a procedure definition before dispatch).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction scoped to `principal`: sets `ROLE`, the
    /// `fluxbase.claims` session variable RLS policies read, and the
    /// configured `statement_timeout`, all as `SET LOCAL` so they vanish at
    /// commit or rollback regardless of which pooled connection served this
    /// transaction next.
    pub async fn acquire(&self, principal: &Principal) -> Result<BrokeredTransaction<'_>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(FluxbaseError::from_sqlx)?;

        let role = principal
            .role()
            .postgres_role(&self.config.authenticated_role, &self.config.anon_role);

        // Role and statement_timeout are structural, not user data: safe to
        // interpolate since they come from fixed config/enum values, never
        // from request input. Claims go through a bound parameter.
        sqlx::query(&format!("SET LOCAL ROLE {role}"))
            .execute(&mut *tx)
            .await
            .map_err(FluxbaseError::from_sqlx)?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.config.statement_timeout_secs * 1000
        ))
        .execute(&mut *tx)
        .await
        .map_err(FluxbaseError::from_sqlx)?;

        sqlx::query("SELECT set_config('fluxbase.claims', $1, true)")
            .bind(principal.claims_json().to_string())
            .execute(&mut *tx)
            .await
            .map_err(FluxbaseError::from_sqlx)?;

        Ok(BrokeredTransaction { tx: Some(tx) })
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| FluxbaseError::Database(format!("health check failed: {e}")))?;
        Ok(())
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// A transaction already configured for a principal by `Database::acquire`.
///
/// Deref to `sqlx::Transaction` for running queries; call `commit` or
/// `rollback` explicitly. If neither is called, `Drop` rolls back — sqlx
/// does this for the inner transaction automatically when it goes out of
/// scope without a `commit().await`.
pub struct BrokeredTransaction<'a> {
    tx: Option<Transaction<'a, Postgres>>,
}

impl<'a> BrokeredTransaction<'a> {
    pub fn as_mut(&mut self) -> &mut Transaction<'a, Postgres> {
        self.tx.as_mut().expect("transaction already consumed")
    }

    pub async fn commit(mut self) -> Result<()> {
        self.tx
            .take()
            .expect("transaction already consumed")
            .commit()
            .await
            .map_err(FluxbaseError::from_sqlx)
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.tx
            .take()
            .expect("transaction already consumed")
            .rollback()
            .await
            .map_err(FluxbaseError::from_sqlx)
    }
}

/// Type alias for the pool type.
pub type DatabasePool = PgPool;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_clone() {
        let config = DatabaseConfig {
            url: "postgres://localhost/test".to_string(),
            pool_size: 10,
            ..Default::default()
        };

        let cloned = config.clone();
        assert_eq!(cloned.url, config.url);
        assert_eq!(cloned.pool_size, config.pool_size);
    }

    #[test]
    fn test_postgres_role_mapping() {
        let config = DatabaseConfig::default();
        assert_eq!(
            Principal::anon()
                .role()
                .postgres_role(&config.authenticated_role, &config.anon_role),
            "anon"
        );
        assert_eq!(
            Principal::service_role()
                .role()
                .postgres_role(&config.authenticated_role, &config.anon_role),
            "service_role"
        );
    }
}
