//! Durable storage for `Procedure` entities plus a copy-on-write in-memory
//! cache so request handling never blocks on the database just to resolve
//! `(namespace, name) -> Procedure`.
//!
//! Schema contract (owned by the migration tool, per `spec.md` §6): a
//! `rpc.procedures` table whose columns mirror `Procedure`'s fields
//! one-for-one.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::{PgPool, Row};
use tokio::sync::RwLock;

use fluxbase_core::error::{FluxbaseError, Result};
use fluxbase_core::principal::PrincipalRole;
use fluxbase_core::procedure::{Procedure, ProcedureSource};

type Key = (String, String);

#[derive(Clone)]
pub struct ProcedureStore {
    pool: PgPool,
    cache: Arc<RwLock<HashMap<Key, Arc<Procedure>>>>,
}

impl ProcedureStore {
    /// Load the full persisted set into the in-memory cache.
    pub async fn load(pool: PgPool) -> Result<Self> {
        let store = Self {
            pool,
            cache: Arc::new(RwLock::new(HashMap::new())),
        };
        store.refresh().await?;
        Ok(store)
    }

    pub async fn refresh(&self) -> Result<()> {
        let rows = sqlx::query("SELECT * FROM rpc.procedures")
            .fetch_all(&self.pool)
            .await
            .map_err(FluxbaseError::Sql)?;

        let mut cache = HashMap::with_capacity(rows.len());
        for row in rows {
            let procedure = row_to_procedure(&row)?;
            cache.insert(procedure.key(), Arc::new(procedure));
        }
        *self.cache.write().await = cache;
        Ok(())
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Option<Arc<Procedure>> {
        self.cache
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// A consistent, cheaply-cloned snapshot (`Arc` bumps only) for one
    /// request's duration — no reader blocks another, and no reader sees a
    /// write that started after the snapshot was taken.
    pub async fn snapshot(&self) -> Vec<Arc<Procedure>> {
        self.cache.read().await.values().cloned().collect()
    }

    pub async fn snapshot_namespace(&self, namespace: &str) -> Vec<Arc<Procedure>> {
        self.cache
            .read()
            .await
            .values()
            .filter(|p| p.namespace == namespace)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert or update a procedure. Returns the prior version, if any.
    pub async fn upsert(&self, procedure: Procedure) -> Result<Option<Arc<Procedure>>> {
        sqlx::query(
            "INSERT INTO rpc.procedures (
                id, namespace, name, sql_query, original_code, description,
                allowed_schemas, allowed_tables, require_roles, is_public,
                max_execution_time_seconds, disable_execution_logs, schedule,
                enabled, source, version, created_by, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            ON CONFLICT (namespace, name) DO UPDATE SET
                sql_query = EXCLUDED.sql_query,
                original_code = EXCLUDED.original_code,
                description = EXCLUDED.description,
                allowed_schemas = EXCLUDED.allowed_schemas,
                allowed_tables = EXCLUDED.allowed_tables,
                require_roles = EXCLUDED.require_roles,
                is_public = EXCLUDED.is_public,
                max_execution_time_seconds = EXCLUDED.max_execution_time_seconds,
                disable_execution_logs = EXCLUDED.disable_execution_logs,
                schedule = EXCLUDED.schedule,
                enabled = EXCLUDED.enabled,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(procedure.id)
        .bind(&procedure.namespace)
        .bind(&procedure.name)
        .bind(&procedure.sql_query)
        .bind(&procedure.original_code)
        .bind(&procedure.description)
        .bind(&procedure.allowed_schemas)
        .bind(&procedure.allowed_tables)
        .bind(
            procedure
                .require_roles
                .iter()
                .map(|r| r.as_str().to_string())
                .collect::<Vec<_>>(),
        )
        .bind(procedure.is_public)
        .bind(procedure.max_execution_time_seconds as i32)
        .bind(procedure.disable_execution_logs)
        .bind(&procedure.schedule)
        .bind(procedure.enabled)
        .bind(procedure.source.as_str())
        .bind(procedure.version)
        .bind(procedure.created_by)
        .bind(procedure.created_at)
        .bind(procedure.updated_at)
        .execute(&self.pool)
        .await
        .map_err(FluxbaseError::Sql)?;

        let key = procedure.key();
        let prior = self.cache.write().await.insert(key, Arc::new(procedure));
        Ok(prior)
    }

    pub async fn remove(&self, namespace: &str, name: &str) -> Result<Option<Arc<Procedure>>> {
        sqlx::query("DELETE FROM rpc.procedures WHERE namespace = $1 AND name = $2")
            .bind(namespace)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(FluxbaseError::Sql)?;

        Ok(self
            .cache
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string())))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_procedure(row: &sqlx::postgres::PgRow) -> Result<Procedure> {
    let require_roles: Vec<String> = row.try_get("require_roles").map_err(FluxbaseError::Sql)?;
    let require_roles = require_roles
        .into_iter()
        .filter_map(|r| parse_role(&r))
        .collect();

    let source: String = row.try_get("source").map_err(FluxbaseError::Sql)?;
    let source = match source.as_str() {
        "filesystem" => ProcedureSource::Filesystem,
        "mcp" => ProcedureSource::Mcp,
        "admin" => ProcedureSource::Admin,
        _ => ProcedureSource::Cli,
    };

    Ok(Procedure {
        id: row.try_get("id").map_err(FluxbaseError::Sql)?,
        namespace: row.try_get("namespace").map_err(FluxbaseError::Sql)?,
        name: row.try_get("name").map_err(FluxbaseError::Sql)?,
        sql_query: row.try_get("sql_query").map_err(FluxbaseError::Sql)?,
        original_code: row.try_get("original_code").map_err(FluxbaseError::Sql)?,
        description: row.try_get("description").map_err(FluxbaseError::Sql)?,
        allowed_schemas: row.try_get("allowed_schemas").map_err(FluxbaseError::Sql)?,
        allowed_tables: row.try_get("allowed_tables").map_err(FluxbaseError::Sql)?,
        require_roles,
        is_public: row.try_get("is_public").map_err(FluxbaseError::Sql)?,
        max_execution_time_seconds: row
            .try_get::<i32, _>("max_execution_time_seconds")
            .map_err(FluxbaseError::Sql)? as u32,
        disable_execution_logs: row
            .try_get("disable_execution_logs")
            .map_err(FluxbaseError::Sql)?,
        schedule: row.try_get("schedule").map_err(FluxbaseError::Sql)?,
        enabled: row.try_get("enabled").map_err(FluxbaseError::Sql)?,
        source,
        version: row.try_get("version").map_err(FluxbaseError::Sql)?,
        created_by: row.try_get("created_by").map_err(FluxbaseError::Sql)?,
        created_at: row.try_get("created_at").map_err(FluxbaseError::Sql)?,
        updated_at: row.try_get("updated_at").map_err(FluxbaseError::Sql)?,
    })
}

fn parse_role(role: &str) -> Option<PrincipalRole> {
    match role {
        "anon" => Some(PrincipalRole::Anon),
        "authenticated" => Some(PrincipalRole::Authenticated),
        "service_role" => Some(PrincipalRole::ServiceRole),
        "dashboard_admin" => Some(PrincipalRole::DashboardAdmin),
        "dashboard_user" => Some(PrincipalRole::DashboardUser),
        _ => None,
    }
}
