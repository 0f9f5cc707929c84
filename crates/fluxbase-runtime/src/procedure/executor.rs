//! The execute phase of the procedure runtime: the eight-step lifecycle from
//! resolve-and-validate through terminal-row recording.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{Column, PgPool, Row, TypeInfo};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use fluxbase_core::error::{FluxbaseError, Result};
use fluxbase_core::principal::Principal;
use fluxbase_core::procedure::{compile_with_caller, validate_template, Execution, Procedure};

use crate::db::Database;

use super::store::ProcedureStore;

#[derive(Clone)]
pub struct ProcedureExecutor {
    store: ProcedureStore,
    db: Database,
}

impl ProcedureExecutor {
    pub fn new(store: ProcedureStore, db: Database) -> Self {
        Self { store, db }
    }

    pub fn store(&self) -> &ProcedureStore {
        &self.store
    }

    /// Resolve `(namespace, name)`, check role admission, and return the
    /// procedure or the appropriate error.
    pub async fn resolve(&self, namespace: &str, name: &str, principal: &Principal) -> Result<Arc<Procedure>> {
        let procedure = self
            .store
            .get(namespace, name)
            .await
            .ok_or_else(|| FluxbaseError::NotFound(format!("{namespace}/{name}")))?;

        if !procedure.enabled {
            return Err(FluxbaseError::NotFound(format!("{namespace}/{name}")));
        }
        if !procedure.admits_role(principal.role()) {
            return Err(FluxbaseError::Forbidden(format!(
                "role {:?} may not invoke {namespace}/{name}",
                principal.role()
            )));
        }
        Ok(procedure)
    }

    /// Run a procedure synchronously to completion and return the terminal
    /// `Execution`.
    ///
    /// The actual work runs on its own spawned task, decoupled from this
    /// future: if the caller (the HTTP handler) is dropped because the
    /// client disconnected, `cancellation` still fires and the spawned task
    /// still gets to roll back the transaction and persist the `cancelled`
    /// row, instead of being torn down mid-cleanup.
    pub async fn execute_sync(
        &self,
        procedure: Arc<Procedure>,
        principal: &Principal,
        params: Map<String, Value>,
        cancellation: CancellationToken,
    ) -> Result<Execution> {
        let mut execution = Execution::pending(
            procedure.id,
            Value::Object(params.clone()),
            principal.user_id(),
            principal.role().as_str().to_string(),
            principal.email().map(|s| s.to_string()),
            false,
        );

        if !procedure.disable_execution_logs {
            record_execution(self.store.pool(), &execution).await?;
        }
        execution.mark_running();
        if !procedure.disable_execution_logs {
            update_execution(self.store.pool(), &execution).await?;
        }

        let executor = self.clone();
        let principal = principal.clone();
        let disable_logs = procedure.disable_execution_logs;

        let handle = tokio::spawn(async move {
            let result = executor.run(&procedure, &principal, &params, &mut execution, cancellation).await;
            if !disable_logs {
                update_execution(executor.store.pool(), &execution).await?;
            }
            result.map(|_| execution)
        });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(FluxbaseError::Internal(format!("execution task panicked: {join_err}"))),
        }
    }

    /// Spawn the execution on a background task and return immediately with
    /// the (pending) execution's id.
    pub fn execute_async(&self, procedure: Arc<Procedure>, principal: Principal, params: Map<String, Value>) -> Uuid {
        let execution = Execution::pending(
            procedure.id,
            Value::Object(params.clone()),
            principal.user_id(),
            principal.role().as_str().to_string(),
            principal.email().map(|s| s.to_string()),
            true,
        );
        let execution_id = execution.id;
        let executor = self.clone();

        tokio::spawn(async move {
            if let Err(err) = executor.run_async(procedure, principal, params, execution).await {
                tracing::error!(error = %err, "async procedure execution failed");
            }
        });

        execution_id
    }

    async fn run_async(
        &self,
        procedure: Arc<Procedure>,
        principal: Principal,
        params: Map<String, Value>,
        mut execution: Execution,
    ) -> Result<()> {
        if !procedure.disable_execution_logs {
            record_execution(self.store.pool(), &execution).await?;
        }
        execution.mark_running();
        if !procedure.disable_execution_logs {
            update_execution(self.store.pool(), &execution).await?;
        }

        // Scheduled/background fires have no client connection to disconnect,
        // so there is never a live cancellation signal for them.
        let _ = self
            .run(&procedure, &principal, &params, &mut execution, CancellationToken::new())
            .await;

        if !procedure.disable_execution_logs {
            update_execution(self.store.pool(), &execution).await?;
        }
        Ok(())
    }

    /// Validate, compile, and run the template inside a principal-scoped
    /// transaction, bounded by the procedure's `max_execution_time_seconds`
    /// and raced against `cancellation`. Mutates `execution` to its terminal
    /// state and returns the same error it recorded, if any.
    async fn run(
        &self,
        procedure: &Procedure,
        principal: &Principal,
        params: &Map<String, Value>,
        execution: &mut Execution,
        cancellation: CancellationToken,
    ) -> Result<()> {
        let caller_context = caller_context(principal);
        let sql = match validate_template(
            &procedure.sql_query,
            params,
            &procedure.allowed_schemas,
            &procedure.allowed_tables,
        )
        .and_then(|_| compile_with_caller(&procedure.sql_query, params, &caller_context))
        {
            Ok(sql) => sql,
            Err(err) => {
                execution.mark_failed(err.to_string(), 0);
                return Err(err);
            }
        };

        let started = std::time::Instant::now();
        let timeout = Duration::from_secs(procedure.max_execution_time_seconds as u64);
        let mut tx = self.db.acquire(principal).await?;

        tokio::select! {
            _ = cancellation.cancelled() => {
                tx.rollback().await?;
                execution.mark_cancelled();
                Err(FluxbaseError::Cancelled(format!("{}/{} cancelled by client", procedure.namespace, procedure.name)))
            }
            outcome = tokio::time::timeout(timeout, run_query(tx.as_mut(), &sql)) => {
                match outcome {
                    Ok(Ok(rows)) => {
                        tx.commit().await?;
                        let duration_ms = started.elapsed().as_millis() as u64;
                        let row_count = rows.len() as u64;
                        execution.mark_completed(Value::Array(rows), row_count, duration_ms);
                        Ok(())
                    }
                    Ok(Err(err)) => {
                        tx.rollback().await?;
                        let duration_ms = started.elapsed().as_millis() as u64;
                        execution.mark_failed(err.to_string(), duration_ms);
                        Err(err)
                    }
                    Err(_elapsed) => {
                        tx.rollback().await?;
                        let duration_ms = started.elapsed().as_millis() as u64;
                        execution.mark_failed("execution exceeded max_execution_time_seconds".to_string(), duration_ms);
                        Err(FluxbaseError::Timeout(format!("{}/{}", procedure.namespace, procedure.name)))
                    }
                }
            }
        }
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<Execution> {
        let row = sqlx::query("SELECT * FROM rpc.executions WHERE id = $1")
            .bind(id)
            .fetch_optional(self.store.pool())
            .await
            .map_err(FluxbaseError::Sql)?
            .ok_or_else(|| FluxbaseError::NotFound(format!("execution {id}")))?;
        row_to_execution(&row)
    }
}

/// Caller-context parameters injected automatically ahead of compilation.
fn caller_context(principal: &Principal) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert(
        "caller_id".to_string(),
        principal.user_id().map(|id| Value::String(id.to_string())).unwrap_or(Value::Null),
    );
    context.insert(
        "caller_role".to_string(),
        Value::String(principal.role().as_str().to_string()),
    );
    context.insert(
        "caller_email".to_string(),
        principal.email().map(|e| Value::String(e.to_string())).unwrap_or(Value::Null),
    );
    context
}

async fn run_query(tx: &mut sqlx::PgConnection, sql: &str) -> Result<Vec<Value>> {
    let rows = sqlx::query(sql).fetch_all(tx).await.map_err(FluxbaseError::from_sqlx)?;
    rows.iter().map(row_to_json).collect()
}

/// Marshal a single Postgres row into a JSON object, keyed by column name.
fn row_to_json(row: &sqlx::postgres::PgRow) -> Result<Value> {
    let mut object = Map::new();
    for column in row.columns() {
        let name = column.name();
        let value = column_to_json(row, name, column.type_info().name())?;
        object.insert(name.to_string(), value);
    }
    Ok(Value::Object(object))
}

fn column_to_json(row: &sqlx::postgres::PgRow, name: &str, type_name: &str) -> Result<Value> {
    macro_rules! try_as {
        ($ty:ty, $convert:expr) => {
            if let Ok(v) = row.try_get::<Option<$ty>, _>(name) {
                return Ok(v.map($convert).unwrap_or(Value::Null));
            }
        };
    }

    match type_name {
        "BOOL" => try_as!(bool, Value::Bool),
        "INT2" | "INT4" => try_as!(i32, |v: i32| Value::Number(v.into())),
        "INT8" => try_as!(i64, |v: i64| Value::Number(v.into())),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => {
            if let Ok(v) = row.try_get::<Option<f64>, _>(name) {
                return Ok(v
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null));
            }
        }
        "JSON" | "JSONB" => try_as!(Value, |v| v),
        "TIMESTAMPTZ" | "TIMESTAMP" => {
            if let Ok(v) = row.try_get::<Option<chrono::DateTime<Utc>>, _>(name) {
                return Ok(v.map(|v| Value::String(v.to_rfc3339())).unwrap_or(Value::Null));
            }
        }
        "UUID" => try_as!(Uuid, |v: Uuid| Value::String(v.to_string())),
        _ => {}
    }

    // Fall back to text representation for anything not special-cased above.
    row.try_get::<Option<String>, _>(name)
        .map(|v| v.map(Value::String).unwrap_or(Value::Null))
        .map_err(FluxbaseError::Sql)
}

async fn record_execution(pool: &PgPool, execution: &Execution) -> Result<()> {
    sqlx::query(
        "INSERT INTO rpc.executions (
            id, procedure_id, status, input_params, result, error_message,
            rows_returned, duration_ms, user_id, user_role, user_email,
            is_async, created_at, started_at, completed_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
    )
    .bind(execution.id)
    .bind(execution.procedure_id)
    .bind(execution.status.as_str())
    .bind(&execution.input_params)
    .bind(&execution.result)
    .bind(&execution.error_message)
    .bind(execution.rows_returned.map(|v| v as i64))
    .bind(execution.duration_ms.map(|v| v as i64))
    .bind(execution.user_id)
    .bind(&execution.user_role)
    .bind(&execution.user_email)
    .bind(execution.is_async)
    .bind(execution.created_at)
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .execute(pool)
    .await
    .map_err(FluxbaseError::Sql)?;
    Ok(())
}

async fn update_execution(pool: &PgPool, execution: &Execution) -> Result<()> {
    sqlx::query(
        "UPDATE rpc.executions SET status = $2, result = $3, error_message = $4, \
         rows_returned = $5, duration_ms = $6, started_at = $7, completed_at = $8 \
         WHERE id = $1",
    )
    .bind(execution.id)
    .bind(execution.status.as_str())
    .bind(&execution.result)
    .bind(&execution.error_message)
    .bind(execution.rows_returned.map(|v| v as i64))
    .bind(execution.duration_ms.map(|v| v as i64))
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .execute(pool)
    .await
    .map_err(FluxbaseError::Sql)?;
    Ok(())
}

fn row_to_execution(row: &sqlx::postgres::PgRow) -> Result<Execution> {
    let status: String = row.try_get("status").map_err(FluxbaseError::Sql)?;
    Ok(Execution {
        id: row.try_get("id").map_err(FluxbaseError::Sql)?,
        procedure_id: row.try_get("procedure_id").map_err(FluxbaseError::Sql)?,
        status: status_from_str(&status),
        input_params: row.try_get("input_params").map_err(FluxbaseError::Sql)?,
        result: row.try_get("result").map_err(FluxbaseError::Sql)?,
        error_message: row.try_get("error_message").map_err(FluxbaseError::Sql)?,
        rows_returned: row
            .try_get::<Option<i64>, _>("rows_returned")
            .map_err(FluxbaseError::Sql)?
            .map(|v| v as u64),
        duration_ms: row
            .try_get::<Option<i64>, _>("duration_ms")
            .map_err(FluxbaseError::Sql)?
            .map(|v| v as u64),
        user_id: row.try_get("user_id").map_err(FluxbaseError::Sql)?,
        user_role: row.try_get("user_role").map_err(FluxbaseError::Sql)?,
        user_email: row.try_get("user_email").map_err(FluxbaseError::Sql)?,
        is_async: row.try_get("is_async").map_err(FluxbaseError::Sql)?,
        created_at: row.try_get("created_at").map_err(FluxbaseError::Sql)?,
        started_at: row.try_get("started_at").map_err(FluxbaseError::Sql)?,
        completed_at: row.try_get("completed_at").map_err(FluxbaseError::Sql)?,
    })
}

fn status_from_str(s: &str) -> fluxbase_core::procedure::ExecutionStatus {
    use fluxbase_core::procedure::ExecutionStatus::*;
    match s {
        "pending" => Pending,
        "running" => Running,
        "completed" => Completed,
        "failed" => Failed,
        _ => Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxbase_core::principal::Principal;

    #[test]
    fn caller_context_carries_role_for_anon() {
        let ctx = caller_context(&Principal::anon());
        assert_eq!(ctx.get("caller_role"), Some(&Value::String("anon".to_string())));
        assert_eq!(ctx.get("caller_id"), Some(&Value::Null));
    }
}
