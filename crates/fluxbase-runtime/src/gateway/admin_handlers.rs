//! HTTP handlers for `/api/v1/admin/*`: procedure CRUD and read-only schema
//! introspection, both gated to dashboard operators by the router.

use axum::extract::{Path, State};
use axum::Json;
use fluxbase_core::error::FluxbaseError;
use fluxbase_core::procedure::{validate_template_for_ingest, Procedure};
use serde::Deserialize;

use crate::procedure::ProcedureStore;
use crate::schema::{SchemaInspector, TableInfo};

use super::error::ApiError;

pub async fn list_procedures(State(store): State<ProcedureStore>) -> Json<Vec<Procedure>> {
    let procedures = store.snapshot().await;
    Json(procedures.iter().map(|p| (**p).clone()).collect())
}

pub async fn get_procedure(
    State(store): State<ProcedureStore>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Procedure>, ApiError> {
    let procedure = store
        .get(&namespace, &name)
        .await
        .ok_or_else(|| FluxbaseError::NotFound(format!("{namespace}/{name}")))?;
    Ok(Json((*procedure).clone()))
}

#[derive(Debug, Deserialize)]
pub struct UpsertProcedureRequest {
    pub sql_query: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub allowed_schemas: Vec<String>,
    #[serde(default)]
    pub allowed_tables: Vec<String>,
    #[serde(default)]
    pub require_roles: Vec<fluxbase_core::principal::PrincipalRole>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub max_execution_time_seconds: Option<u32>,
    #[serde(default)]
    pub disable_execution_logs: bool,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub async fn upsert_procedure(
    State(store): State<ProcedureStore>,
    Path((namespace, name)): Path<(String, String)>,
    Json(body): Json<UpsertProcedureRequest>,
) -> Result<Json<Procedure>, ApiError> {
    let mut procedure = match store.get(&namespace, &name).await {
        Some(existing) => {
            let mut updated = (*existing).clone();
            updated.version += 1;
            updated.updated_at = chrono::Utc::now();
            updated
        }
        None => Procedure::new(namespace.clone(), name.clone(), body.sql_query.clone()),
    };

    procedure.sql_query = body.sql_query;
    procedure.description = body.description;
    procedure.allowed_schemas = body.allowed_schemas;
    procedure.allowed_tables = body.allowed_tables;
    procedure.require_roles = body.require_roles;
    procedure.is_public = body.is_public;
    if let Some(timeout) = body.max_execution_time_seconds {
        procedure.max_execution_time_seconds = timeout;
    }
    procedure.disable_execution_logs = body.disable_execution_logs;
    procedure.schedule = body.schedule;
    procedure.enabled = body.enabled;
    procedure.source = fluxbase_core::procedure::ProcedureSource::Admin;

    validate_template_for_ingest(&procedure.sql_query, &procedure.allowed_schemas, &procedure.allowed_tables)?;

    store.upsert(procedure.clone()).await?;
    Ok(Json(procedure))
}

pub async fn delete_procedure(
    State(store): State<ProcedureStore>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<(), ApiError> {
    store
        .remove(&namespace, &name)
        .await?
        .ok_or_else(|| FluxbaseError::NotFound(format!("{namespace}/{name}")))?;
    Ok(())
}

pub async fn list_schemas(State(inspector): State<SchemaInspector>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(inspector.list_schemas().await?))
}

pub async fn describe_table(
    State(inspector): State<SchemaInspector>,
    Path((schema, table)): Path<(String, String)>,
) -> Result<Json<TableInfo>, ApiError> {
    Ok(Json(inspector.describe_table(&schema, &table).await?))
}
