//! HTTP handlers for `/api/v1/rpc/*`: procedure invocation, synchronous or
//! backgrounded, plus polling a backgrounded execution's result.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use fluxbase_core::principal::Principal;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::procedure::ProcedureExecutor;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct InvokeQuery {
    #[serde(default)]
    pub r#async: bool,
}

#[derive(Debug, serde::Serialize)]
#[serde(untagged)]
pub enum InvokeResponse {
    Sync(fluxbase_core::procedure::Execution),
    Async { execution_id: Uuid },
}

pub async fn invoke(
    State(executor): State<ProcedureExecutor>,
    Extension(principal): Extension<Principal>,
    Extension(cancellation): Extension<CancellationToken>,
    Path((namespace, name)): Path<(String, String)>,
    Query(query): Query<InvokeQuery>,
    Json(params): Json<Map<String, Value>>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let procedure = executor.resolve(&namespace, &name, &principal).await?;

    if query.r#async {
        let execution_id = executor.execute_async(procedure, principal, params);
        Ok(Json(InvokeResponse::Async { execution_id }))
    } else {
        let execution = executor.execute_sync(procedure, &principal, params, cancellation).await?;
        Ok(Json(InvokeResponse::Sync(execution)))
    }
}

pub async fn get_execution(
    State(executor): State<ProcedureExecutor>,
    Extension(principal): Extension<Principal>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<fluxbase_core::procedure::Execution>, ApiError> {
    let execution = executor.get_execution(execution_id).await?;

    let owns_it = execution.user_id == principal.user_id();
    let is_privileged = matches!(
        principal.role(),
        fluxbase_core::principal::PrincipalRole::ServiceRole | fluxbase_core::principal::PrincipalRole::DashboardAdmin
    );
    if !owns_it && !is_privileged {
        return Err(ApiError::from(fluxbase_core::error::FluxbaseError::Forbidden(
            "not the owner of this execution".into(),
        )));
    }

    Ok(Json(execution))
}
