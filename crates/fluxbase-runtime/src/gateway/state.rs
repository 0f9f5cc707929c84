//! The shared application state handlers and middleware extract pieces of
//! via `axum::extract::State`.

use axum::extract::FromRef;
use fluxbase_core::config::RateLimitSettings;

use crate::auth::AuthService;
use crate::observability::ObservabilityState;
use crate::procedure::{ProcedureExecutor, ProcedureStore};
use crate::rate_limit::SharedRateLimiter;
use crate::schema::SchemaInspector;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub executor: ProcedureExecutor,
    pub store: ProcedureStore,
    pub inspector: SchemaInspector,
    pub rate_limiter: SharedRateLimiter,
    pub observability: ObservabilityState,
    /// Token-bucket shape for rate-limited routes, sourced from
    /// `SecurityConfig.rate_limit` rather than hardcoded per-route.
    pub rate_limit_settings: RateLimitSettings,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for ProcedureExecutor {
    fn from_ref(state: &AppState) -> Self {
        state.executor.clone()
    }
}

impl FromRef<AppState> for ProcedureStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for SchemaInspector {
    fn from_ref(state: &AppState) -> Self {
        state.inspector.clone()
    }
}

impl FromRef<AppState> for SharedRateLimiter {
    fn from_ref(state: &AppState) -> Self {
        state.rate_limiter.clone()
    }
}

impl FromRef<AppState> for ObservabilityState {
    fn from_ref(state: &AppState) -> Self {
        state.observability.clone()
    }
}

impl FromRef<AppState> for RateLimitSettings {
    fn from_ref(state: &AppState) -> Self {
        state.rate_limit_settings.clone()
    }
}
