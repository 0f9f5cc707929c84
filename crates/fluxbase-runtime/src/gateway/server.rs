//! Router assembly: the full middleware stack, outermost first, wrapping
//! the route table described by the HTTP surface.
//!
//! Order (outermost to innermost): panic recovery, per-handler request
//! timeout, cancellation token, request id, structured logging, rate
//! limiting, CORS, auth resolver. Auth-sensitive handlers (signup/login)
//! additionally enforce a tighter per-email bucket of their own, ahead of
//! the credential check itself, since the generic layer here only has a
//! client IP to key on until the resolver runs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use fluxbase_core::config::RateLimitSettings;
use fluxbase_core::rate_limit::RateLimitConfig;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use super::admin_handlers;
use super::auth_handlers;
use super::middleware::{
    cancellation_middleware, logging_middleware, rate_limit_middleware, request_id_middleware,
    require_role_middleware, RateLimitLayer,
};
use super::resolver::auth_resolver_middleware;
use super::rpc_handlers;
use super::state::AppState;

/// Gateway-specific settings layered on top of `fluxbase_core::config::GatewayConfig`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl From<fluxbase_core::config::GatewayConfig> for GatewayConfig {
    fn from(config: fluxbase_core::config::GatewayConfig) -> Self {
        Self {
            port: config.port,
            cors_origins: config.cors_origins,
            request_timeout_secs: config.request_timeout_secs,
        }
    }
}

pub struct GatewayServer {
    router: Router,
    addr: SocketAddr,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, state: AppState) -> Self {
        let router = build_router(&config, state);
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        Self { router, addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind and serve, exposing the peer address to handlers that need it
    /// for IP-keyed rate limiting (`ConnectInfo<SocketAddr>`). Graceful
    /// shutdown is layered on by the caller via `with_graceful_shutdown`.
    pub async fn serve(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "gateway listening");
        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics_handler(State(observability): State<crate::observability::ObservabilityState>) -> impl IntoResponse {
    observability.render_prometheus().await
}

fn general_rate_limit_config(settings: &RateLimitSettings) -> RateLimitConfig {
    RateLimitConfig::new(settings.requests, Duration::from_secs(settings.window_secs))
}

fn build_router(config: &GatewayConfig, state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/signup", post(auth_handlers::signup))
        .route("/login", post(auth_handlers::login))
        .route("/refresh", post(auth_handlers::refresh))
        .route("/mfa/verify", post(auth_handlers::verify_mfa))
        .route("/mfa/enroll", post(auth_handlers::begin_mfa_enrollment))
        .route("/mfa/confirm", post(auth_handlers::confirm_mfa_enrollment));

    let rpc_routes = Router::new()
        .route("/:namespace/:name", post(rpc_handlers::invoke))
        .route("/executions/:id", get(rpc_handlers::get_execution));

    const ADMIN_ROLES: &[fluxbase_core::principal::PrincipalRole] =
        &[fluxbase_core::principal::PrincipalRole::DashboardAdmin];

    let admin_routes = Router::new()
        .route("/procedures", get(admin_handlers::list_procedures))
        .route(
            "/procedures/:namespace/:name",
            get(admin_handlers::get_procedure)
                .put(admin_handlers::upsert_procedure)
                .delete(admin_handlers::delete_procedure),
        )
        .route("/schemas", get(admin_handlers::list_schemas))
        .route("/schemas/:schema/tables/:table", get(admin_handlers::describe_table))
        .layer(from_fn_with_state(ADMIN_ROLES, require_role_middleware));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/rpc", rpc_routes)
        .nest("/admin", admin_routes)
        .layer(from_fn_with_state(state.auth.clone(), auth_resolver_middleware));

    let general_rate_limit = Arc::new(RateLimitLayer::new(
        state.rate_limiter.clone(),
        "api",
        general_rate_limit_config(&state.rate_limit_settings),
    ));
    let observability = state.observability.clone();

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
                .layer(from_fn(cancellation_middleware))
                .layer(from_fn(request_id_middleware))
                .layer(from_fn_with_state(observability, logging_middleware))
                .layer(from_fn_with_state(general_rate_limit, rate_limit_middleware))
                .layer(cors_layer(&config.cors_origins)),
        )
        .with_state(state)
}
