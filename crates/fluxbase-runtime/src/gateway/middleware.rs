//! Request-id, structured-logging, and rate-limiting middleware — the
//! second, third, and fourth layers of the stack assembled in `server.rs`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use fluxbase_core::observability::{LogEntry, Metric, MetricLabels};
use fluxbase_core::principal::Principal;
use fluxbase_core::rate_limit::{RateLimitConfig, RateLimitKey};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::ApiError;
use crate::observability::ObservabilityState;
use crate::rate_limit::SharedRateLimiter;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest path kept verbatim in logs; anything longer collapses to
/// `long_path` to bound cardinality.
const MAX_LOGGED_PATH_LEN: usize = 50;

/// Assigns a UUIDv4 to each request (or keeps an inbound one), stashes it as
/// a request extension, and echoes it on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn normalize_path(path: &str) -> String {
    if path.chars().count() > MAX_LOGGED_PATH_LEN {
        "long_path".to_string()
    } else {
        path.to_string()
    }
}

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=999 => "5xx",
        _ => "unknown",
    }
}

/// Emits one structured log entry and one duration observation per HTTP
/// transaction.
pub async fn logging_middleware(
    State(observability): State<ObservabilityState>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let latency_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();
    let class = status_class(status);

    let principal = response.extensions().get::<Principal>();
    let principal_id = principal.and_then(|p| p.user_id()).map(|id| id.to_string());
    let principal_role = principal.map(|p| p.role().as_str()).unwrap_or("anon");

    let entry = LogEntry::info("http request")
        .with_target("fluxbase::gateway")
        .with_field("method", method.as_str())
        .with_field("path", &path)
        .with_field("status", status)
        .with_field("status_class", class)
        .with_field("latency_ms", latency_ms as u64)
        .with_field("principal_id", principal_id.as_deref().unwrap_or("none"))
        .with_field("principal_role", principal_role);
    observability.log(entry);

    let mut labels = MetricLabels::new();
    labels.insert("method".to_string(), method.to_string());
    labels.insert("status_class".to_string(), class.to_string());
    observability
        .observe_duration("http_request_duration_seconds", &labels, latency_ms as f64 / 1000.0)
        .await;
    observability
        .record(Metric::counter("http_requests_total", 1.0).with_labels(labels))
        .await;

    response
}

/// Gives each request its own [`CancellationToken`], stashed as an extension
/// so handlers and the procedure executor can race it against in-flight
/// work. Held via `drop_guard` across `next.run`, so if the client
/// disconnects and axum drops this future before it resolves, the token
/// fires and any task still watching it (including ones spawned off to
/// outlive this future) observes the cancellation.
pub async fn cancellation_middleware(mut req: Request, next: Next) -> Response {
    let token = CancellationToken::new();
    req.extensions_mut().insert(token.clone());
    let _drop_guard = token.drop_guard();
    next.run(req).await
}

/// Per-route rate limiting: a token bucket keyed by `(scope, identifier)`
/// where scope comes from the route and identifier from the principal,
/// falling back to the client IP.
#[derive(Clone)]
pub struct RateLimitLayer {
    pub limiter: SharedRateLimiter,
    pub scope: &'static str,
    pub config: RateLimitConfig,
}

impl RateLimitLayer {
    pub fn new(limiter: SharedRateLimiter, scope: &'static str, config: RateLimitConfig) -> Self {
        Self { limiter, scope, config }
    }
}

pub async fn rate_limit_middleware(
    State(layer): State<Arc<RateLimitLayer>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req.extensions().get::<Principal>().cloned().unwrap_or_else(Principal::anon);
    let client_ip = client_ip_of(&req);

    let identifier = if principal.is_authenticated() {
        principal
            .user_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "anonymous".to_string())
    } else {
        client_ip.unwrap_or_else(|| "unknown".to_string())
    };

    let bucket_key = format!("{}:{}", layer.scope, identifier);
    let config = RateLimitConfig {
        key: RateLimitKey::User,
        ..layer.config.clone()
    };
    layer.limiter.enforce(&bucket_key, &config).await.map_err(ApiError::from)?;

    Ok(next.run(req).await)
}

fn client_ip_of(req: &Request) -> Option<String> {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .map(str::to_string)
}

/// Rate limiting for auth-sensitive routes, bucketed independently by email
/// (from the request body, already parsed by the caller) and by client IP.
pub async fn enforce_auth_rate_limit(
    limiter: &SharedRateLimiter,
    action: &str,
    email: &str,
    client_ip: Option<&str>,
    config: &RateLimitConfig,
) -> Result<(), ApiError> {
    let by_email = format!("email:{}:auth:{action}", email.to_ascii_lowercase());
    limiter.enforce(&by_email, config).await.map_err(ApiError::from)?;

    if let Some(ip) = client_ip {
        let by_ip = format!("ip:{ip}:auth:{action}");
        limiter.enforce(&by_ip, config).await.map_err(ApiError::from)?;
    }
    Ok(())
}

/// Gates a route group to a fixed set of roles, read off the `Principal`
/// the auth resolver already placed in request extensions. Used for the
/// `dashboard_admin`-only admin surface; per-procedure role checks for RPC
/// invocation are a separate concern handled by the executor itself.
pub async fn require_role_middleware(
    State(allowed): State<&'static [fluxbase_core::principal::PrincipalRole]>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or_else(Principal::anon);
    principal.require_role(allowed).map_err(ApiError::from)?;
    Ok(next.run(req).await)
}

/// Response status into the boundary-behavior classes from the testable
/// properties list: out-of-range codes (including negative, which cannot
/// occur for a real `StatusCode` but is exercised directly in tests) map to
/// `unknown`.
pub fn status_class_for_code(code: i32) -> &'static str {
    if !(100..=999).contains(&code) {
        return "unknown";
    }
    status_class(code as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_long_paths() {
        let exactly_fifty = "a".repeat(50);
        assert_eq!(normalize_path(&exactly_fifty), exactly_fifty);
        let fifty_one = "a".repeat(51);
        assert_eq!(normalize_path(&fifty_one), "long_path");
    }

    #[test]
    fn classifies_status_codes() {
        assert_eq!(status_class_for_code(199), "unknown");
        assert_eq!(status_class_for_code(200), "2xx");
        assert_eq!(status_class_for_code(404), "4xx");
        assert_eq!(status_class_for_code(600), "5xx");
        assert_eq!(status_class_for_code(-1), "unknown");
    }
}
