//! Auth resolver middleware: the innermost layer of the stack, turning
//! whatever credential a request presents into a `Principal` downstream
//! handlers and the connection broker can trust.
//!
//! Precedence when more than one credential is presented: `X-Service-Key` /
//! `X-Client-Key` wins over a bearer access token, which wins over the
//! anonymous default. A refresh token is never accepted here — it is only
//! ever read directly by the `/api/v1/auth/refresh` handler.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use fluxbase_core::principal::{Principal, PrincipalRole};

use super::error::ApiError;
use crate::auth::AuthService;

const SERVICE_KEY_HEADER: &str = "x-service-key";
const CLIENT_KEY_HEADER: &str = "x-client-key";
const AUTHORIZATION_HEADER: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

pub async fn auth_resolver_middleware(
    State(auth): State<AuthService>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let service_key = header_str(&req, SERVICE_KEY_HEADER).or_else(|| header_str(&req, CLIENT_KEY_HEADER));
    let bearer = header_str(&req, AUTHORIZATION_HEADER).and_then(|v| v.strip_prefix(BEARER_PREFIX));

    let mut deprecation_warning = false;
    let principal = if let Some(raw_key) = service_key {
        let resolved = auth.resolve_service_key(raw_key).await?;
        deprecation_warning = resolved.deprecation_warning;
        if deprecation_warning {
            tracing::warn!(credential_id = %resolved.credential_id, "service key is deprecated and nearing its grace period");
        }
        match resolved.role.as_str() {
            "service_role" => Principal::service_role(),
            "dashboard_admin" => Principal::dashboard(PrincipalRole::DashboardAdmin, resolved.credential_id, None),
            "dashboard_user" => Principal::dashboard(PrincipalRole::DashboardUser, resolved.credential_id, None),
            _ => Principal::service_role(),
        }
    } else if let Some(token) = bearer {
        auth.resolve_access_token(token)?
    } else {
        Principal::anon()
    };

    req.extensions_mut().insert(principal.clone());
    let mut response = next.run(req).await;
    // Request extensions don't propagate to the response; the logging
    // middleware wrapping this layer needs the resolved principal, so it
    // rides along on the response instead.
    response.extensions_mut().insert(principal);
    if deprecation_warning {
        response.headers_mut().insert(
            "x-service-key-deprecated",
            axum::http::HeaderValue::from_static("true"),
        );
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_strips_cleanly() {
        let header = "Bearer abc.def.ghi";
        assert_eq!(header.strip_prefix(BEARER_PREFIX), Some("abc.def.ghi"));
    }
}
