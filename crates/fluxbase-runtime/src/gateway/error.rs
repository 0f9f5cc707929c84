//! HTTP error envelope: `{ "error": "<message>", "code": "<kind>" }`, with
//! `kind` driving both the status code and the `Retry-After` header on rate
//! limit responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fluxbase_core::error::FluxbaseError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// Wraps a `FluxbaseError` so it can be returned directly from an `axum`
/// handler via `?`.
pub struct ApiError(pub FluxbaseError);

impl From<FluxbaseError> for ApiError {
    fn from(err: FluxbaseError) -> Self {
        Self(err)
    }
}

pub fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "validation" => StatusCode::BAD_REQUEST,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "forbidden" => StatusCode::FORBIDDEN,
        "not-found" => StatusCode::NOT_FOUND,
        "conflict" => StatusCode::CONFLICT,
        "rate-limited" => StatusCode::TOO_MANY_REQUESTS,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        "cancelled" => StatusCode::from_u16(499).unwrap(),
        "dependency" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for_kind(kind);

        // Internal errors are logged with full detail but never echoed to
        // the caller; everything else is safe to surface verbatim.
        let message = if kind == "internal" {
            tracing::error!(error = %self.0, "internal error");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: message,
                code: kind.to_string(),
            }),
        )
            .into_response();

        if let FluxbaseError::RateLimitExceeded { retry_after, .. } = &self.0 {
            if let Ok(value) = retry_after.as_secs().to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_kinds_to_status() {
        assert_eq!(status_for_kind("validation"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_kind("not-found"), StatusCode::NOT_FOUND);
        assert_eq!(status_for_kind("rate-limited"), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for_kind("cancelled").as_u16(), 499);
        assert_eq!(status_for_kind("dependency"), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for_kind("bogus"), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
