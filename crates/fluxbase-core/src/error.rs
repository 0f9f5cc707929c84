use std::time::Duration;

use thiserror::Error;

/// Core error type for fluxbase operations.
///
/// Every variant maps to an HTTP status and a stable error `kind` string at
/// the gateway boundary (see `fluxbase_runtime::gateway::response`).
#[derive(Error, Debug)]
pub enum FluxbaseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Procedure error: {0}")]
    Procedure(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Rate limit exceeded: retry after {retry_after:?}")]
    RateLimitExceeded {
        retry_after: Duration,
        limit: u32,
        remaining: u32,
    },
}

impl FluxbaseError {
    /// Classify a raw Postgres error into the appropriate variant by SQLSTATE,
    /// falling back to `Sql` (kind `internal`) for anything not specifically
    /// handled. `Timeout` and `Cancelled` are never produced here: both are
    /// driven explicitly by the executor (statement-timeout wrapper and
    /// request cancellation token respectively), not inferred from SQLSTATE.
    ///
    /// - `23505` (unique_violation) -> `Conflict`
    /// - `23503` (foreign_key_violation) / `23514` (check_violation) -> `Validation`
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    "23505" => return FluxbaseError::Conflict(db_err.message().to_string()),
                    "23503" | "23514" => {
                        return FluxbaseError::Validation(db_err.message().to_string())
                    }
                    _ => {}
                }
            }
        }
        match err {
            sqlx::Error::RowNotFound => FluxbaseError::NotFound("row not found".to_string()),
            other => FluxbaseError::Sql(other),
        }
    }

    /// Stable error-kind string surfaced in the HTTP error envelope and used
    /// to map to a status code at the gateway boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            FluxbaseError::Validation(_) => "validation",
            FluxbaseError::InvalidArgument(_) => "validation",
            FluxbaseError::Unauthorized(_) => "unauthorized",
            FluxbaseError::Forbidden(_) => "forbidden",
            FluxbaseError::NotFound(_) => "not-found",
            FluxbaseError::Conflict(_) => "conflict",
            FluxbaseError::RateLimitExceeded { .. } => "rate-limited",
            FluxbaseError::Timeout(_) => "timeout",
            FluxbaseError::Cancelled(_) => "cancelled",
            FluxbaseError::Dependency(_) => "dependency",
            FluxbaseError::Config(_)
            | FluxbaseError::Database(_)
            | FluxbaseError::Procedure(_)
            | FluxbaseError::Serialization(_)
            | FluxbaseError::Deserialization(_)
            | FluxbaseError::Io(_)
            | FluxbaseError::Sql(_)
            | FluxbaseError::Internal(_)
            | FluxbaseError::InvalidState(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for FluxbaseError {
    fn from(e: serde_json::Error) -> Self {
        FluxbaseError::Serialization(e.to_string())
    }
}

/// Result type alias using FluxbaseError.
pub type Result<T> = std::result::Result<T, FluxbaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_display() {
        let err = FluxbaseError::RateLimitExceeded {
            retry_after: Duration::from_secs(5),
            limit: 10,
            remaining: 0,
        };
        assert!(err.to_string().contains("Rate limit exceeded"));
    }

    #[test]
    fn test_from_serde_json() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: FluxbaseError = bad.unwrap_err().into();
        assert!(matches!(err, FluxbaseError::Serialization(_)));
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(FluxbaseError::Validation("x".into()).kind(), "validation");
        assert_eq!(FluxbaseError::Unauthorized("x".into()).kind(), "unauthorized");
        assert_eq!(FluxbaseError::Forbidden("x".into()).kind(), "forbidden");
        assert_eq!(FluxbaseError::NotFound("x".into()).kind(), "not-found");
        assert_eq!(FluxbaseError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(FluxbaseError::Timeout("x".into()).kind(), "timeout");
        assert_eq!(FluxbaseError::Cancelled("x".into()).kind(), "cancelled");
        assert_eq!(FluxbaseError::Dependency("x".into()).kind(), "dependency");
        assert_eq!(FluxbaseError::Internal("x".into()).kind(), "internal");
        assert_eq!(
            FluxbaseError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
                limit: 1,
                remaining: 0
            }
            .kind(),
            "rate-limited"
        );
    }
}
