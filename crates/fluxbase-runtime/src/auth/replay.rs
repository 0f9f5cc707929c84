//! Replay protection for SAML assertion IDs and OAuth authorization codes: a
//! short-TTL, table-backed set since the core has no shared in-memory cache
//! across processes.
//!
//! Schema this module assumes:
//!
//! ```sql
//! -- auth.replay_tokens(
//! --   token_id text primary key,
//! --   expires_at timestamptz not null,
//! --   consumed_at timestamptz not null default now()
//! -- )
//! ```

use chrono::{DateTime, Utc};
use fluxbase_core::error::{FluxbaseError, Result};
use sqlx::PgPool;

/// Record `token_id` as consumed. Succeeds once; a second presentation of the
/// same id fails as `Conflict("replay")`.
pub async fn consume_once(pool: &PgPool, token_id: &str, ttl: std::time::Duration) -> Result<()> {
    let expires_at: DateTime<Utc> = Utc::now()
        + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));

    let result = sqlx::query(
        "INSERT INTO auth.replay_tokens (token_id, expires_at)
         VALUES ($1, $2)
         ON CONFLICT (token_id) DO NOTHING",
    )
    .bind(token_id)
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;

    if result.rows_affected() == 0 {
        return Err(FluxbaseError::Conflict("replay".into()));
    }
    Ok(())
}

/// Drop replay records past their TTL. Called periodically by whatever
/// background task already owns rate-limiter bucket GC.
pub async fn cleanup_expired(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM auth.replay_tokens WHERE expires_at < now()")
        .execute(pool)
        .await
        .map_err(FluxbaseError::from_sqlx)?;
    Ok(result.rows_affected())
}
