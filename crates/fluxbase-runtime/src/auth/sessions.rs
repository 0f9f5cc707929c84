//! Refresh-token session store: issuance, atomic single-use rotation, and
//! reuse (replay) detection.
//!
//! Schema this module assumes:
//!
//! ```sql
//! -- auth.refresh_tokens(
//! --   id uuid primary key default gen_random_uuid(),
//! --   user_id uuid not null,
//! --   session_id uuid not null,
//! --   token_hash text not null unique,
//! --   rotated_at timestamptz,
//! --   rotated_nonce text,
//! --   expires_at timestamptz not null,
//! --   created_at timestamptz not null default now()
//! -- )
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use fluxbase_core::auth::Claims;
use fluxbase_core::error::{FluxbaseError, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::encode_token;
use super::users::UserRecord;

/// A signed access token paired with an opaque refresh token.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
}

fn random_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_token(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

/// Deterministically derives the child refresh token a retried rotation of
/// `old_hash` under `nonce` must re-produce: same `old_hash` + same `nonce`
/// always yields the same token, so a retry presenting the same reuse nonce
/// gets back the exact token the original rotation issued rather than a
/// fresh (and therefore irreproducible) random one.
fn derive_rotated_token(old_hash: &str, nonce: &str, jwt_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(jwt_secret.as_bytes());
    hasher.update(b":");
    hasher.update(old_hash.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Issue a fresh access + refresh token pair for a newly-authenticated user,
/// starting a new session.
pub async fn issue(
    pool: &PgPool,
    user: &UserRecord,
    jwt_secret: &str,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
) -> Result<TokenPair> {
    let session_id = Uuid::new_v4();
    issue_for_session(pool, user, session_id, jwt_secret, access_ttl_secs, refresh_ttl_secs, random_opaque_token()).await
}

async fn issue_for_session(
    pool: &PgPool,
    user: &UserRecord,
    session_id: Uuid,
    jwt_secret: &str,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    refresh_token: String,
) -> Result<TokenPair> {
    let access_claims = Claims::builder()
        .user_id(user.id)
        .role(user.role.clone())
        .session_id(session_id)
        .claim("email", serde_json::json!(user.email))
        .duration_secs(access_ttl_secs)
        .build()
        .map_err(FluxbaseError::Internal)?;
    let access_token = encode_token(&access_claims, jwt_secret)?;

    let expires_at = Utc::now() + chrono::Duration::seconds(refresh_ttl_secs);

    sqlx::query(
        "INSERT INTO auth.refresh_tokens (id, user_id, session_id, token_hash, expires_at)
         VALUES (gen_random_uuid(), $1, $2, $3, $4)",
    )
    .bind(user.id)
    .bind(session_id)
    .bind(hash_token(&refresh_token))
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        session_id,
    })
}

/// Re-derives and re-issues the child token pair for an already-rotated
/// refresh token whose retry presented the same reuse nonce as the original
/// rotation, without inserting another row (the child row already exists
/// from the rotation that won the race).
async fn reissue_rotated(
    pool: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
    old_hash: &str,
    nonce: &str,
    jwt_secret: &str,
    access_ttl_secs: i64,
) -> Result<TokenPair> {
    let user = fetch_user(pool, user_id).await?;

    let access_claims = Claims::builder()
        .user_id(user.id)
        .role(user.role.clone())
        .session_id(session_id)
        .claim("email", serde_json::json!(user.email))
        .duration_secs(access_ttl_secs)
        .build()
        .map_err(FluxbaseError::Internal)?;
    let access_token = encode_token(&access_claims, jwt_secret)?;

    Ok(TokenPair {
        access_token,
        refresh_token: derive_rotated_token(old_hash, nonce, jwt_secret),
        session_id,
    })
}

async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<UserRecord> {
    sqlx::query_as(
        "SELECT id, email, password_hash, role, failed_login_count,
                first_failed_login_at, locked_until, mfa_enrolled
         FROM auth.users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)
}

#[derive(sqlx::FromRow)]
struct RefreshRow {
    id: Uuid,
    user_id: Uuid,
    session_id: Uuid,
    rotated_at: Option<chrono::DateTime<Utc>>,
    rotated_nonce: Option<String>,
    expires_at: chrono::DateTime<Utc>,
}

/// Validate a presented refresh token, rotate it atomically, and issue a new
/// pair bound to the same session.
///
/// `reuse_nonce` is the caller's idempotency key for this logical rotation
/// attempt (e.g. generated once by the client and resent verbatim on a
/// retry). A token that has already been rotated re-issues the same child
/// token when the retry's nonce matches the nonce recorded on the original
/// rotation — this is the "idempotent for the same reuse nonce" contract.
/// Any other re-presentation (no nonce, or a different one) is rejected as
/// replay.
pub async fn rotate(
    pool: &PgPool,
    presented_token: &str,
    reuse_nonce: Option<&str>,
    jwt_secret: &str,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
) -> Result<TokenPair> {
    let hash = hash_token(presented_token);

    let row: Option<RefreshRow> = sqlx::query_as(
        "SELECT id, user_id, session_id, rotated_at, rotated_nonce, expires_at
         FROM auth.refresh_tokens WHERE token_hash = $1",
    )
    .bind(&hash)
    .fetch_optional(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;

    let Some(row) = row else {
        return Err(FluxbaseError::Unauthorized("unknown refresh token".into()));
    };

    if row.expires_at < Utc::now() {
        return Err(FluxbaseError::Unauthorized("refresh token expired".into()));
    }

    if row.rotated_at.is_some() {
        return retry_or_replay(pool, &row, &hash, reuse_nonce, jwt_secret, access_ttl_secs).await;
    }

    // Compare-and-swap: only one concurrent rotation attempt wins.
    let claimed = sqlx::query(
        "UPDATE auth.refresh_tokens SET rotated_at = now(), rotated_nonce = $2
         WHERE id = $1 AND rotated_at IS NULL",
    )
    .bind(row.id)
    .bind(reuse_nonce)
    .execute(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;

    if claimed.rows_affected() == 0 {
        // Lost the race to a concurrent rotation; treat this exactly like an
        // already-rotated token (it is one, by the time this observes it).
        return retry_or_replay(pool, &row, &hash, reuse_nonce, jwt_secret, access_ttl_secs).await;
    }

    let user = fetch_user(pool, row.user_id).await?;
    let refresh_token = match reuse_nonce {
        Some(nonce) => derive_rotated_token(&hash, nonce, jwt_secret),
        None => random_opaque_token(),
    };
    issue_for_session(
        pool,
        &user,
        row.session_id,
        jwt_secret,
        access_ttl_secs,
        refresh_ttl_secs,
        refresh_token,
    )
    .await
}

/// Decides whether a rotation attempt against an already-rotated token is the
/// same logical retry (same reuse nonce as recorded) or a genuine replay.
async fn retry_or_replay(
    pool: &PgPool,
    row: &RefreshRow,
    old_hash: &str,
    reuse_nonce: Option<&str>,
    jwt_secret: &str,
    access_ttl_secs: i64,
) -> Result<TokenPair> {
    // The CAS-losing path re-reads the row rather than trusting the stale
    // `row.rotated_nonce` captured before the race was lost.
    let current: RefreshRow = sqlx::query_as(
        "SELECT id, user_id, session_id, rotated_at, rotated_nonce, expires_at
         FROM auth.refresh_tokens WHERE id = $1",
    )
    .bind(row.id)
    .fetch_one(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;

    match (reuse_nonce, current.rotated_nonce.as_deref()) {
        (Some(nonce), Some(stored)) if nonce == stored => {
            reissue_rotated(pool, current.user_id, current.session_id, old_hash, nonce, jwt_secret, access_ttl_secs).await
        }
        _ => Err(FluxbaseError::Conflict("refresh token replay".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_tokens_are_unique_and_urlsafe() {
        let a = random_opaque_token();
        let b = random_opaque_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_token("same"), hash_token("same"));
        assert_ne!(hash_token("a"), hash_token("b"));
    }

    #[test]
    fn derived_rotated_token_is_deterministic_per_nonce() {
        let a = derive_rotated_token("oldhash", "nonce-1", "secret");
        let b = derive_rotated_token("oldhash", "nonce-1", "secret");
        assert_eq!(a, b);

        let different_nonce = derive_rotated_token("oldhash", "nonce-2", "secret");
        assert_ne!(a, different_nonce);
    }
}
