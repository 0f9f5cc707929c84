//! Service-key credential store: hash-on-read lookup, never persisting or
//! logging the raw key.
//!
//! Schema this module assumes:
//!
//! ```sql
//! -- auth.credentials(
//! --   id uuid primary key default gen_random_uuid(),
//! --   name text not null,
//! --   key_hash text not null unique,
//! --   role text not null default 'service_role',
//! --   status text not null default 'active', -- active | deprecated | revoked
//! --   deprecated_at timestamptz,
//! --   grace_period_secs bigint not null default 0,
//! --   created_at timestamptz not null default now()
//! -- )
//! ```

use fluxbase_core::error::{FluxbaseError, Result};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

fn hash_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    role: String,
    status: String,
    deprecated_at: Option<chrono::DateTime<chrono::Utc>>,
    grace_period_secs: i64,
}

/// Outcome of a service-key lookup. `deprecation_warning` is set when the key
/// is within its deprecation grace period — still authenticates, but the
/// caller should surface a warning header.
#[derive(Debug)]
pub struct ServiceKeyPrincipal {
    pub credential_id: Uuid,
    pub role: String,
    pub deprecation_warning: bool,
}

/// Look up a presented service key. Fails closed: unknown, revoked, or
/// expired-deprecated keys are `Unauthorized`.
pub async fn lookup(pool: &PgPool, raw_key: &str) -> Result<ServiceKeyPrincipal> {
    let hash = hash_key(raw_key);

    let row: Option<CredentialRow> = sqlx::query_as(
        "SELECT id, role, status, deprecated_at, grace_period_secs
         FROM auth.credentials WHERE key_hash = $1",
    )
    .bind(&hash)
    .fetch_optional(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;

    let Some(row) = row else {
        return Err(FluxbaseError::Unauthorized("invalid service key".into()));
    };

    match row.status.as_str() {
        "revoked" => Err(FluxbaseError::Unauthorized("service key revoked".into())),
        "active" => Ok(ServiceKeyPrincipal {
            credential_id: row.id,
            role: row.role,
            deprecation_warning: false,
        }),
        "deprecated" => {
            let still_valid = match row.deprecated_at {
                Some(since) => {
                    chrono::Utc::now() - since < chrono::Duration::seconds(row.grace_period_secs)
                }
                None => true,
            };
            if still_valid {
                Ok(ServiceKeyPrincipal {
                    credential_id: row.id,
                    role: row.role,
                    deprecation_warning: true,
                })
            } else {
                Err(FluxbaseError::Unauthorized(
                    "service key deprecation grace period elapsed".into(),
                ))
            }
        }
        other => Err(FluxbaseError::Unauthorized(format!(
            "service key has unrecognized status '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash_key("sk_abc"), hash_key("sk_abc"));
        assert_ne!(hash_key("sk_abc"), hash_key("sk_xyz"));
    }
}
