//! Password login state machine and the `auth.users` table it reads/writes.
//!
//! Schema this module assumes (not migrated here, see `auth.users` in the
//! persistence schema described at the top level):
//!
//! ```sql
//! -- auth.users(
//! --   id uuid primary key default gen_random_uuid(),
//! --   email text not null unique,
//! --   password_hash text not null,
//! --   role text not null default 'authenticated',
//! --   failed_login_count int not null default 0,
//! --   first_failed_login_at timestamptz,
//! --   locked_until timestamptz,
//! --   mfa_enrolled boolean not null default false,
//! --   created_at timestamptz not null default now()
//! -- )
//! ```

use chrono::{DateTime, Duration, Utc};
use fluxbase_core::error::{FluxbaseError, Result};
use sqlx::PgPool;
use uuid::Uuid;

use super::password::{hash_password, verify_password};

/// Consecutive failures within `LOGIN_FAILURE_WINDOW` before an account locks.
const LOGIN_MAX_FAILURES: i32 = 5;
/// Rolling window a failure streak is measured over.
const LOGIN_FAILURE_WINDOW: Duration = Duration::minutes(15);
/// How long an account stays locked once the failure threshold is hit.
const LOGIN_LOCK_COOLDOWN: Duration = Duration::minutes(15);

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub failed_login_count: i32,
    pub first_failed_login_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub mfa_enrolled: bool,
}

/// Outcome of a password login attempt, mirroring the
/// `idle -> credentials-submitted -> {success | invalid | locked}` states
/// this core can actually reach (captcha and SSO are external-collaborator
/// states this core never drives on its own).
#[derive(Debug)]
pub enum LoginOutcome {
    Success { user: UserRecord, mfa_required: bool },
    Invalid,
    Locked { retry_after: std::time::Duration },
}

/// Create a new account. Returns `Conflict` if the email is already taken.
pub async fn signup(pool: &PgPool, email: &str, password: &str) -> Result<Uuid> {
    super::password::validate_password_shape(password)?;
    let hash = hash_password(password)?;

    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO auth.users (id, email, password_hash, role)
         VALUES (gen_random_uuid(), $1, $2, 'authenticated')
         RETURNING id",
    )
    .bind(email)
    .bind(hash)
    .fetch_one(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;

    Ok(row.0)
}

async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    sqlx::query_as::<_, UserRecord>(
        "SELECT id, email, password_hash, role, failed_login_count,
                first_failed_login_at, locked_until, mfa_enrolled
         FROM auth.users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)
}

pub(crate) async fn find_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    sqlx::query_as::<_, UserRecord>(
        "SELECT id, email, password_hash, role, failed_login_count,
                first_failed_login_at, locked_until, mfa_enrolled
         FROM auth.users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)
}

/// Run one password login attempt: checks the lock, verifies the password,
/// and updates the failure/lock bookkeeping accordingly.
pub async fn login(pool: &PgPool, email: &str, password: &str) -> Result<LoginOutcome> {
    let Some(user) = find_by_email(pool, email).await? else {
        // Do not distinguish "no such user" from "wrong password" to the caller.
        return Ok(LoginOutcome::Invalid);
    };

    if let Some(locked_until) = user.locked_until {
        let now = Utc::now();
        if locked_until > now {
            let retry_after = (locked_until - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(0));
            return Ok(LoginOutcome::Locked { retry_after });
        }
    }

    if verify_password(password, &user.password_hash) {
        reset_failures(pool, user.id).await?;
        let mfa_required = user.mfa_enrolled;
        return Ok(LoginOutcome::Success { user, mfa_required });
    }

    match record_failure(pool, &user).await? {
        Some(locked_until) => {
            let retry_after = (locked_until - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(0));
            Ok(LoginOutcome::Locked { retry_after })
        }
        None => Ok(LoginOutcome::Invalid),
    }
}

/// Record a failed login attempt. Returns `Some(locked_until)` if this
/// failure just tripped the lock.
async fn record_failure(pool: &PgPool, user: &UserRecord) -> Result<Option<DateTime<Utc>>> {
    let now = Utc::now();
    let window_start = user.first_failed_login_at;
    let in_window = window_start.map(|t| now - t < LOGIN_FAILURE_WINDOW).unwrap_or(false);

    let (new_count, new_window_start) = if in_window {
        (user.failed_login_count + 1, window_start.unwrap())
    } else {
        (1, now)
    };

    let locked_until = if new_count >= LOGIN_MAX_FAILURES {
        Some(now + LOGIN_LOCK_COOLDOWN)
    } else {
        None
    };

    sqlx::query(
        "UPDATE auth.users
         SET failed_login_count = $2, first_failed_login_at = $3, locked_until = $4
         WHERE id = $1",
    )
    .bind(user.id)
    .bind(new_count)
    .bind(new_window_start)
    .bind(locked_until)
    .execute(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;

    Ok(locked_until)
}

async fn reset_failures(pool: &PgPool, user_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE auth.users
         SET failed_login_count = 0, first_failed_login_at = NULL, locked_until = NULL
         WHERE id = $1",
    )
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;
    Ok(())
}

/// Mark (or clear) MFA enrollment on a user once TOTP setup is verified.
pub async fn set_mfa_enrolled(pool: &PgPool, user_id: Uuid, enrolled: bool) -> Result<()> {
    sqlx::query("UPDATE auth.users SET mfa_enrolled = $2 WHERE id = $1")
        .bind(user_id)
        .bind(enrolled)
        .execute(pool)
        .await
        .map_err(FluxbaseError::from_sqlx)?;
    Ok(())
}
