//! TOTP (RFC 6238) enrollment and verification, accepting a code within
//! ±1 time step as required by the login state machine.
//!
//! Schema this module assumes:
//!
//! ```sql
//! -- auth.mfa_secrets(
//! --   user_id uuid primary key,
//! --   secret_base32 text not null,
//! --   verified boolean not null default false,
//! --   created_at timestamptz not null default now()
//! -- )
//! ```

use fluxbase_core::error::{FluxbaseError, Result};
use sqlx::PgPool;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

const SKEW_STEPS: u8 = 1;
const STEP_SECS: u64 = 30;
const DIGITS: usize = 6;

fn build_totp(secret_base32: &str, account: &str) -> Result<TOTP> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| FluxbaseError::Internal(format!("invalid MFA secret: {e}")))?;

    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW_STEPS,
        STEP_SECS,
        secret_bytes,
        Some("Fluxbase".to_string()),
        account.to_string(),
    )
    .map_err(|e| FluxbaseError::Internal(format!("failed to build TOTP: {e}")))
}

/// Begin MFA enrollment: generates a new secret and stores it unverified.
/// Returns the base32 secret and the `otpauth://` URI for display as a QR
/// code; enrollment is not considered complete until [`verify`] succeeds.
pub async fn begin_enrollment(pool: &PgPool, user_id: Uuid, account: &str) -> Result<(String, String)> {
    let secret = Secret::generate_secret();
    let secret_base32 = secret.to_encoded().to_string();
    let totp = build_totp(&secret_base32, account)?;
    let uri = totp
        .get_url()
        .map_err(|e| FluxbaseError::Internal(format!("failed to build otpauth uri: {e}")))?;

    sqlx::query(
        "INSERT INTO auth.mfa_secrets (user_id, secret_base32, verified)
         VALUES ($1, $2, false)
         ON CONFLICT (user_id) DO UPDATE SET secret_base32 = $2, verified = false",
    )
    .bind(user_id)
    .bind(&secret_base32)
    .execute(pool)
    .await
    .map_err(FluxbaseError::from_sqlx)?;

    Ok((secret_base32, uri))
}

/// Verify a submitted TOTP code against the stored secret. On the first
/// successful verification, marks enrollment as complete.
pub async fn verify(pool: &PgPool, user_id: Uuid, account: &str, code: &str) -> Result<bool> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT secret_base32 FROM auth.mfa_secrets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(FluxbaseError::from_sqlx)?;

    let Some((secret_base32,)) = row else {
        return Err(FluxbaseError::NotFound("MFA not enrolled".into()));
    };

    let totp = build_totp(&secret_base32, account)?;
    let valid = totp
        .check_current(code)
        .map_err(|e| FluxbaseError::Internal(format!("failed to check TOTP code: {e}")))?;

    if valid {
        sqlx::query("UPDATE auth.mfa_secrets SET verified = true WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(FluxbaseError::from_sqlx)?;
        super::users::set_mfa_enrolled(pool, user_id, true).await?;
    }

    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_generated_code() {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();
        let totp = build_totp(&secret_base32, "user@example.com").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(totp.check_current(&code).unwrap());
    }

    #[test]
    fn rejects_wrong_code() {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();
        let totp = build_totp(&secret_base32, "user@example.com").unwrap();
        let correct = totp.generate_current().unwrap();
        let mut wrong_digit = correct.as_bytes()[0];
        wrong_digit = if wrong_digit == b'9' { b'0' } else { wrong_digit + 1 };
        let wrong = format!("{}{}", wrong_digit as char, &correct[1..]);
        assert!(!totp.check_current(&wrong).unwrap());
    }
}
