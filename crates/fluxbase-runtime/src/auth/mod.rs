//! Authentication & session layer: turns credentials into principals.
//!
//! This module owns everything the gateway's auth resolver and auth HTTP
//! handlers need that touches `auth.*` tables: password signup/login with
//! account lockout, refresh-token rotation with reuse detection, TOTP
//! enrollment/verification, service-key lookup, and replay protection for
//! externally-issued assertion/authorization-code ids.

mod credentials;
mod jwt;
mod password;
mod replay;
mod sessions;
mod totp;
mod users;

pub use credentials::ServiceKeyPrincipal;
pub use sessions::TokenPair;
pub use users::{LoginOutcome, UserRecord};

use fluxbase_core::auth::{Claims, TokenType};
use fluxbase_core::config::AuthConfig;
use fluxbase_core::error::{FluxbaseError, Result};
use fluxbase_core::principal::{Principal, PrincipalRole};
use sqlx::PgPool;
use uuid::Uuid;

/// Outcome of submitting primary-factor credentials.
pub enum LoginResult {
    /// No second factor enrolled: full tokens issued immediately.
    Success(TokenPair),
    /// MFA enrolled: primary factor accepted but the session is not yet
    /// promoted to a full principal. `mfa_token` must be presented to
    /// [`AuthService::verify_mfa`] within its short validity window.
    MfaRequired { mfa_token: String },
    Invalid,
    Locked { retry_after: std::time::Duration },
}

const MFA_PENDING_TTL_SECS: i64 = 120;
const MFA_PENDING_PURPOSE: &str = "mfa_pending";

/// Facade the gateway wires into the auth resolver and the `/api/v1/auth/*`
/// handlers.
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(pool: PgPool, config: AuthConfig) -> Self {
        Self { pool, config }
    }

    fn jwt_secret(&self) -> Result<&str> {
        self.config
            .jwt_secret
            .as_deref()
            .ok_or_else(|| FluxbaseError::Config("FLUXBASE_JWT_SECRET is not configured".into()))
    }

    /// Create a new account.
    pub async fn signup(&self, email: &str, password: &str) -> Result<Uuid> {
        users::signup(&self.pool, email, password).await
    }

    /// Run the password login state machine, issuing tokens or an MFA
    /// challenge on success.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult> {
        match users::login(&self.pool, email, password).await? {
            LoginOutcome::Invalid => Ok(LoginResult::Invalid),
            LoginOutcome::Locked { retry_after } => Ok(LoginResult::Locked { retry_after }),
            LoginOutcome::Success { user, mfa_required } => {
                if mfa_required {
                    let claims = Claims::builder()
                        .user_id(user.id)
                        .claim("purpose", serde_json::json!(MFA_PENDING_PURPOSE))
                        .duration_secs(MFA_PENDING_TTL_SECS)
                        .build()
                        .map_err(FluxbaseError::Internal)?;
                    let mfa_token = jwt::encode_token(&claims, self.jwt_secret()?)?;
                    Ok(LoginResult::MfaRequired { mfa_token })
                } else {
                    let pair = sessions::issue(
                        &self.pool,
                        &user,
                        self.jwt_secret()?,
                        self.config.access_token_ttl_secs as i64,
                        self.config.refresh_token_ttl_secs as i64,
                    )
                    .await?;
                    Ok(LoginResult::Success(pair))
                }
            }
        }
    }

    /// Complete a login pending MFA: verifies the TOTP code against the
    /// `mfa_token` issued by [`Self::login`] and, on success, issues the
    /// full token pair.
    pub async fn verify_mfa(&self, mfa_token: &str, code: &str) -> Result<TokenPair> {
        let secret = self.jwt_secret()?;
        let claims = jwt::decode_token(mfa_token, secret, TokenType::Access)?;
        let purpose = claims.get_claim("purpose").and_then(|v| v.as_str());
        if purpose != Some(MFA_PENDING_PURPOSE) {
            return Err(FluxbaseError::Unauthorized("not an MFA challenge token".into()));
        }
        let user_id = claims
            .user_id()
            .ok_or_else(|| FluxbaseError::Unauthorized("malformed MFA challenge token".into()))?;

        let user = users::find_by_id(&self.pool, user_id)
            .await?
            .ok_or_else(|| FluxbaseError::NotFound("user not found".into()))?;

        let ok = totp::verify(&self.pool, user_id, &user.email, code).await?;
        if !ok {
            return Err(FluxbaseError::Unauthorized("invalid MFA code".into()));
        }

        sessions::issue(
            &self.pool,
            &user,
            secret,
            self.config.access_token_ttl_secs as i64,
            self.config.refresh_token_ttl_secs as i64,
        )
        .await
    }

    /// Begin TOTP enrollment for an already-authenticated user.
    pub async fn begin_mfa_enrollment(&self, user_id: Uuid, email: &str) -> Result<(String, String)> {
        totp::begin_enrollment(&self.pool, user_id, email).await
    }

    /// Confirm TOTP enrollment with a code generated from the freshly issued
    /// secret.
    pub async fn confirm_mfa_enrollment(&self, user_id: Uuid, email: &str, code: &str) -> Result<bool> {
        totp::verify(&self.pool, user_id, email, code).await
    }

    /// Rotate a refresh token, returning a new pair bound to the same
    /// session. `reuse_nonce`, when present, makes a retry of the same
    /// logical rotation idempotent instead of being rejected as replay.
    pub async fn refresh(&self, refresh_token: &str, reuse_nonce: Option<&str>) -> Result<TokenPair> {
        sessions::rotate(
            &self.pool,
            refresh_token,
            reuse_nonce,
            self.jwt_secret()?,
            self.config.access_token_ttl_secs as i64,
            self.config.refresh_token_ttl_secs as i64,
        )
        .await
    }

    /// Resolve a bearer access token into a full principal.
    pub fn resolve_access_token(&self, token: &str) -> Result<Principal> {
        let claims = jwt::decode_token(token, self.jwt_secret()?, TokenType::Access)?;
        if claims.get_claim("purpose").and_then(|v| v.as_str()) == Some(MFA_PENDING_PURPOSE) {
            return Err(FluxbaseError::Unauthorized(
                "MFA verification is required to complete this session".into(),
            ));
        }
        let user_id = claims
            .user_id()
            .ok_or_else(|| FluxbaseError::Unauthorized("malformed access token".into()))?;
        let email = claims
            .get_claim("email")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let role = claims
            .roles
            .first()
            .map(|r| role_from_str(r))
            .unwrap_or(PrincipalRole::Authenticated);

        let claims_map = claims.custom.clone();
        Ok(match role {
            PrincipalRole::DashboardAdmin | PrincipalRole::DashboardUser => {
                Principal::dashboard(role, user_id, email)
            }
            _ => Principal::authenticated(user_id, email, claims_map),
        })
    }

    /// Resolve a presented service key into a service principal, carrying
    /// whether the key is inside its deprecation grace period.
    pub async fn resolve_service_key(&self, raw_key: &str) -> Result<ServiceKeyPrincipal> {
        credentials::lookup(&self.pool, raw_key).await
    }

    /// Consume a replayable external token (SAML assertion id / OAuth code)
    /// exactly once.
    pub async fn consume_replay_token(&self, token_id: &str, ttl: std::time::Duration) -> Result<()> {
        replay::consume_once(&self.pool, token_id, ttl).await
    }
}

fn role_from_str(s: &str) -> PrincipalRole {
    match s {
        "dashboard_admin" => PrincipalRole::DashboardAdmin,
        "dashboard_user" => PrincipalRole::DashboardUser,
        "service_role" => PrincipalRole::ServiceRole,
        "anon" => PrincipalRole::Anon,
        _ => PrincipalRole::Authenticated,
    }
}
