//! HTTP handlers for `/api/v1/auth/*`: signup, login, MFA challenge/enroll,
//! and refresh-token rotation.

use axum::extract::{ConnectInfo, Extension, State};
use axum::http::StatusCode;
use axum::Json;
use fluxbase_core::config::RateLimitSettings;
use fluxbase_core::principal::Principal;
use fluxbase_core::rate_limit::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::{AuthService, LoginResult};
use crate::rate_limit::SharedRateLimiter;

use super::error::ApiError;
use super::middleware::enforce_auth_rate_limit;

fn auth_bucket_config(settings: &RateLimitSettings) -> RateLimitConfig {
    RateLimitConfig::new(settings.requests, Duration::from_secs(settings.window_secs))
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user_id: uuid::Uuid,
}

pub async fn signup(
    State(auth): State<AuthService>,
    State(rate_limiter): State<SharedRateLimiter>,
    State(rate_limit_settings): State<RateLimitSettings>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    enforce_auth_rate_limit(
        &rate_limiter,
        "signup",
        &body.email,
        Some(&peer.ip().to_string()),
        &auth_bucket_config(&rate_limit_settings),
    )
    .await?;
    let user_id = auth.signup(&body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(SignupResponse { user_id })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens {
        access_token: String,
        refresh_token: String,
        session_id: uuid::Uuid,
    },
    MfaRequired {
        mfa_token: String,
    },
}

pub async fn login(
    State(auth): State<AuthService>,
    State(rate_limiter): State<SharedRateLimiter>,
    State(rate_limit_settings): State<RateLimitSettings>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    enforce_auth_rate_limit(
        &rate_limiter,
        "login",
        &body.email,
        Some(&peer.ip().to_string()),
        &auth_bucket_config(&rate_limit_settings),
    )
    .await?;
    match auth.login(&body.email, &body.password).await? {
        LoginResult::Success(pair) => Ok(Json(LoginResponse::Tokens {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            session_id: pair.session_id,
        })),
        LoginResult::MfaRequired { mfa_token } => Ok(Json(LoginResponse::MfaRequired { mfa_token })),
        LoginResult::Invalid => Err(ApiError::from(fluxbase_core::error::FluxbaseError::Unauthorized(
            "invalid email or password".into(),
        ))),
        LoginResult::Locked { retry_after } => Err(ApiError::from(
            fluxbase_core::error::FluxbaseError::RateLimitExceeded {
                retry_after,
                limit: 5,
                remaining: 0,
            },
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct MfaVerifyRequest {
    pub mfa_token: String,
    pub code: String,
}

pub async fn verify_mfa(
    State(auth): State<AuthService>,
    Json(body): Json<MfaVerifyRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let pair = auth.verify_mfa(&body.mfa_token, &body.code).await?;
    Ok(Json(LoginResponse::Tokens {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        session_id: pair.session_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct MfaEnrollResponse {
    pub secret: String,
    pub otpauth_uri: String,
}

pub async fn begin_mfa_enrollment(
    State(auth): State<AuthService>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<MfaEnrollResponse>, ApiError> {
    let user_id = principal.require_user_id()?;
    let email = principal.email().unwrap_or("").to_string();
    let (secret, otpauth_uri) = auth.begin_mfa_enrollment(user_id, &email).await?;
    Ok(Json(MfaEnrollResponse { secret, otpauth_uri }))
}

#[derive(Debug, Deserialize)]
pub struct MfaConfirmRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct MfaConfirmResponse {
    pub verified: bool,
}

pub async fn confirm_mfa_enrollment(
    State(auth): State<AuthService>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<MfaConfirmRequest>,
) -> Result<Json<MfaConfirmResponse>, ApiError> {
    let user_id = principal.require_user_id()?;
    let email = principal.email().unwrap_or("").to_string();
    let verified = auth.confirm_mfa_enrollment(user_id, &email, &body.code).await?;
    Ok(Json(MfaConfirmResponse { verified }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
    /// Idempotency key for this rotation attempt; resending the same value
    /// on retry re-issues the same new pair instead of failing as replay.
    #[serde(default)]
    pub reuse_nonce: Option<String>,
}

pub async fn refresh(
    State(auth): State<AuthService>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let pair = auth.refresh(&body.refresh_token, body.reuse_nonce.as_deref()).await?;
    Ok(Json(LoginResponse::Tokens {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        session_id: pair.session_id,
    }))
}
