use fluxbase_core::auth::{Claims, TokenType};
use fluxbase_core::error::{FluxbaseError, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

/// Sign `claims` as a compact JWT using the configured HMAC secret.
pub fn encode_token(claims: &Claims, secret: &str) -> Result<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| FluxbaseError::Internal(format!("failed to sign token: {e}")))
}

/// Decode and validate a JWT, rejecting expired tokens and tokens of the
/// wrong `TokenType` (an access token presented where a refresh token is
/// expected, or vice versa).
pub fn decode_token(token: &str, secret: &str, expected: TokenType) -> Result<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| FluxbaseError::Unauthorized("invalid or expired token".into()))?;

    if data.claims.typ != expected {
        return Err(FluxbaseError::Unauthorized("wrong token type".into()));
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn round_trips_access_token() {
        let claims = Claims::builder()
            .user_id(Uuid::new_v4())
            .role("authenticated")
            .duration_secs(60)
            .build()
            .unwrap();
        let token = encode_token(&claims, "secret").unwrap();
        let decoded = decode_token(&token, "secret", TokenType::Access).unwrap();
        assert_eq!(decoded.sub, claims.sub);
    }

    #[test]
    fn rejects_wrong_token_type() {
        let claims = Claims::builder()
            .user_id(Uuid::new_v4())
            .duration_secs(60)
            .build()
            .unwrap();
        let token = encode_token(&claims, "secret").unwrap();
        assert!(decode_token(&token, "secret", TokenType::Refresh).is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let claims = Claims::builder().user_id(Uuid::new_v4()).build().unwrap();
        let token = encode_token(&claims, "secret").unwrap();
        assert!(decode_token(&token, "other", TokenType::Access).is_err());
    }
}
