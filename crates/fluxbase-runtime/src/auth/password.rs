use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use fluxbase_core::error::{FluxbaseError, Result};

/// Hash a plaintext password into an argon2id PHC string suitable for
/// storage in `auth.users.password_hash`.
pub fn hash_password(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| FluxbaseError::Internal(format!("failed to hash password: {e}")))
}

/// Verify a plaintext password against a stored PHC hash. A malformed stored
/// hash is treated as a verification failure rather than propagated, since it
/// should never distinguish "bad hash" from "wrong password" to the caller.
pub fn verify_password(plaintext: &str, phc_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Minimal shape validation for a candidate password: at minimum 8 bytes.
/// Real strength scoring is an external-collaborator concern; this only
/// guards against an empty or trivially short submission.
pub fn validate_password_shape(plaintext: &str) -> Result<()> {
    if plaintext.len() < 8 {
        return Err(FluxbaseError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("P@ssw0rd!").unwrap();
        assert!(verify_password("P@ssw0rd!", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_hash_fails_closed() {
        assert!(!verify_password("anything", "not-a-phc-hash"));
    }

    #[test]
    fn rejects_short_passwords() {
        assert!(validate_password_shape("short").is_err());
        assert!(validate_password_shape("longenough1").is_ok());
    }
}
