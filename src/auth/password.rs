use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use once_cell::sync::Lazy;

use crate::shared::error::ApiError;

/// Fixed work factor for stored credentials: Argon2id, 64 MiB memory,
/// 3 iterations, 4 lanes. Roughly equivalent to bcrypt cost 12+.
const MEMORY_COST_KIB: u32 = 65536;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 4;

const MIN_PASSWORD_LENGTH: usize = 10;

fn hasher() -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)
        .map_err(|e| anyhow!("invalid Argon2 parameters: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("invalid password hash: {e}"))?;
    match hasher()?.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("password verification failed: {e}")),
    }
}

static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_password("timing-equalizer-credential").unwrap_or_default());

/// Burns the same Argon2 work as a real check. Called on login paths that
/// have no stored hash, so an unknown email costs as much as a wrong
/// password.
pub fn verify_dummy(password: &str) {
    let _ = verify_password(password, &DUMMY_HASH);
}

pub fn validate_new_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(
            "password",
            format!("must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }
    if is_common_password(password) {
        return Err(ApiError::validation(
            "password",
            "this password is too common",
        ));
    }
    Ok(())
}

fn is_common_password(password: &str) -> bool {
    const COMMON_PASSWORDS: &[&str] = &[
        "password",
        "password1",
        "password123",
        "123456789",
        "1234567890",
        "qwertyuiop",
        "letmein123",
        "changeme",
        "welcome123",
        "admin12345",
    ];
    let lower = password.to_lowercase();
    COMMON_PASSWORDS.iter().any(|&common| lower == common)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse-battery").expect("hash failed");
        assert!(verify_password("correct-horse-battery", &hash).expect("verify failed"));
        assert!(!verify_password("wrong-horse", &hash).expect("verify failed"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("correct-horse-battery").expect("hash failed");
        let b = hash_password("correct-horse-battery").expect("hash failed");
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_rejects_short() {
        assert!(validate_new_password("short").is_err());
        assert!(validate_new_password("long-enough-password").is_ok());
    }

    #[test]
    fn test_validate_rejects_common() {
        assert!(validate_new_password("password123").is_err());
        assert!(validate_new_password("Qwertyuiop").is_err());
    }

    #[test]
    fn test_dummy_hash_verifies_like_a_real_one() {
        assert!(!verify_password("anything", &DUMMY_HASH).expect("verify failed"));
        verify_dummy("anything");
    }
}
