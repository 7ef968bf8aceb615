//! Password hashing.
//!
//! bcrypt is CPU-bound, so both operations run on the blocking pool.

use thiserror::Error;

use crate::validation::Validator;

/// Minimum password length in bytes
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// bcrypt only reads the first 72 bytes
pub const MAX_PASSWORD_LENGTH: usize = 72;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Password task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub async fn hash_password(password: &str, cost: u32) -> Result<String, PasswordError> {
    let password = password.to_string();
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hashed)
}

/// `Ok(false)` on mismatch; `Err` only if the hash itself is unusable.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let password = password.to_string();
    let hash = hash.to_string();
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
    Ok(matches)
}

pub fn validate_password(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_LENGTH,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_LENGTH,
        "password",
        "must not be more than 72 bytes long",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lowest cost bcrypt accepts, keeps the tests fast
    const TEST_COST: u32 = 4;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("pa55word", TEST_COST).await.unwrap();
        assert_ne!(hash, "pa55word");
        assert!(verify_password("pa55word", &hash).await.unwrap());
        assert!(!verify_password("wrong-password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_against_garbage_hash_errors() {
        assert!(verify_password("pa55word", "not-a-hash").await.is_err());
    }

    #[test]
    fn test_validate_password() {
        let mut v = Validator::new();
        validate_password(&mut v, "pa55word");
        assert!(v.is_valid());

        let mut v = Validator::new();
        validate_password(&mut v, "");
        assert_eq!(v.errors()["password"], "must be provided");

        let mut v = Validator::new();
        validate_password(&mut v, "short");
        assert_eq!(v.errors()["password"], "must be at least 8 bytes long");

        let mut v = Validator::new();
        validate_password(&mut v, &"x".repeat(73));
        assert_eq!(v.errors()["password"], "must not be more than 72 bytes long");
    }
}
