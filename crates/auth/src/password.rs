//! Password hashing (argon2id, PHC string format).

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use thiserror::Error;

use malvader_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must have at least {0} characters")]
    TooShort(usize),

    #[error("stored password hash is malformed")]
    MalformedHash,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl From<PasswordError> for DomainError {
    fn from(value: PasswordError) -> Self {
        match value {
            PasswordError::TooShort(_) => DomainError::validation(value.to_string()),
            PasswordError::MalformedHash | PasswordError::Hashing(_) => {
                DomainError::consistency(value.to_string())
            }
        }
    }
}

pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash cannot be parsed.
pub fn verify_password(plain: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| PasswordError::MalformedHash)?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

pub fn check_strength(plain: &str, min_len: usize) -> Result<(), PasswordError> {
    if plain.chars().count() < min_len {
        return Err(PasswordError::TooShort(min_len));
    }
    Ok(())
}

/// Random password handed to a newly registered employee.
pub fn generate_provisional<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}
