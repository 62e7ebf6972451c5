//! Password verification oracle.
//!
//! The credential lifecycle treats password storage as opaque: it asks for a
//! handle when registering and asks whether a plaintext matches a handle when
//! logging in. Argon2id with PHC-encoded handles is the production oracle.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use thiserror::Error;

use crate::error::AuthError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("failed to draw salt entropy: {0}")]
    Entropy(String),

    #[error("failed to hash password: {0}")]
    Hash(String),
}

impl From<PasswordError> for AuthError {
    fn from(value: PasswordError) -> Self {
        AuthError::Unavailable(value.to_string())
    }
}

pub trait PasswordOracle: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// `false` for a mismatch and for an unparseable handle alike.
    fn verify(&self, plaintext: &str, handle: &str) -> bool;
}

/// Argon2id with default parameters and a 16-byte random salt per hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2PasswordOracle;

impl Argon2PasswordOracle {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordOracle for Argon2PasswordOracle {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| PasswordError::Entropy(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| PasswordError::Hash(e.to_string()))?;

        let phc = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?
            .to_string();
        Ok(phc)
    }

    fn verify(&self, plaintext: &str, handle: &str) -> bool {
        match PasswordHash::new(handle) {
            Ok(parsed) => Argon2::default().verify_password(plaintext.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}
