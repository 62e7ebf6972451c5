//! Signed `state` parameter for the redirect-based provider login.
//!
//! The value round-trips through the provider and back to the callback, so it
//! is stateless: an HS256 token carrying a random nonce, a purpose tag and a
//! short expiry. A callback whose state does not verify is refused before any
//! code exchange happens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Nonce, SigningSecret};

const PURPOSE: &str = "oauth_state";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("state parameter is invalid")]
    Invalid,

    #[error("state parameter has expired")]
    Expired,

    #[error("failed to create state parameter: {0}")]
    Mint(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    purpose: String,
    nonce: String,
    exp: i64,
}

#[derive(Clone)]
pub struct OAuthStateSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl OAuthStateSigner {
    pub fn new(secret: &SigningSecret, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, now: DateTime<Utc>) -> Result<String, StateError> {
        let nonce = Nonce::generate().map_err(|e| StateError::Mint(e.to_string()))?;
        let claims = StateClaims {
            purpose: PURPOSE.to_string(),
            nonce: nonce.to_string(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| StateError::Mint(e.to_string()))
    }

    pub fn verify(&self, state: &str, now: DateTime<Utc>) -> Result<(), StateError> {
        let data = jsonwebtoken::decode::<StateClaims>(state, &self.decoding, &self.validation)
            .map_err(|_| StateError::Invalid)?;

        if data.claims.purpose != PURPOSE {
            return Err(StateError::Invalid);
        }
        if now.timestamp() >= data.claims.exp {
            return Err(StateError::Expired);
        }
        Ok(())
    }
}

impl core::fmt::Debug for OAuthStateSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OAuthStateSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
