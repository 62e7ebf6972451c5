//! HS256 credential codec.
//!
//! `mint` and `parse` are pure functions of the signing secret, the claims
//! and the supplied `now`. Parsing follows a fixed pipeline:
//!
//! 1. signature and structure (tampered, wrong key, garbage) → `Malformed`
//! 2. kind tag matches the expected slot → otherwise `WrongKind`
//! 3. `now < exp` → otherwise `Expired`
//! 4. subject id, email (and nonce for refresh) present → otherwise `Malformed`

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::claims::{RawClaims, WireClaims, validate_raw};
use crate::{ClaimsBundle, CredentialKind, Grant, Nonce, Rejection, SigningSecret, Subject};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to draw nonce entropy: {0}")]
    Entropy(String),

    #[error("failed to sign credential: {0}")]
    Signing(String),

    #[error("credential lifetime {0} overflows the timestamp range")]
    Lifetime(Duration),
}

/// A freshly minted token together with the claims it carries.
///
/// Handing the claims back lets the issuer record the nonce and expiry without
/// re-parsing its own output.
#[derive(Debug, Clone)]
pub struct MintedCredential {
    pub token: String,
    pub claims: ClaimsBundle,
}

#[derive(Clone)]
pub struct CredentialCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl CredentialCodec {
    pub fn new(secret: &SigningSecret) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time and claim presence are checked by `validate_raw` in pipeline order.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign a credential of `kind` for `subject`, valid for `ttl` from `now`.
    ///
    /// Refresh credentials get a fresh random nonce; access credentials get none.
    pub fn mint(
        &self,
        subject: &Subject,
        kind: CredentialKind,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<MintedCredential, CodecError> {
        let issued_at = truncate_to_seconds(now);
        let expires_at = now
            .checked_add_signed(ttl)
            .map(truncate_to_seconds)
            .ok_or(CodecError::Lifetime(ttl))?;

        let grant = match kind {
            CredentialKind::Access => Grant::Access,
            CredentialKind::Refresh => Grant::Refresh {
                nonce: Nonce::generate().map_err(|e| CodecError::Entropy(e.to_string()))?,
            },
        };

        let wire = WireClaims {
            sub: subject.email.as_str(),
            uid: subject.account_id.get(),
            kind,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: match &grant {
                Grant::Access => None,
                Grant::Refresh { nonce } => Some(nonce.as_str()),
            },
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &wire, &self.encoding)
            .map_err(|e| CodecError::Signing(e.to_string()))?;

        Ok(MintedCredential {
            token,
            claims: ClaimsBundle {
                subject: subject.clone(),
                grant,
                issued_at,
                expires_at,
            },
        })
    }

    /// Verify `token` and return its claims if it is a live credential of `expected` kind.
    pub fn parse(
        &self,
        token: &str,
        expected: CredentialKind,
        now: DateTime<Utc>,
    ) -> Result<ClaimsBundle, Rejection> {
        let data = jsonwebtoken::decode::<RawClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "credential failed signature/structure check");
                Rejection::Malformed
            })?;

        validate_raw(data.claims, expected, now)
    }
}

impl core::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CredentialCodec").finish_non_exhaustive()
    }
}

fn truncate_to_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}
