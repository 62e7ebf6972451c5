//! Error taxonomy for the credential lifecycle.

use thiserror::Error;

use credo_auth::{CodecError, Rejection};
use credo_core::DomainError;

/// Persistence failure, as seen by the services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint was violated (email, external id, nonce).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(String),

    /// The backing store failed or could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of every exposed credential operation that did not succeed.
///
/// Each variant is a distinct outcome for the transport layer. Only
/// `Unavailable` may be retried by a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential is malformed")]
    Malformed,

    #[error("credential used in the wrong slot")]
    WrongKind,

    #[error("credential has expired")]
    Expired,

    #[error("refresh credential has been revoked or does not exist")]
    RevokedOrUnknown,

    #[error("credential subject no longer exists")]
    UnknownSubject,

    #[error("incorrect credentials")]
    BadCredentials,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Unavailable(_))
    }

    /// True for every outcome that means "this credential does not authenticate".
    pub fn is_credential_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::Malformed
                | AuthError::WrongKind
                | AuthError::Expired
                | AuthError::RevokedOrUnknown
                | AuthError::UnknownSubject
        )
    }

    /// Stable reason tag for logs and response bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Malformed => "malformed",
            AuthError::WrongKind => "wrong_kind",
            AuthError::Expired => "expired",
            AuthError::RevokedOrUnknown => "revoked_or_unknown",
            AuthError::UnknownSubject => "unknown_subject",
            AuthError::BadCredentials => "bad_credentials",
            AuthError::Conflict(_) => "conflict",
            AuthError::Validation(_) => "validation_error",
            AuthError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<Rejection> for AuthError {
    fn from(value: Rejection) -> Self {
        match value {
            Rejection::Malformed => AuthError::Malformed,
            Rejection::WrongKind => AuthError::WrongKind,
            Rejection::Expired => AuthError::Expired,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => AuthError::Conflict(msg),
            StoreError::NotFound(_) => AuthError::UnknownSubject,
            StoreError::Unavailable(msg) => AuthError::Unavailable(msg),
        }
    }
}

impl From<DomainError> for AuthError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => AuthError::Validation(msg),
        }
    }
}

impl From<CodecError> for AuthError {
    fn from(value: CodecError) -> Self {
        AuthError::Unavailable(value.to_string())
    }
}
