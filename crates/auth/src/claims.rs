use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use credo_core::{AccountId, Email};

use crate::Nonce;

/// Which slot a credential is meant for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// Short-lived, authorizes individual requests, never tracked.
    Access,
    /// Long-lived, single-use, tracked in the refresh ledger.
    Refresh,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Access => "access",
            CredentialKind::Refresh => "refresh",
        }
    }
}

impl core::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a credential speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub account_id: AccountId,
    pub email: Email,
}

impl Subject {
    pub fn new(account_id: AccountId, email: Email) -> Self {
        Self { account_id, email }
    }
}

/// Per-kind payload. Only refresh credentials carry a nonce, and they always do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Access,
    Refresh { nonce: Nonce },
}

impl Grant {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Grant::Access => CredentialKind::Access,
            Grant::Refresh { .. } => CredentialKind::Refresh,
        }
    }
}

/// Verified contents of a credential.
///
/// Never persisted; the only durable trace of a refresh bundle is the ledger
/// entry keyed by its nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimsBundle {
    pub subject: Subject,
    pub grant: Grant,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ClaimsBundle {
    pub fn kind(&self) -> CredentialKind {
        self.grant.kind()
    }

    pub fn nonce(&self) -> Option<&Nonce> {
        match &self.grant {
            Grant::Access => None,
            Grant::Refresh { nonce } => Some(nonce),
        }
    }
}

/// Why a presented credential was refused by the codec.
///
/// Revocation is not represented here; that is decided by the ledger.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("credential is malformed or its signature is invalid")]
    Malformed,

    #[error("credential was presented in the wrong slot")]
    WrongKind,

    #[error("credential has expired")]
    Expired,
}

impl Rejection {
    /// Stable reason tag for structured logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Malformed => "malformed",
            Rejection::WrongKind => "wrong_kind",
            Rejection::Expired => "expired",
        }
    }
}

/// Claims as they travel inside the signed token.
#[derive(Debug, Serialize)]
pub(crate) struct WireClaims<'a> {
    pub sub: &'a str,
    pub uid: i64,
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<&'a str>,
}

/// Claims as read back after signature verification, before any checks.
///
/// Every field is optional so that a structurally incomplete token reaches
/// the ordered checks below instead of failing inside the JSON decoder.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub uid: Option<i64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
}

/// Ordered validation of signature-verified claims: kind, then expiry, then
/// required fields. The first failing stage decides the outcome.
pub(crate) fn validate_raw(
    raw: RawClaims,
    expected: CredentialKind,
    now: DateTime<Utc>,
) -> Result<ClaimsBundle, Rejection> {
    if raw.kind.as_deref() != Some(expected.as_str()) {
        return Err(Rejection::WrongKind);
    }

    let exp = raw.exp.ok_or(Rejection::Malformed)?;
    let expires_at = DateTime::<Utc>::from_timestamp(exp, 0).ok_or(Rejection::Malformed)?;
    if now >= expires_at {
        return Err(Rejection::Expired);
    }

    let email = raw
        .sub
        .as_deref()
        .and_then(|sub| Email::parse(sub).ok())
        .ok_or(Rejection::Malformed)?;
    let account_id = raw.uid.map(AccountId::from_raw).ok_or(Rejection::Malformed)?;
    let issued_at = raw
        .iat
        .and_then(|iat| DateTime::<Utc>::from_timestamp(iat, 0))
        .ok_or(Rejection::Malformed)?;

    let grant = match expected {
        CredentialKind::Access => Grant::Access,
        CredentialKind::Refresh => match raw.jti {
            Some(jti) if !jti.is_empty() => Grant::Refresh {
                nonce: Nonce::from_string(jti),
            },
            _ => return Err(Rejection::Malformed),
        },
    };

    Ok(ClaimsBundle {
        subject: Subject::new(account_id, email),
        grant,
        issued_at,
        expires_at,
    })
}
