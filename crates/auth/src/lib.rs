//! `credo-auth`: credential codec (signed, time-bounded claim bundles).
//!
//! This crate is intentionally decoupled from HTTP and storage: it turns a
//! subject into a signed token and back, and nothing else. Revocation state
//! lives in the refresh ledger (`credo-infra`).

pub mod claims;
pub mod codec;
pub mod nonce;
pub mod oauth_state;
pub mod secret;

pub use claims::{ClaimsBundle, CredentialKind, Grant, Rejection, Subject};
pub use codec::{CodecError, CredentialCodec, MintedCredential};
pub use nonce::Nonce;
pub use oauth_state::{OAuthStateSigner, StateError};
pub use secret::SigningSecret;
