//! Infrastructure layer: stores, orchestration, config, external services.
//!
//! - `accounts` / `ledger`: storage boundaries with in-memory and Postgres backends
//! - `identity`: provider login and reconciliation of external identities
//! - `session`: credential issuance, rotation and revocation
//! - `service`: the operations exposed to the HTTP layer

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod password;
pub mod service;
pub mod session;

pub use accounts::{Account, AccountStore, AccountSummary, InMemoryAccountStore, NewAccount, PostgresAccountStore};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, StoreError};
pub use identity::{
    ExternalAssertion, GoogleConfig, GoogleIdentityProvider, IdentityProvider, IdentityReconciler,
    ProviderError, ReconcileOutcome,
};
pub use ledger::{InMemoryRefreshLedger, LedgerEntry, NewLedgerEntry, PostgresRefreshLedger, RefreshLedger};
pub use password::{Argon2PasswordOracle, PasswordError, PasswordOracle};
pub use service::{AuthResult, AuthService, Registration};
pub use session::{SessionIssuer, SessionPolicy, TokenPair};
