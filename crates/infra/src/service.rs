//! Operations exposed to the transport layer.
//!
//! `AuthService` wires the password oracle, the identity reconciler and the
//! session issuer behind the operations a client can invoke: register,
//! login, federated login, refresh, logout, and the access guard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use credo_auth::CredentialCodec;
use credo_core::Email;

use crate::accounts::{Account, AccountStore, AccountSummary, NewAccount};
use crate::error::AuthError;
use crate::identity::{ExternalAssertion, IdentityReconciler};
use crate::ledger::RefreshLedger;
use crate::password::PasswordOracle;
use crate::session::{SessionIssuer, SessionPolicy, TokenPair};

pub type SharedAccounts = Arc<dyn AccountStore>;
pub type SharedLedger = Arc<dyn RefreshLedger>;

/// Account summary plus a fresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    pub account: AccountSummary,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub display_name: Option<&'a str>,
}

pub struct AuthService {
    accounts: SharedAccounts,
    passwords: Arc<dyn PasswordOracle>,
    issuer: SessionIssuer<SharedAccounts, SharedLedger>,
    reconciler: IdentityReconciler<SharedAccounts>,
}

impl AuthService {
    pub fn new(
        codec: CredentialCodec,
        accounts: SharedAccounts,
        ledger: SharedLedger,
        passwords: Arc<dyn PasswordOracle>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            issuer: SessionIssuer::new(codec, accounts.clone(), ledger, policy),
            reconciler: IdentityReconciler::new(accounts.clone()),
            accounts,
            passwords,
        }
    }

    pub fn issuer(&self) -> &SessionIssuer<SharedAccounts, SharedLedger> {
        &self.issuer
    }

    /// Create a password account and sign it in. `Conflict` if the email is taken.
    pub async fn register(
        &self,
        registration: Registration<'_>,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        let email = Email::parse(registration.email)?;
        if registration.password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".to_string()));
        }

        if self.accounts.find_by_email(&email).await?.is_some() {
            tracing::info!(reason = "email_taken", "registration refused");
            return Err(AuthError::Conflict("email already registered".to_string()));
        }

        let password_hash = self.hash_password(registration.password).await?;
        let display_name = registration
            .display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.local_part())
            .to_string();

        let account = self
            .accounts
            .create(NewAccount {
                email,
                display_name,
                password_hash: Some(password_hash),
                external_id: None,
                created_at: now,
            })
            .await?;

        tracing::info!(account_id = %account.id, "account registered");
        self.sign_in(account, now).await
    }

    /// Verify a password and sign the account in.
    ///
    /// Unknown email, federated-only account and wrong password are
    /// indistinguishable to the caller.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Err(AuthError::BadCredentials);
        };

        let account = self.accounts.find_by_email(&email).await?;
        let Some(account) = account else {
            tracing::info!(reason = "unknown_email", "login refused");
            return Err(AuthError::BadCredentials);
        };
        let Some(handle) = account.password_hash.clone() else {
            tracing::info!(account_id = %account.id, reason = "no_password", "login refused");
            return Err(AuthError::BadCredentials);
        };

        if !self.verify_password(password, handle).await? {
            tracing::info!(account_id = %account.id, reason = "password_mismatch", "login refused");
            return Err(AuthError::BadCredentials);
        }

        self.sign_in(account, now).await
    }

    /// Sign in with a provider assertion, linking or creating the account as needed.
    pub async fn federated_login(
        &self,
        assertion: &ExternalAssertion,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        if !assertion.email_verified {
            tracing::warn!(reason = "email_unverified", "federated login refused");
            return Err(AuthError::BadCredentials);
        }

        let reconciled = self.reconciler.resolve(assertion, now).await?;
        self.sign_in(reconciled.account, now).await
    }

    pub async fn refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        self.issuer.rotate(refresh_token, now).await
    }

    /// Idempotent logout; only a storage failure is an error.
    pub async fn logout(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        self.issuer.revoke_session(refresh_token, now).await
    }

    /// Access guard for protected operations.
    pub async fn authenticate(&self, access_token: &str, now: DateTime<Utc>) -> Result<Account, AuthError> {
        self.issuer.authenticate_access(access_token, now).await
    }

    async fn sign_in(&self, account: Account, now: DateTime<Utc>) -> Result<AuthResult, AuthError> {
        let tokens = self.issuer.issue(&account, now).await?;
        Ok(AuthResult {
            account: account.summary(),
            tokens,
        })
    }

    async fn hash_password(&self, plaintext: &str) -> Result<String, AuthError> {
        let oracle = self.passwords.clone();
        let plaintext = plaintext.to_string();
        let hashed = tokio::task::spawn_blocking(move || oracle.hash(&plaintext))
            .await
            .map_err(|e| AuthError::Unavailable(format!("password hashing task failed: {e}")))??;
        Ok(hashed)
    }

    async fn verify_password(&self, plaintext: &str, handle: String) -> Result<bool, AuthError> {
        let oracle = self.passwords.clone();
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || oracle.verify(&plaintext, &handle))
            .await
            .map_err(|e| AuthError::Unavailable(format!("password verification task failed: {e}")))
    }
}

impl core::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthService")
            .field("policy", &self.issuer.policy())
            .finish_non_exhaustive()
    }
}
