//! Identity federation: mapping third-party assertions onto local accounts.

pub mod google;
pub mod provider;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use credo_core::Email;

use crate::accounts::{Account, AccountStore, NewAccount};
use crate::error::{AuthError, StoreError};

pub use google::{GoogleConfig, GoogleIdentityProvider};
pub use provider::{IdentityProvider, ProviderError};

/// A provider's verified claim about who the user is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalAssertion {
    /// Provider subject key (stable per provider account).
    pub subject: String,
    pub email: Email,
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
}

/// Which precedence rule produced the account.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// An account already carried this provider key.
    Matched,
    /// An account with the asserted email was linked to the provider key.
    Linked,
    /// No account matched; a federated-only account was created.
    Created,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Matched => "matched",
            ReconcileOutcome::Linked => "linked",
            ReconcileOutcome::Created => "created",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub account: Account,
    pub outcome: ReconcileOutcome,
}

/// Resolves an [`ExternalAssertion`] to a local account.
///
/// Precedence: provider-key match, then email match (link), then create.
/// A provider key that is already linked is authoritative and is never moved
/// to another account.
#[derive(Debug, Clone)]
pub struct IdentityReconciler<A> {
    accounts: A,
}

impl<A> IdentityReconciler<A>
where
    A: AccountStore,
{
    pub fn new(accounts: A) -> Self {
        Self { accounts }
    }

    pub async fn resolve(
        &self,
        assertion: &ExternalAssertion,
        now: DateTime<Utc>,
    ) -> Result<Reconciled, AuthError> {
        if let Some(account) = self.accounts.find_by_external_id(&assertion.subject).await? {
            return Ok(self.done(account, ReconcileOutcome::Matched));
        }

        if let Some(existing) = self.accounts.find_by_email(&assertion.email).await? {
            let linked = self
                .accounts
                .link_external_id(existing.id, &assertion.subject, now)
                .await
                .map_err(|e| {
                    if let StoreError::Conflict(msg) = &e {
                        tracing::error!(
                            account_id = %existing.id,
                            detail = %msg,
                            "external identity link collided; refusing to reassign"
                        );
                    }
                    AuthError::from(e)
                })?;
            return Ok(self.done(linked, ReconcileOutcome::Linked));
        }

        let display_name = assertion
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| assertion.email.local_part())
            .to_string();

        let created = self
            .accounts
            .create(NewAccount {
                email: assertion.email.clone(),
                display_name,
                password_hash: None,
                external_id: Some(assertion.subject.clone()),
                created_at: now,
            })
            .await;

        match created {
            Ok(account) => Ok(self.done(account, ReconcileOutcome::Created)),
            // A concurrent first login for the same provider key won the insert.
            Err(StoreError::Conflict(msg)) => {
                match self.accounts.find_by_external_id(&assertion.subject).await? {
                    Some(account) => Ok(self.done(account, ReconcileOutcome::Matched)),
                    None => {
                        tracing::warn!(
                            detail = %msg,
                            "account creation for external identity collided with another account"
                        );
                        Err(AuthError::Conflict(msg))
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn done(&self, account: Account, outcome: ReconcileOutcome) -> Reconciled {
        tracing::info!(account_id = %account.id, outcome = outcome.as_str(), "external identity reconciled");
        Reconciled { account, outcome }
    }
}
