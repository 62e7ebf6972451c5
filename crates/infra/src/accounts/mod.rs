//! Local accounts and their storage boundary.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use credo_auth::Subject;
use credo_core::{AccountId, Email};

use crate::error::StoreError;

pub use in_memory::InMemoryAccountStore;
pub use postgres::PostgresAccountStore;

/// A local identity record.
///
/// Created on registration or first federated login. The only mutation this
/// subsystem performs is attaching an external identity key; accounts are
/// never hard-deleted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub email: Email,
    pub display_name: String,
    /// PHC-encoded password hash; `None` for federated-only accounts.
    pub password_hash: Option<String>,
    /// Provider subject key; unique across accounts once set.
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn subject(&self) -> Subject {
        Subject::new(self.id, self.email.clone())
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Insert shape; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub email: Email,
    pub display_name: String,
    pub password_hash: Option<String>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public view of an account returned alongside credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub id: AccountId,
    pub email: Email,
    pub display_name: String,
}

/// Account persistence.
///
/// Implementations must enforce uniqueness of `email` and of `external_id`
/// (when present) and report violations as `StoreError::Conflict`.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError>;

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, StoreError>;

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Account>, StoreError>;

    /// Attach `external_id` to account `id`.
    ///
    /// Idempotent when the account already carries that key. Fails with
    /// `Conflict` when the key belongs to another account or when the account
    /// is already linked to a different key (keys are never reassigned).
    async fn link_external_id(
        &self,
        id: AccountId,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;
}

#[async_trait]
impl<S> AccountStore for Arc<S>
where
    S: AccountStore + ?Sized,
{
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        (**self).create(account).await
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, StoreError> {
        (**self).find_by_email(email).await
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Account>, StoreError> {
        (**self).find_by_external_id(external_id).await
    }

    async fn link_external_id(
        &self,
        id: AccountId,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        (**self).link_external_id(id, external_id, now).await
    }
}
