//! Refresh-credential revocation ledger.
//!
//! The ledger is the only shared mutable state in the credential lifecycle.
//! Every issued refresh credential gets exactly one entry, keyed by its nonce.
//! Entries are never deleted and `revoked` only ever flips from `false` to
//! `true`.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use credo_auth::Nonce;
use credo_core::{AccountId, LedgerEntryId};

use crate::error::StoreError;

pub use in_memory::InMemoryRefreshLedger;
pub use postgres::PostgresRefreshLedger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub account_id: AccountId,
    pub nonce: Nonce,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
}

/// Insert shape for the entry that replaces a rotated one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub account_id: AccountId,
    pub nonce: Nonce,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// The ledger does not purge on read; callers check expiry themselves.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait RefreshLedger: Send + Sync {
    /// Insert a new entry. A duplicate nonce is a `Conflict` and is never retried.
    async fn record(
        &self,
        account_id: AccountId,
        nonce: &Nonce,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<LedgerEntry, StoreError>;

    /// The entry for `nonce` if it exists and is not revoked.
    async fn lookup_active(&self, nonce: &Nonce) -> Result<Option<LedgerEntry>, StoreError>;

    /// Mark `nonce` revoked. No-op when absent or already revoked.
    async fn revoke(&self, nonce: &Nonce) -> Result<(), StoreError>;

    /// Revoke `presented` and record `replacement` as one atomic step.
    ///
    /// `None` when `presented` is absent or already revoked; only one of
    /// several concurrent callers presenting the same nonce gets `Some`. On
    /// any error neither change is applied, so `presented` stays redeemable.
    async fn rotate(
        &self,
        presented: &Nonce,
        replacement: &NewLedgerEntry,
    ) -> Result<Option<LedgerEntry>, StoreError>;
}

#[async_trait]
impl<S> RefreshLedger for Arc<S>
where
    S: RefreshLedger + ?Sized,
{
    async fn record(
        &self,
        account_id: AccountId,
        nonce: &Nonce,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<LedgerEntry, StoreError> {
        (**self).record(account_id, nonce, expires_at, created_at).await
    }

    async fn lookup_active(&self, nonce: &Nonce) -> Result<Option<LedgerEntry>, StoreError> {
        (**self).lookup_active(nonce).await
    }

    async fn revoke(&self, nonce: &Nonce) -> Result<(), StoreError> {
        (**self).revoke(nonce).await
    }

    async fn rotate(
        &self,
        presented: &Nonce,
        replacement: &NewLedgerEntry,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        (**self).rotate(presented, replacement).await
    }
}
