use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use credo_auth::Nonce;
use credo_core::{AccountId, LedgerEntryId};

use super::{LedgerEntry, NewLedgerEntry, RefreshLedger};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Entries {
    next_id: i64,
    by_nonce: HashMap<Nonce, LedgerEntry>,
}

/// In-memory refresh ledger for tests/dev.
///
/// `rotate` checks, flips and inserts under a single write lock, which gives
/// the same guarantee as the transaction in the Postgres ledger.
#[derive(Debug, Default)]
pub struct InMemoryRefreshLedger {
    inner: RwLock<Entries>,
}

impl InMemoryRefreshLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries owned by `account_id`, oldest first (audit/test helper).
    pub fn entries_for(&self, account_id: AccountId) -> Vec<LedgerEntry> {
        let Ok(guard) = self.inner.read() else {
            return Vec::new();
        };
        let mut entries: Vec<_> = guard
            .by_nonce
            .values()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.id);
        entries
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("refresh ledger lock poisoned".to_string())
}

#[async_trait]
impl RefreshLedger for InMemoryRefreshLedger {
    async fn record(
        &self,
        account_id: AccountId,
        nonce: &Nonce,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<LedgerEntry, StoreError> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        if guard.by_nonce.contains_key(nonce) {
            return Err(StoreError::Conflict("refresh nonce already recorded".to_string()));
        }

        guard.next_id += 1;
        let entry = LedgerEntry {
            id: LedgerEntryId::from_raw(guard.next_id),
            account_id,
            nonce: nonce.clone(),
            expires_at,
            created_at,
            revoked: false,
        };
        guard.by_nonce.insert(nonce.clone(), entry.clone());
        Ok(entry)
    }

    async fn lookup_active(&self, nonce: &Nonce) -> Result<Option<LedgerEntry>, StoreError> {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        Ok(guard.by_nonce.get(nonce).filter(|e| !e.revoked).cloned())
    }

    async fn revoke(&self, nonce: &Nonce) -> Result<(), StoreError> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        if let Some(entry) = guard.by_nonce.get_mut(nonce) {
            entry.revoked = true;
        }
        Ok(())
    }

    async fn rotate(
        &self,
        presented: &Nonce,
        replacement: &NewLedgerEntry,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;

        if !guard.by_nonce.get(presented).is_some_and(|e| !e.revoked) {
            return Ok(None);
        }
        // Checked before any mutation so a collision leaves `presented` active.
        if guard.by_nonce.contains_key(&replacement.nonce) {
            return Err(StoreError::Conflict("refresh nonce already recorded".to_string()));
        }

        if let Some(entry) = guard.by_nonce.get_mut(presented) {
            entry.revoked = true;
        }

        guard.next_id += 1;
        let entry = LedgerEntry {
            id: LedgerEntryId::from_raw(guard.next_id),
            account_id: replacement.account_id,
            nonce: replacement.nonce.clone(),
            expires_at: replacement.expires_at,
            created_at: replacement.created_at,
            revoked: false,
        };
        guard.by_nonce.insert(entry.nonce.clone(), entry.clone());
        Ok(Some(entry))
    }
}
