use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use credo_core::{AccountId, Email};

use super::{Account, AccountStore, NewAccount};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Accounts {
    next_id: i64,
    rows: BTreeMap<AccountId, Account>,
}

/// In-memory account store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    inner: RwLock<Accounts>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("account store lock poisoned".to_string())
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;

        if guard.rows.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict(format!("email {} already registered", account.email)));
        }
        if let Some(key) = &account.external_id {
            if guard.rows.values().any(|a| a.external_id.as_deref() == Some(key.as_str())) {
                return Err(StoreError::Conflict("external identity already linked".to_string()));
            }
        }

        guard.next_id += 1;
        let id = AccountId::from_raw(guard.next_id);
        let stored = Account {
            id,
            email: account.email,
            display_name: account.display_name,
            password_hash: account.password_hash,
            external_id: account.external_id,
            created_at: account.created_at,
            updated_at: account.created_at,
        };
        guard.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        Ok(guard.rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, StoreError> {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        Ok(guard.rows.values().find(|a| &a.email == email).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Account>, StoreError> {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        Ok(guard
            .rows
            .values()
            .find(|a| a.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn link_external_id(
        &self,
        id: AccountId,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;

        if guard
            .rows
            .values()
            .any(|a| a.id != id && a.external_id.as_deref() == Some(external_id))
        {
            return Err(StoreError::Conflict(
                "external identity already linked to another account".to_string(),
            ));
        }

        let account = guard
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;

        match account.external_id.as_deref() {
            Some(existing) if existing == external_id => {}
            Some(_) => {
                return Err(StoreError::Conflict(
                    "account already linked to a different external identity".to_string(),
                ));
            }
            None => {
                account.external_id = Some(external_id.to_string());
                account.updated_at = now;
            }
        }

        Ok(account.clone())
    }
}
