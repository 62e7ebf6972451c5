use credo_infra::{Account, AccountSummary};

/// Authenticated account for a request.
///
/// Inserted by the access guard; present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    account: AccountSummary,
}

impl AccountContext {
    pub fn new(account: &Account) -> Self {
        Self {
            account: account.summary(),
        }
    }

    pub fn summary(&self) -> &AccountSummary {
        &self.account
    }
}
