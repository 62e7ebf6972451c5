//! Session issuer: pairs the credential codec with the refresh ledger.
//!
//! Ledger entries are created only by `issue` and `rotate`. `rotate` consumes a
//! refresh credential exactly once and records its replacement in the same
//! ledger step, so a storage failure leaves the presented credential usable.
//! The ledger's stored expiry is authoritative over the one in the token.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use credo_auth::{CredentialCodec, CredentialKind};

use crate::accounts::{Account, AccountStore};
use crate::error::AuthError;
use crate::ledger::{NewLedgerEntry, RefreshLedger};

/// Label returned with every pair, as in OAuth2 token responses.
pub const TOKEN_TYPE: &str = "bearer";

/// Credential lifetimes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone)]
pub struct SessionIssuer<A, L> {
    codec: CredentialCodec,
    accounts: A,
    ledger: L,
    policy: SessionPolicy,
}

impl<A, L> SessionIssuer<A, L>
where
    A: AccountStore,
    L: RefreshLedger,
{
    pub fn new(codec: CredentialCodec, accounts: A, ledger: L, policy: SessionPolicy) -> Self {
        Self {
            codec,
            accounts,
            ledger,
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Mint an access/refresh pair for `account` and record the refresh nonce.
    pub async fn issue(&self, account: &Account, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let (pair, entry) = self.mint_pair(account, now)?;

        self.ledger
            .record(entry.account_id, &entry.nonce, entry.expires_at, entry.created_at)
            .await
            .map_err(|e| {
                tracing::error!(account_id = %account.id, error = %e, "failed to record refresh credential");
                AuthError::from(e)
            })?;

        tracing::info!(account_id = %account.id, "session issued");
        Ok(pair)
    }

    fn mint_pair(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<(TokenPair, NewLedgerEntry), AuthError> {
        let subject = account.subject();
        let access = self
            .codec
            .mint(&subject, CredentialKind::Access, self.policy.access_ttl, now)?;
        let refresh = self
            .codec
            .mint(&subject, CredentialKind::Refresh, self.policy.refresh_ttl, now)?;

        let nonce = refresh.claims.nonce().cloned().ok_or_else(|| {
            AuthError::Unavailable("refresh credential minted without a nonce".to_string())
        })?;

        let entry = NewLedgerEntry {
            account_id: account.id,
            nonce,
            expires_at: refresh.claims.expires_at,
            created_at: now,
        };
        let pair = TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: TOKEN_TYPE.to_string(),
        };
        Ok((pair, entry))
    }

    /// Exchange a live refresh credential for a new pair, consuming it.
    pub async fn rotate(&self, presented: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let result = self.rotate_inner(presented, now).await;
        if let Err(e) = &result {
            tracing::info!(reason = e.reason(), "refresh rejected");
        }
        result
    }

    async fn rotate_inner(&self, presented: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let claims = self.codec.parse(presented, CredentialKind::Refresh, now)?;
        let nonce = claims.nonce().ok_or(AuthError::Malformed)?;

        let entry = self
            .ledger
            .lookup_active(nonce)
            .await?
            .ok_or(AuthError::RevokedOrUnknown)?;

        if entry.is_expired(now) {
            return Err(AuthError::Expired);
        }

        if entry.account_id != claims.subject.account_id {
            tracing::warn!(
                ledger_account_id = %entry.account_id,
                claimed_account_id = %claims.subject.account_id,
                "refresh credential subject does not match its ledger entry"
            );
            return Err(AuthError::RevokedOrUnknown);
        }

        let account = self
            .accounts
            .find_by_id(entry.account_id)
            .await?
            .ok_or(AuthError::UnknownSubject)?;

        let (pair, replacement) = self.mint_pair(&account, now)?;

        // Only one concurrent presentation of this nonce gets `Some` here.
        if self.ledger.rotate(nonce, &replacement).await?.is_none() {
            tracing::warn!(account_id = %entry.account_id, "refresh credential replayed concurrently");
            return Err(AuthError::RevokedOrUnknown);
        }

        tracing::info!(account_id = %account.id, "refresh credential rotated");
        Ok(pair)
    }

    /// Revoke the ledger entry behind `presented`, if any.
    ///
    /// Invalid, unknown and already-revoked credentials are all accepted
    /// silently; only a storage failure is reported.
    pub async fn revoke_session(&self, presented: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let claims = match self.codec.parse(presented, CredentialKind::Refresh, now) {
            Ok(claims) => claims,
            Err(rejection) => {
                tracing::debug!(reason = rejection.as_str(), "logout with unusable refresh credential");
                return Ok(());
            }
        };

        if let Some(nonce) = claims.nonce() {
            self.ledger.revoke(nonce).await?;
            tracing::info!(account_id = %claims.subject.account_id, "session revoked");
        }
        Ok(())
    }

    /// Resolve a presented access credential to its stored account.
    ///
    /// Never touches the ledger: access credentials are not revocable and rely
    /// on their short lifetime instead.
    pub async fn authenticate_access(
        &self,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        let claims = self
            .codec
            .parse(presented, CredentialKind::Access, now)
            .map_err(|rejection| {
                tracing::debug!(reason = rejection.as_str(), "access credential rejected");
                AuthError::from(rejection)
            })?;

        let account = self
            .accounts
            .find_by_id(claims.subject.account_id)
            .await?
            .ok_or_else(|| {
                tracing::debug!(account_id = %claims.subject.account_id, "access credential for unknown account");
                AuthError::UnknownSubject
            })?;

        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use credo_auth::{Nonce, SigningSecret, Subject};
    use credo_core::{AccountId, Email};

    use crate::accounts::{InMemoryAccountStore, NewAccount};
    use crate::error::StoreError;
    use crate::ledger::{InMemoryRefreshLedger, LedgerEntry};

    type TestIssuer = SessionIssuer<Arc<InMemoryAccountStore>, Arc<InMemoryRefreshLedger>>;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn codec() -> CredentialCodec {
        CredentialCodec::new(&SigningSecret::new("issuer-secret").unwrap())
    }

    async fn setup() -> (TestIssuer, Arc<InMemoryAccountStore>, Arc<InMemoryRefreshLedger>, Account) {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let ledger = Arc::new(InMemoryRefreshLedger::new());
        let account = accounts
            .create(NewAccount {
                email: Email::parse("alice@example.com").unwrap(),
                display_name: "Alice".to_string(),
                password_hash: None,
                external_id: None,
                created_at: t0(),
            })
            .await
            .unwrap();
        let issuer = SessionIssuer::new(codec(), accounts.clone(), ledger.clone(), SessionPolicy::default());
        (issuer, accounts, ledger, account)
    }

    #[tokio::test]
    async fn issue_records_exactly_one_ledger_entry() {
        let (issuer, _, ledger, account) = setup().await;
        let pair = issuer.issue(&account, t0()).await.unwrap();

        assert_eq!(pair.token_type, "bearer");
        let entries = ledger.entries_for(account.id);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].expires_at, t0() + Duration::days(7));
        let claims = codec().parse(&pair.refresh_token, CredentialKind::Refresh, t0()).unwrap();
        assert_eq!(claims.nonce(), Some(&entries[0].nonce));
    }

    #[tokio::test]
    async fn rotate_succeeds_exactly_once() {
        let (issuer, _, ledger, account) = setup().await;
        let pair = issuer.issue(&account, t0()).await.unwrap();

        let rotated = issuer
            .rotate(&pair.refresh_token, t0() + Duration::minutes(1))
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        let again = issuer
            .rotate(&pair.refresh_token, t0() + Duration::minutes(2))
            .await
            .unwrap_err();
        assert_eq!(again, AuthError::RevokedOrUnknown);

        let entries = ledger.entries_for(account.id);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].revoked);
        assert!(!entries[1].revoked);
    }

    #[tokio::test]
    async fn ledger_expiry_is_authoritative() {
        let (issuer, _, ledger, account) = setup().await;

        // Credential claims to be valid for 30 days; the ledger says 1 hour.
        let minted = codec()
            .mint(&account.subject(), CredentialKind::Refresh, Duration::days(30), t0())
            .unwrap();
        ledger
            .record(account.id, minted.claims.nonce().unwrap(), t0() + Duration::hours(1), t0())
            .await
            .unwrap();

        let err = issuer
            .rotate(&minted.token, t0() + Duration::hours(2))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Expired);
    }

    #[tokio::test]
    async fn never_issued_refresh_credential_is_revoked_or_unknown() {
        let (issuer, _, _, account) = setup().await;
        let minted = codec()
            .mint(&account.subject(), CredentialKind::Refresh, Duration::days(7), t0())
            .unwrap();

        assert_eq!(
            issuer.rotate(&minted.token, t0()).await.unwrap_err(),
            AuthError::RevokedOrUnknown
        );
    }

    #[tokio::test]
    async fn access_credential_cannot_rotate() {
        let (issuer, _, _, account) = setup().await;
        let pair = issuer.issue(&account, t0()).await.unwrap();

        assert_eq!(
            issuer.rotate(&pair.access_token, t0()).await.unwrap_err(),
            AuthError::WrongKind
        );
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_blocks_rotation() {
        let (issuer, _, _, account) = setup().await;
        let pair = issuer.issue(&account, t0()).await.unwrap();

        issuer.revoke_session(&pair.refresh_token, t0()).await.unwrap();
        issuer.revoke_session(&pair.refresh_token, t0()).await.unwrap();
        issuer.revoke_session("garbage", t0()).await.unwrap();
        issuer.revoke_session(&pair.access_token, t0()).await.unwrap();

        assert_eq!(
            issuer.rotate(&pair.refresh_token, t0()).await.unwrap_err(),
            AuthError::RevokedOrUnknown
        );
    }

    #[tokio::test]
    async fn authenticate_access_resolves_account() {
        let (issuer, _, _, account) = setup().await;
        let pair = issuer.issue(&account, t0()).await.unwrap();

        let found = issuer.authenticate_access(&pair.access_token, t0()).await.unwrap();
        assert_eq!(found.id, account.id);

        assert_eq!(
            issuer
                .authenticate_access(&pair.access_token, t0() + Duration::minutes(15))
                .await
                .unwrap_err(),
            AuthError::Expired
        );
        assert_eq!(
            issuer.authenticate_access(&pair.refresh_token, t0()).await.unwrap_err(),
            AuthError::WrongKind
        );
    }

    #[tokio::test]
    async fn access_credential_for_missing_account_is_unknown_subject() {
        let (issuer, _, _, _) = setup().await;
        let ghost = Subject::new(AccountId::from_raw(404), Email::parse("ghost@example.com").unwrap());
        let minted = codec()
            .mint(&ghost, CredentialKind::Access, Duration::minutes(15), t0())
            .unwrap();

        assert_eq!(
            issuer.authenticate_access(&minted.token, t0()).await.unwrap_err(),
            AuthError::UnknownSubject
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rotation_has_a_single_winner() {
        let (issuer, _, _, account) = setup().await;
        let issuer = Arc::new(issuer);
        let pair = issuer.issue(&account, t0()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let issuer = issuer.clone();
            let token = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move { issuer.rotate(&token, t0()).await }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e, AuthError::RevokedOrUnknown),
            }
        }
        assert_eq!(ok, 1);
    }

    /// Ledger whose writes fail while `failing` is set, as during a storage outage.
    struct FlakyLedger {
        inner: Arc<InMemoryRefreshLedger>,
        failing: AtomicBool,
    }

    impl FlakyLedger {
        fn outage() -> StoreError {
            StoreError::Unavailable("db blip".to_string())
        }
    }

    #[async_trait]
    impl RefreshLedger for FlakyLedger {
        async fn record(
            &self,
            account_id: AccountId,
            nonce: &Nonce,
            expires_at: DateTime<Utc>,
            created_at: DateTime<Utc>,
        ) -> Result<LedgerEntry, StoreError> {
            if self.failing.swap(false, Ordering::SeqCst) {
                return Err(Self::outage());
            }
            self.inner.record(account_id, nonce, expires_at, created_at).await
        }

        async fn lookup_active(&self, nonce: &Nonce) -> Result<Option<LedgerEntry>, StoreError> {
            self.inner.lookup_active(nonce).await
        }

        async fn revoke(&self, nonce: &Nonce) -> Result<(), StoreError> {
            self.inner.revoke(nonce).await
        }

        async fn rotate(
            &self,
            presented: &Nonce,
            replacement: &NewLedgerEntry,
        ) -> Result<Option<LedgerEntry>, StoreError> {
            if self.failing.swap(false, Ordering::SeqCst) {
                return Err(Self::outage());
            }
            self.inner.rotate(presented, replacement).await
        }
    }

    #[tokio::test]
    async fn storage_failure_during_rotation_leaves_credential_redeemable() {
        let (_, accounts, _, account) = setup().await;
        let inner = Arc::new(InMemoryRefreshLedger::new());
        let ledger = FlakyLedger {
            inner: inner.clone(),
            failing: AtomicBool::new(false),
        };
        let issuer = SessionIssuer::new(codec(), accounts, ledger, SessionPolicy::default());
        let pair = issuer.issue(&account, t0()).await.unwrap();

        issuer.ledger.failing.store(true, Ordering::SeqCst);
        let first = issuer.rotate(&pair.refresh_token, t0()).await.unwrap_err();
        assert_eq!(first, AuthError::Unavailable("db blip".to_string()));
        assert!(first.is_retryable());

        let retried = issuer.rotate(&pair.refresh_token, t0()).await.unwrap();
        assert_ne!(retried.refresh_token, pair.refresh_token);
        assert_eq!(
            issuer.rotate(&pair.refresh_token, t0()).await.unwrap_err(),
            AuthError::RevokedOrUnknown
        );
        assert_eq!(inner.entries_for(account.id).len(), 2);
    }
}
