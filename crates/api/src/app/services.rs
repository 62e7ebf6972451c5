//! Infrastructure wiring: stores, password oracle, codec and identity provider.

use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;

use credo_auth::{CredentialCodec, OAuthStateSigner};
use credo_infra::{
    Argon2PasswordOracle, AuthConfig, AuthService, GoogleIdentityProvider, IdentityProvider,
    InMemoryAccountStore, InMemoryRefreshLedger, PasswordOracle, PostgresAccountStore,
    PostgresRefreshLedger,
    db,
    service::{SharedAccounts, SharedLedger},
};

/// How long a provider login may take between redirect and callback.
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub google: Option<Arc<dyn IdentityProvider>>,
    pub oauth_state: OAuthStateSigner,
}

impl AppServices {
    /// Assemble services from already-built parts (tests, custom providers).
    pub fn new(
        config: &AuthConfig,
        accounts: SharedAccounts,
        ledger: SharedLedger,
        passwords: Arc<dyn PasswordOracle>,
        google: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let codec = CredentialCodec::new(&config.signing_secret);
        let auth = AuthService::new(codec, accounts, ledger, passwords, config.policy);

        Self {
            auth: Arc::new(auth),
            google,
            oauth_state: OAuthStateSigner::new(
                &config.signing_secret,
                Duration::minutes(OAUTH_STATE_TTL_MINUTES),
            ),
        }
    }
}

pub async fn build_services(config: &AuthConfig) -> anyhow::Result<AppServices> {
    let (accounts, ledger): (SharedAccounts, SharedLedger) = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url).await.context("failed to connect to postgres")?;
            db::apply_schema(&pool).await.context("failed to apply schema")?;
            tracing::info!("using postgres account store and refresh ledger");
            (
                Arc::new(PostgresAccountStore::new(pool.clone())),
                Arc::new(PostgresRefreshLedger::new(pool)),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set; accounts and sessions are kept in memory");
            (
                Arc::new(InMemoryAccountStore::new()),
                Arc::new(InMemoryRefreshLedger::new()),
            )
        }
    };

    let google: Option<Arc<dyn IdentityProvider>> = match &config.google {
        Some(google) => {
            let provider = GoogleIdentityProvider::new(google.clone())
                .context("failed to build google identity provider")?;
            Some(Arc::new(provider))
        }
        None => None,
    };

    Ok(AppServices::new(
        config,
        accounts,
        ledger,
        Arc::new(Argon2PasswordOracle::new()),
        google,
    ))
}
