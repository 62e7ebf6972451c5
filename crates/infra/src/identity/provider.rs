use async_trait::async_trait;
use thiserror::Error;

use super::ExternalAssertion;
use crate::error::AuthError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("identity provider request failed: {0}")]
    Transport(String),

    #[error("identity provider rejected the exchange: {0}")]
    Rejected(String),

    #[error("identity provider returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for AuthError {
    fn from(value: ProviderError) -> Self {
        match value {
            // The code was refused (expired, replayed, wrong client): the user must retry login.
            ProviderError::Rejected(_) => AuthError::BadCredentials,
            other => AuthError::Unavailable(other.to_string()),
        }
    }
}

/// Redirect-based authorization-code exchange with a third-party identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short provider tag for logs and routes (e.g. `"google"`).
    fn name(&self) -> &'static str;

    /// Where to send the user agent to start the login, carrying `state` through.
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization code for the provider's identity claims.
    async fn exchange_code(&self, code: &str) -> Result<ExternalAssertion, ProviderError>;
}
