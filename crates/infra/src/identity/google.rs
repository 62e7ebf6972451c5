//! Google OpenID Connect client.
//!
//! Flow: consent URL → callback with `code` → token endpoint → userinfo
//! endpoint (read with the returned access token over TLS).

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

use credo_core::Email;

use super::{ExternalAssertion, IdentityProvider, ProviderError};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct GoogleIdentityProvider {
    config: GoogleConfig,
    client: reqwest::Client,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

impl GoogleIdentityProvider {
    pub fn new(config: GoogleConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            config,
            client,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", state),
        ];
        match Url::parse_with_params(&self.auth_url, &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(error = %e, "google authorization endpoint is not a valid URL");
                self.auth_url.clone()
            }
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalAssertion, ProviderError> {
        let form = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let res = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = res.status();
        if status.is_client_error() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("{status}: {body}")));
        }
        if !status.is_success() {
            return Err(ProviderError::Transport(format!("token endpoint answered {status}")));
        }

        let tokens: TokenResponse = res
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let res = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ProviderError::Transport(format!(
                "userinfo endpoint answered {}",
                res.status()
            )));
        }

        let info: UserInfo = res
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let email = info
            .email
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidResponse("userinfo carries no email".to_string()))
            .and_then(|raw| {
                Email::parse(raw).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
            })?;

        if info.sub.is_empty() {
            return Err(ProviderError::InvalidResponse("userinfo carries no subject".to_string()));
        }

        Ok(ExternalAssertion {
            subject: info.sub,
            email,
            email_verified: info.email_verified,
            name: info.name,
        })
    }
}
