//! Configuration loading and representation.
//!
//! Everything is read from the process environment once at startup. The
//! signing secret ends up in an immutable [`SigningSecret`] that is shared
//! read-only for the life of the process.

use chrono::Duration;
use thiserror::Error;

use credo_auth::SigningSecret;

use crate::identity::GoogleConfig;
use crate::session::SessionPolicy;

const DEV_SECRET: &str = "dev-secret";

/// Upper bounds for the configured lifetimes.
const MAX_ACCESS_TTL_MINUTES: i64 = 24 * 60;
const MAX_REFRESH_TTL_DAYS: i64 = 365;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be an integer between 1 and {max}, got {value:?}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        max: i64,
    },

    #[error("{0} must be set in release builds")]
    Missing(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("google login needs GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REDIRECT_URL; missing {0}")]
    PartialGoogle(&'static str),
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub signing_secret: SigningSecret,
    pub policy: SessionPolicy,
    /// `None` selects the in-memory stores.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub google: Option<GoogleConfig>,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let secret = signing_secret_or_dev_default(get("JWT_SECRET"), cfg!(debug_assertions))?;
        let signing_secret =
            SigningSecret::new(secret.into_bytes()).map_err(|_| ConfigError::Empty("JWT_SECRET"))?;

        let access_minutes = bounded(
            get("ACCESS_TOKEN_TTL_MINUTES"),
            "ACCESS_TOKEN_TTL_MINUTES",
            15,
            MAX_ACCESS_TTL_MINUTES,
        )?;
        let refresh_days = bounded(
            get("REFRESH_TOKEN_TTL_DAYS"),
            "REFRESH_TOKEN_TTL_DAYS",
            7,
            MAX_REFRESH_TTL_DAYS,
        )?;

        let google = match (
            get("GOOGLE_CLIENT_ID"),
            get("GOOGLE_CLIENT_SECRET"),
            get("GOOGLE_REDIRECT_URL"),
        ) {
            (None, None, None) => None,
            (Some(client_id), Some(client_secret), Some(redirect_url)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            (None, _, _) => return Err(ConfigError::PartialGoogle("GOOGLE_CLIENT_ID")),
            (_, None, _) => return Err(ConfigError::PartialGoogle("GOOGLE_CLIENT_SECRET")),
            (_, _, None) => return Err(ConfigError::PartialGoogle("GOOGLE_REDIRECT_URL")),
        };

        Ok(Self {
            signing_secret,
            policy: SessionPolicy {
                access_ttl: Duration::minutes(access_minutes),
                refresh_ttl: Duration::days(refresh_days),
            },
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            google,
        })
    }

    /// In-memory configuration with default lifetimes (tests/dev).
    pub fn for_secret(secret: SigningSecret) -> Self {
        Self {
            signing_secret: secret,
            policy: SessionPolicy::default(),
            database_url: None,
            bind_addr: "127.0.0.1:0".to_string(),
            google: None,
        }
    }
}

/// The dev default is only accepted in debug builds.
fn signing_secret_or_dev_default(
    configured: Option<String>,
    allow_dev_default: bool,
) -> Result<String, ConfigError> {
    match configured {
        Some(secret) => Ok(secret),
        None if allow_dev_default => {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            Ok(DEV_SECRET.to_string())
        }
        None => Err(ConfigError::Missing("JWT_SECRET")),
    }
}

fn bounded(
    raw: Option<String>,
    name: &'static str,
    default: i64,
    max: i64,
) -> Result<i64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => match value.parse::<i64>() {
            Ok(n) if (1..=max).contains(&n) => Ok(n),
            _ => Err(ConfigError::InvalidNumber { name, value, max }),
        },
    }
}
