//! Redirect-based login with Google.
//!
//! Both routes answer 404 when no provider is configured.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::get,
};
use chrono::Utc;

use credo_auth::StateError;
use credo_infra::AuthError;

use crate::app::dto::ProviderCallbackQuery;
use crate::app::errors::{auth_error_to_response, json_error};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/auth/google/login", get(login))
        .route("/auth/google/callback", get(callback))
}

fn provider_not_configured() -> axum::response::Response {
    json_error(
        StatusCode::NOT_FOUND,
        "provider_not_configured",
        "google login is not configured",
    )
}

async fn login(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let Some(provider) = services.google.as_ref() else {
        return provider_not_configured();
    };

    let state = match services.oauth_state.issue(Utc::now()) {
        Ok(state) => state,
        Err(e) => return auth_error_to_response(AuthError::Unavailable(e.to_string())),
    };

    Redirect::to(&provider.authorization_url(&state)).into_response()
}

async fn callback(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ProviderCallbackQuery>,
) -> axum::response::Response {
    let Some(provider) = services.google.as_ref() else {
        return provider_not_configured();
    };

    if let Some(error) = query.error {
        tracing::info!(provider = provider.name(), error = %error, "provider refused login");
        return auth_error_to_response(AuthError::BadCredentials);
    }

    let (Some(code), Some(state)) = (query.code, query.state) else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "code and state are required",
        );
    };

    let now = Utc::now();
    match services.oauth_state.verify(&state, now) {
        Ok(()) => {}
        Err(StateError::Expired) => {
            return json_error(StatusCode::UNAUTHORIZED, "state_expired", "login attempt has expired");
        }
        Err(_) => {
            return json_error(StatusCode::UNAUTHORIZED, "invalid_state", "login state did not verify");
        }
    }

    let assertion = match provider.exchange_code(&code).await {
        Ok(assertion) => assertion,
        Err(e) => {
            tracing::warn!(provider = provider.name(), error = %e, "code exchange failed");
            return auth_error_to_response(e.into());
        }
    };

    match services.auth.federated_login(&assertion, now).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}
