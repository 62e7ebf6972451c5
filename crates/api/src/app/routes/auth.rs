use std::sync::Arc;

use axum::{Extension, Form, Json, Router, response::IntoResponse, routing::post};
use chrono::Utc;

use crate::app::dto::{LoginRequest, MessageResponse, PasswordGrantForm, RefreshTokenRequest};
use crate::app::errors::auth_error_to_response;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/token", post(token))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    match services.auth.login(&body.username, &body.password, Utc::now()).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

/// Password grant for OAuth2 clients; answers with the bare token pair.
async fn token(
    Extension(services): Extension<Arc<AppServices>>,
    Form(form): Form<PasswordGrantForm>,
) -> axum::response::Response {
    if let Some(grant) = form.grant_type.as_deref() {
        if grant != "password" {
            return crate::app::errors::json_error(
                axum::http::StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                format!("grant type '{grant}' is not supported"),
            );
        }
    }

    match services.auth.login(&form.username, &form.password, Utc::now()).await {
        Ok(result) => Json(result.tokens).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RefreshTokenRequest>,
) -> axum::response::Response {
    match services.auth.refresh(&body.refresh_token, Utc::now()).await {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RefreshTokenRequest>,
) -> axum::response::Response {
    match services.auth.logout(&body.refresh_token, Utc::now()).await {
        Ok(()) => Json(MessageResponse {
            message: "Successfully logged out",
        })
        .into_response(),
        Err(e) => auth_error_to_response(e),
    }
}
