use std::sync::Arc;

use axum::{Extension, Json, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use credo_infra::{AccountSummary, Registration};

use crate::app::dto::RegisterRequest;
use crate::app::errors::auth_error_to_response;
use crate::app::services::AppServices;
use crate::context::AccountContext;

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RegisterRequest>,
) -> axum::response::Response {
    let registration = Registration {
        email: &body.email,
        password: &body.password,
        display_name: body.name.as_deref(),
    };

    match services.auth.register(registration, Utc::now()).await {
        Ok(result) => (StatusCode::CREATED, Json(result)).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn current(Extension(ctx): Extension<AccountContext>) -> Json<AccountSummary> {
    Json(ctx.summary().clone())
}
