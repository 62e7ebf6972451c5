use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use credo_infra::AuthService;

use crate::app::errors::not_authenticated;
use crate::context::AccountContext;

#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<AuthService>,
}

/// Access guard: every rejection reason collapses to one 401 at the boundary.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(|_| not_authenticated())?;

    let account = match state.auth.authenticate(token, Utc::now()).await {
        Ok(account) => account,
        Err(e) if e.is_credential_rejection() => {
            tracing::debug!(reason = e.reason(), "access guard rejected request");
            return Err(not_authenticated());
        }
        Err(e) => return Err(crate::app::errors::auth_error_to_response(e)),
    };

    req.extensions_mut().insert(AccountContext::new(&account));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
