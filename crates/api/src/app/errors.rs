use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde_json::json;

use credo_infra::AuthError;

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match &err {
        AuthError::Malformed
        | AuthError::WrongKind
        | AuthError::Expired
        | AuthError::RevokedOrUnknown
        | AuthError::UnknownSubject
        | AuthError::BadCredentials => with_bearer_challenge(json_error(
            StatusCode::UNAUTHORIZED,
            err.reason(),
            err.to_string(),
        )),
        AuthError::Conflict(msg) => json_error(StatusCode::CONFLICT, err.reason(), msg.clone()),
        AuthError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, err.reason(), msg.clone()),
        AuthError::Unavailable(detail) => {
            tracing::error!(detail = %detail, "request failed on an unavailable dependency");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                err.reason(),
                "service temporarily unavailable",
            )
        }
    }
}

/// The access guard's single answer, whatever the underlying reason.
pub fn not_authenticated() -> axum::response::Response {
    with_bearer_challenge(json_error(
        StatusCode::UNAUTHORIZED,
        "not_authenticated",
        "Could not validate credentials",
    ))
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

fn with_bearer_challenge(mut response: axum::response::Response) -> axum::response::Response {
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Bearer"));
    response
}
