//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, password oracle, codec, identity provider
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::get,
};
use tower::ServiceBuilder;

use credo_infra::AuthConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AuthConfig) -> anyhow::Result<Router> {
    let services = services::build_services(&config).await?;
    Ok(build_app_with(services))
}

/// Build the router around pre-assembled services.
pub fn build_app_with(services: AppServices) -> Router {
    let auth_state = middleware::AuthState {
        auth: services.auth.clone(),
    };

    // `GET /user` requires a valid access credential; `POST /user` registers.
    let user = get(routes::user::current)
        .route_layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ))
        .post(routes::user::register);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/user", user)
        .merge(routes::auth::router())
        .merge(routes::google::router())
        .layer(ServiceBuilder::new().layer(Extension(Arc::new(services))))
}
