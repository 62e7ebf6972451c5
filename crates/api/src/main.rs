use anyhow::Context;

use credo_infra::AuthConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    credo_observability::init();

    let config = AuthConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr.clone();

    let app = credo_api::app::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
