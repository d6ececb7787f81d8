use anyhow::Result;
use hearth_api::{build_app, AppConfig};
use hearth_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("hearth_api");

    let config = AppConfig::from_env();
    let app = build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(
        bind = %config.bind,
        store = if config.database_url.is_some() { "sqlite" } else { "memory" },
        "hearth meal planning api started"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
