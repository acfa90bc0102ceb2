use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sheetserver::api_router::build_router;
use sheetserver::config::AppConfig;
use sheetserver::shared::error::set_production_mode;
use sheetserver::shared::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    set_production_mode(config.is_production());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::get_or_init(config).await?;
    sheetserver::shared::utils::run_migrations(&state.conn)?;
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");
    axum::serve(listener, router)
        .await
        .context("server exited with error")?;
    Ok(())
}
