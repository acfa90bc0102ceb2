use crate::config::AppConfig;
use crate::shared::utils::{create_conn, DbPool};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

static APP_STATE: OnceCell<Arc<AppState>> = OnceCell::const_new();

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
}

impl AppState {
    /// One-time process initialization. Safe under concurrent first calls:
    /// every caller awaits the same initialization and receives the same
    /// state, so the connection pool is built exactly once.
    pub async fn get_or_init(config: AppConfig) -> Result<Arc<AppState>> {
        APP_STATE
            .get_or_try_init(|| async {
                info!("initializing shared state and database pool");
                let conn = create_conn(&config.database_url)
                    .context("failed to create database pool")?;
                Ok::<_, anyhow::Error>(Arc::new(AppState { conn, config }))
            })
            .await
            .cloned()
    }

    /// True when a pooled connection can be checked out right now.
    pub fn database_connected(&self) -> bool {
        self.conn.get().is_ok()
    }
}
