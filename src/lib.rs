pub mod api;
pub mod config;
pub mod core_state;
pub mod crypto;
pub mod db;
pub mod models;
pub mod storage;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Load configuration, prepare the database, then serve until Ctrl-C.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env().context("Invalid configuration")?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    db::open_database(&config.database_path).context("Database initialization failed")?;
    tracing::info!(path = %config.database_path.display(), "Database ready");

    let addr = config.addr;
    let core = Arc::new(core_state::CoreState::new(config)?);
    core.bootstrap_admin()?;

    let mut server = api::start_server_on(core, addr)
        .await
        .map_err(anyhow::Error::msg)?;
    tracing::info!(addr = %server.addr, "Listening");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    server.shutdown();
    Ok(())
}
