mod bootstrap;
mod health;
pub mod portal;

use std::sync::Arc;

use anyhow::Result;
use siteops_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use siteops_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let config = Arc::new(app.config);

    health::spawn(&config.server.bind_address, config.server.health_check_port, app.db_pool.clone())
        .await?;

    let address = format!("{}:{}", config.server.bind_address, config.server.portal_port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let router = portal::router(app.db_pool.clone(), config.clone());

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "siteops-server portal started"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "siteops-server portal stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
