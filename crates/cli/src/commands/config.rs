use serde::Serialize;

use siteops_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Serialize)]
struct ConfigView {
    database: DatabaseView,
    server: ServerView,
    session: SessionView,
    receipts: ReceiptsView,
    auth: AuthView,
    logging: LoggingView,
}

#[derive(Debug, Serialize)]
struct DatabaseView {
    url: String,
    max_connections: u32,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct ServerView {
    bind_address: String,
    portal_port: u16,
    health_check_port: u16,
    graceful_shutdown_secs: u64,
}

#[derive(Debug, Serialize)]
struct SessionView {
    idle_timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct ReceiptsView {
    dir: String,
    base_url: String,
    max_bytes: u64,
}

#[derive(Debug, Serialize)]
struct AuthView {
    gateway_secret: &'static str,
}

#[derive(Debug, Serialize)]
struct LoggingView {
    level: String,
    format: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("configuration issue: {error}"),
    };

    let view = ConfigView {
        database: DatabaseView {
            url: config.database.url.clone(),
            max_connections: config.database.max_connections,
            timeout_secs: config.database.timeout_secs,
        },
        server: ServerView {
            bind_address: config.server.bind_address.clone(),
            portal_port: config.server.portal_port,
            health_check_port: config.server.health_check_port,
            graceful_shutdown_secs: config.server.graceful_shutdown_secs,
        },
        session: SessionView { idle_timeout_secs: config.session.idle_timeout_secs },
        receipts: ReceiptsView {
            dir: config.receipts.dir.display().to_string(),
            base_url: config.receipts.base_url.clone(),
            max_bytes: config.receipts.max_bytes,
        },
        auth: AuthView {
            gateway_secret: if config.auth.gateway_secret.is_some() {
                "<redacted>"
            } else {
                "<unset>"
            },
        },
        logging: LoggingView {
            level: config.logging.level.clone(),
            format: format!("{:?}", config.logging.format).to_ascii_lowercase(),
        },
    };

    serde_json::to_string_pretty(&view)
        .unwrap_or_else(|error| format!("config serialization failed: {error}"))
}
