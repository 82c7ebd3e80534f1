// itemstream server entrypoint
//!
//! Initialization and graceful shutdown live in `lifecycle`; this file only
//! orders the startup steps.

use itemstream_server::{lifecycle, logging};

use anyhow::Result;
use itemstream_configs::ServerConfig;
use lifecycle::{bootstrap, run};
use log::info;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[actix_web::main]
async fn main() -> Result<()> {
    // Config path: first argument, then ITEMSTREAM_CONFIG, then ./config.toml
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ITEMSTREAM_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let mut config = if Path::new(&config_path).exists() {
        match ServerConfig::from_file(&config_path) {
            Ok(cfg) => {
                eprintln!("Loaded config from: {}", config_path);
                cfg
            },
            Err(e) => {
                eprintln!("FATAL: Failed to load {}: {:#}", config_path, e);
                std::process::exit(1);
            },
        }
    } else {
        eprintln!("No config at {}, using defaults", config_path);
        ServerConfig::default()
    };

    if let Err(e) = config.apply_env_overrides() {
        eprintln!("FATAL: Invalid environment override: {:#}", e);
        std::process::exit(1);
    }

    // Logging before any other side effects
    logging::init_logging(&config.logging)?;

    info!(
        "itemstream server v{} ({} @ {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("GIT_BRANCH")
    );
    info!("Host: {}  Port: {}", config.server.host, config.server.port);
    info!(
        "WebSocket path: {} (public: {})",
        config.websocket.path, config.websocket.public
    );

    let components = bootstrap(&config).await?;

    // Run HTTP server until termination signal is received
    run(&config, components).await
}
