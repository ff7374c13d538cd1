use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use tracing::info;
use weather_service::{config, init_tracing, server};

/// Execute the start command
///
/// Loads configuration, initializes logging from it, and serves until a
/// shutdown signal arrives.
pub async fn execute(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    println!("{}", "Starting weather service...".green());
    info!(config = %config_path.display(), "Starting weather service");

    server::start_server(cfg).await
}
