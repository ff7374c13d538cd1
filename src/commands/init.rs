use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use weather_service::store::{self, ObservationStore};
use weather_service::{config, init_tracing};

/// Execute the init command
///
/// Creates the weather table and its indexes. Safe to repeat.
pub async fn execute(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    println!(
        "{} {}",
        "Initializing storage backend:".yellow(),
        cfg.storage.backend
    );

    let store = store::connect(&cfg.storage).await?;
    store.initialize().await?;

    println!("{}", "✓ Schema is ready".green());
    Ok(())
}
