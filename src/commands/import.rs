use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tracing::warn;
use weather_service::store::{self, ObservationStore};
use weather_service::{config, init_tracing, observation::Observation};

/// Execute the import command
///
/// Reads a JSON array of observations, drops implausible readings and
/// appends the rest as one batch.
pub async fn execute(config_path: &Path, file: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let batch = parse_batch(&raw).with_context(|| format!("invalid JSON in {}", file.display()))?;

    let received = batch.len();
    let (kept, dropped): (Vec<Observation>, Vec<Observation>) =
        batch.into_iter().partition(Observation::is_plausible);
    if !dropped.is_empty() {
        warn!(dropped = dropped.len(), received, "Implausible observations skipped");
    }

    let store = store::connect(&cfg.storage).await?;
    store.initialize().await?;
    let stored = store.append_batch(&kept).await?;

    println!("{}", "✓ Import complete".green());
    println!("  Received: {}", received);
    println!("  Stored:   {}", stored);
    println!("  Dropped:  {}", dropped.len());
    Ok(())
}

fn parse_batch(raw: &str) -> Result<Vec<Observation>> {
    Ok(serde_json::from_str(raw)?)
}
