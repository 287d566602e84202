mod config;
mod data;
mod engine;
mod monitoring;

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

use config::Config;
use data::cache::SourceCache;
use data::sources::gather_inputs;
use monitoring::logger::CsvLogger;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Water arbitrage engine starting...");

    // Load configuration (validated before any run starts)
    tracing::info!("Loading configuration...");
    let config = Config::load("config.toml")?;

    tracing::info!("Minimum margin: {:.2}%", config.engine.min_margin_percent);
    tracing::info!("Headline size: top {}", config.engine.top_k);
    tracing::info!("CSV logging: {}", config.monitoring.csv_logging);

    let cache = SourceCache::new(Duration::from_secs(config.sources.cache_ttl_secs));

    // Gather the three input batches concurrently; a failed source degrades
    // the run instead of failing it.
    let batches = gather_inputs(
        read_payload(config.sources.climate_path.clone()),
        read_payload(config.sources.market_path.clone()),
        read_payload(config.sources.price_series_path.clone()),
        &config.sources,
        &cache,
    )
    .await;

    let output = engine::run(&batches, &config.engine);

    for warning in &output.warnings {
        tracing::warn!("{}", warning);
    }

    if config.monitoring.csv_logging {
        let logger = CsvLogger::new(config.monitoring.csv_log_path.clone())?;
        let timestamp = output.report.timestamp.to_rfc3339();
        for kind in &batches.degraded {
            logger.log_event(&timestamp, &format!("degraded source: {}", kind))?;
        }
        logger.log_report(&output.report)?;
    }

    println!("{}", serde_json::to_string_pretty(&output.report)?);

    tracing::info!(
        "Run complete: {} opportunities, {} in headline",
        output.report.opportunities.len(),
        output.report.narrative_brief.top_opportunities.len()
    );

    Ok(())
}

/// Read one collaborator payload from disk. The network retrievers that
/// would normally produce these files live outside this system.
async fn read_payload(path: String) -> Result<Value> {
    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read payload file: {}", path))?;
    let payload = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse payload file: {}", path))?;
    Ok(payload)
}
