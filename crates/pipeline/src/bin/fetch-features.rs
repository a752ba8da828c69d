//! Fetch Features - pulls history and refreshes stored feature rows

use aq_fetcher::{current_hour, HttpObservationSource};
use clap::Parser;
use pipeline::{init_logging, run_fetch, PipelineConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use storage::Repository;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(version, about = "Fetch pollution and weather history and store feature rows")]
struct Args {
    /// Pipeline configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = PipelineConfig::load(&args.config)?;
    init_logging(&config.logging);

    info!("=== AQI Fetch v{} ===", env!("CARGO_PKG_VERSION"));

    let source = HttpObservationSource::new(&config.fetch)?;
    let repo = Repository::connect(&config.storage).await?;
    let summary = run_fetch(&config, &source, &repo, current_hour())
        .await
        .inspect_err(|e| error!("Run failed: {}", e))?;

    info!(
        "{} new feature rows ({} pollution, {} weather records stored)",
        summary.feature_rows_stored, summary.pollution_stored, summary.weather_stored
    );
    Ok(())
}
