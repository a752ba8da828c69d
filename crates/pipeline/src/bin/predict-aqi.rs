//! Predict AQI - forecasts the coming days with the registered model

use aq_fetcher::{current_hour, HttpObservationSource};
use clap::Parser;
use pipeline::{init_logging, run_predict, PipelineConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use storage::Repository;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(version, about = "Forecast PM2.5 and AQI from the weather forecast")]
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

    info!("=== AQI Predict v{} ===", env!("CARGO_PKG_VERSION"));

    let source = HttpObservationSource::weather_only(&config.fetch)?;
    let repo = Repository::connect(&config.storage).await?;
    let summary = run_predict(&config, &source, &repo, current_hour())
        .await
        .inspect_err(|e| error!("Run failed: {}", e))?;

    info!(
        "{} forecasts stored for {} .. {} (model v{})",
        summary.forecasts_stored, summary.first_hour, summary.last_hour, summary.model_version
    );
    Ok(())
}
