//! Train Model - fits candidates on stored feature rows

use clap::Parser;
use pipeline::{init_logging, run_train, PipelineConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use storage::Repository;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(version, about = "Train candidate models and register the best")]
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

    info!("=== AQI Train v{} ===", env!("CARGO_PKG_VERSION"));

    let repo = Repository::connect(&config.storage).await?;
    let summary = run_train(&config, &repo)
        .await
        .inspect_err(|e| error!("Run failed: {}", e))?;

    info!(
        "Registered {} models as v{}; best {} with RMSE {:.4}",
        summary.models_stored, summary.version, summary.best, summary.rmse
    );
    Ok(())
}
