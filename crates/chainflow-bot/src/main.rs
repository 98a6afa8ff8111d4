//! chainflow - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

use chainflow_bot::config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};

/// Run a batch of on-chain tasks across many wallets
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via CHAINFLOW_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Batch file with wallets and tasks
    #[arg(short, long)]
    batch: String,

    /// Simulate the chain in memory; nothing is broadcast
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    chainflow_telemetry::init_logging()?;

    info!("Starting chainflow v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > CHAINFLOW_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "Loading configuration");
    let mut config = chainflow_bot::AppConfig::load(&config_path)?;
    config.dry_run |= args.dry_run;
    info!(chain_id = config.chain_id, dry_run = config.dry_run, "Configuration loaded");

    let batch = chainflow_bot::BatchFile::from_file(&args.batch)?.into_batch(config.dry_run)?;
    info!(
        wallets = batch.wallets.len(),
        tasks = batch.tasks.len(),
        "Batch loaded"
    );

    let report = chainflow_bot::Application::new(config, batch).run().await?;
    println!("{}", chainflow_bot::format_report(&report));

    Ok(())
}
