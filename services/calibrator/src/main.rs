//! Ensemble calibration runner.
//!
//! Reads a dataset, applies the calibration pipeline described in a YAML
//! file and writes the calibrated (and optionally downscaled) dataset.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use calibrator::{load_pipeline_config, read_dataset, read_geometry, write_dataset, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "calibrator")]
#[command(about = "Calibrate and downscale ensemble forecasts")]
struct Args {
    /// Pipeline configuration file path
    #[arg(short, long, env = "CALIBRATION_CONFIG")]
    config: PathBuf,

    /// Input dataset (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Output dataset (JSON)
    #[arg(short, long)]
    output: PathBuf,

    /// Target grid for downscaling (JSON geometry)
    #[arg(short, long)]
    target_grid: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!(config = ?args.config, "Starting ensemble calibrator");
    let started = Instant::now();

    let config = load_pipeline_config(&args.config)?;
    if let Some(threads) = config.num_threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }
    info!(
        steps = config.steps.len(),
        threads = rayon::current_num_threads(),
        "Loaded configuration"
    );

    let base_dir = args.config.parent();
    let pipeline = Pipeline::from_config(&config, base_dir)?;
    let target = args.target_grid.as_ref().map(read_geometry).transpose()?;
    pipeline.check_target(target.as_ref())?;

    let dataset = read_dataset(&args.input)?;
    info!(
        input = ?args.input,
        shape = ?dataset.shape(),
        variables = ?dataset.variables().map(|v| v.to_string()).collect::<Vec<_>>(),
        "Loaded dataset"
    );

    let outcome = pipeline.run(dataset, target)?;

    write_dataset(&args.output, &outcome.dataset)?;
    info!(
        output = ?args.output,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Calibration finished"
    );

    Ok(())
}
