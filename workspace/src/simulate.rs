//! Run a simulation described by a JSON configuration file.

use std::path::PathBuf;
use clap::Parser;
use trotter2d::SimulationConfig;
use lib::{ init_logging, run_config };

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a Trotter-Suzuki simulation from a config file")]
struct Args {
    /// Path to the JSON configuration
    config: PathBuf,

    /// Override the number of workers
    #[arg(long)]
    workers: Option<usize>,

    /// Override the kernel backend
    #[arg(long)]
    kernel: Option<String>,

    /// Output directory for density snapshots and the summary
    #[arg(long, default_value = "output")]
    out: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log);
    let mut config = SimulationConfig::from_path(&args.config)?;
    if let Some(workers) = args.workers {
        config.workers = workers;
        config.process_grid = None;
    }
    if let Some(kernel) = args.kernel { config.kernel = kernel; }
    let summaries = run_config(&config, Some(&args.out))?;
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
