//! Particle in a box: a Gaussian wavepacket with momentum `(0.4, 0.4)`
//! released from `(180, 300)` in a closed `640 × 640` domain.

use std::path::PathBuf;
use clap::Parser;
use trotter2d::{
    config::{ InitialState, ParticleConfig, PotentialConfig },
    Geometry,
    SimulationConfig,
};
use lib::{ init_logging, run_config };

#[derive(Parser, Debug)]
#[command(author, version, about = "Gaussian wavepacket in a box")]
struct Args {
    /// Grid points per axis
    #[arg(long, default_value_t = 640)]
    dim: usize,

    /// Steps per snapshot
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Number of snapshots
    #[arg(long, default_value_t = 10)]
    snapshots: usize,

    /// Number of workers
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Kernel backend: cpu | parallel
    #[arg(long, default_value = "cpu")]
    kernel: String,

    /// Output directory for density snapshots (none if omitted)
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_logging("info");
    let args = Args::parse();
    let length = args.dim as f64;
    let config = SimulationConfig {
        geometry: Geometry::square(args.dim, length, length),
        particle: ParticleConfig { mass: 1.0, coupling: 0.0 },
        potential: PotentialConfig::Constant { value: 0.0 },
        initial_state: Some(InitialState::Gaussian {
            x0: 180.0,
            y0: 300.0,
            sigma: 64.0,
            kx: 0.4,
            ky: 0.4,
        }),
        delta_t: 0.08,
        kernel: args.kernel,
        normalization_period: 1,
        imaginary_time: false,
        iterations: args.iterations,
        snapshots: args.snapshots,
        workers: args.workers,
        process_grid: None,
    };
    let outdir = args.out.unwrap_or_else(|| {
        PathBuf::from(format!("D{}_I{}_S{}", args.dim, args.iterations, args.snapshots))
    });
    let summaries = run_config(&config, Some(&outdir))?;
    if let Some(last) = summaries.last() {
        println!(
            "TROTTER {}x{} kernel:{} np:{} t={:.3} E={:.6} <k>=({:.4}, {:.4})",
            args.dim,
            args.dim,
            config.kernel,
            config.workers,
            last.elapsed_time,
            last.energies.total,
            last.mean_momentum.0,
            last.mean_momentum.1,
        );
    }
    Ok(())
}
