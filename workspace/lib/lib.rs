//! Shared plumbing for the demo binaries.

use std::{
    fs::{ self, File },
    io::{ BufWriter, Write },
    path::{ Path, PathBuf },
};
use anyhow::Context;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trotter2d::{
    Communicator,
    Hamiltonian,
    SimulationConfig,
    Snapshot,
    Solver,
    State,
    ThreadGroup,
    observables::Energies,
};

/// Install a `tracing` subscriber, honoring `RUST_LOG` if set.
pub fn init_logging(default: &str) {
    let filter
        = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Observables recorded alongside each snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct SnapshotSummary {
    pub label: String,
    pub iterations: usize,
    pub elapsed_time: f64,
    pub norm2: f64,
    pub energies: Energies,
    pub mean_position: (f64, f64),
    pub mean_momentum: (f64, f64),
}

/// Write `|ψ|²` of a snapshot as CSV, one grid row per line.
pub fn write_density_csv(snapshot: &Snapshot, outdir: &Path) -> anyhow::Result<PathBuf> {
    let path = outdir.join(format!("{}.csv", snapshot.label));
    let mut out = BufWriter::new(
        File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?
    );
    for row in snapshot.density().rows() {
        let line: Vec<String> = row.iter().map(|n| format!("{n:.6e}")).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    out.flush()?;
    Ok(path)
}

/// Run `config` on a thread group of `config.workers` workers, gathering a
/// snapshot on rank 0 after every segment.
///
/// Density files and a `summary.json` are written to `outdir` if given.
pub fn run_config(config: &SimulationConfig, outdir: Option<&Path>)
    -> anyhow::Result<Vec<SnapshotSummary>>
{
    config.validate()?;
    if let Some(dir) = outdir {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    info!(
        rows = config.geometry.rows,
        cols = config.geometry.cols,
        workers = config.workers,
        kernel = config.kernel.as_str(),
        imaginary_time = config.imaginary_time,
        "starting run"
    );
    let results = ThreadGroup::new(config.workers).run(|comm| {
        let outcome = run_worker(config, &comm, outdir);
        // errors outside the solver still have to release the other workers
        if let Err(err) = &outcome { comm.abort(&err.to_string()); }
        outcome
    });
    let mut summaries = Vec::new();
    for result in results {
        summaries.extend(result?);
    }
    if let Some(dir) = outdir {
        let path = dir.join("summary.json");
        fs::write(&path, serde_json::to_string_pretty(&summaries)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(summaries)
}

fn run_worker(config: &SimulationConfig, comm: &dyn Communicator, outdir: Option<&Path>)
    -> anyhow::Result<Vec<SnapshotSummary>>
{
    let lattice = config.lattice(comm.rank())?;
    let initial = config.initial_state();
    let state = State::from_fn(&lattice, |x, y| initial.amplitude(x, y))?;
    let mass = config.particle.mass;
    let mut hamiltonian
        = Hamiltonian::new(&lattice, mass, config.particle.coupling)?;
    let potential = config.potential;
    hamiltonian.initialize_potential(|x, y| potential.value(mass, x, y))?;
    let mut solver
        = Solver::new(&lattice, state, hamiltonian, config.delta_t, &config.kernel, comm)?
        .with_normalization_period(config.normalization_period)?;

    let mut summaries = Vec::new();
    for count in 0..config.snapshots {
        solver.evolve(config.iterations, config.imaginary_time)?;
        let energies = solver.energies()?;
        let mean_position = solver.mean_position()?;
        let label = format!("snapshot-{count:03}");
        let Some(snapshot) = solver.gather(0, &label)? else { continue; };
        let mean_momentum = snapshot.mean_momentum();
        info!(
            label = snapshot.label.as_str(),
            iterations = snapshot.iterations,
            elapsed_time = snapshot.elapsed_time,
            energy = energies.total,
            norm2 = energies.norm2,
            "snapshot"
        );
        if let Some(dir) = outdir { write_density_csv(&snapshot, dir)?; }
        summaries.push(SnapshotSummary {
            label,
            iterations: snapshot.iterations,
            elapsed_time: snapshot.elapsed_time,
            norm2: snapshot.norm2(),
            energies,
            mean_position,
            mean_momentum,
        });
    }
    Ok(summaries)
}
