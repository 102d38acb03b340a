//! Ground state of an isotropic harmonic trap by imaginary-time evolution,
//! compared against `E₀ = ω` (ħ = m = 1).

use clap::Parser;
use num_complex::Complex64 as C64;
use tracing::info;
use trotter2d::{ Geometry, Hamiltonian, Lattice, Solo, Solver, State };
use lib::init_logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "Harmonic-trap ground state in imaginary time")]
struct Args {
    /// Grid points per axis
    #[arg(long, default_value_t = 64)]
    dim: usize,

    /// Physical length of each axis
    #[arg(long, default_value_t = 16.0)]
    length: f64,

    /// Trap frequency
    #[arg(long, default_value_t = 1.0)]
    omega: f64,

    /// Contact coupling constant
    #[arg(long, default_value_t = 0.0)]
    coupling: f64,

    /// Rotating-frame angular velocity
    #[arg(long, default_value_t = 0.0)]
    rotation: f64,

    /// Time step
    #[arg(long, default_value_t = 0.01)]
    dt: f64,

    /// Steps between convergence checks
    #[arg(long, default_value_t = 100)]
    block: usize,

    /// Stop when the energy changes by less than this between checks
    #[arg(long, default_value_t = 1e-9)]
    tol: f64,

    /// Maximum number of checks
    #[arg(long, default_value_t = 200)]
    max_blocks: usize,

    /// Kernel backend: cpu | parallel
    #[arg(long, default_value = "parallel")]
    kernel: String,
}

fn main() -> anyhow::Result<()> {
    init_logging("info");
    let args = Args::parse();
    let geometry
        = Geometry::square(args.dim, args.length, args.length)
        .with_angular_velocity(args.rotation);
    let lattice = Lattice::single(geometry)?;
    let (xc, yc) = lattice.center();

    // displaced so that the search has something to do
    let state = State::from_fn(&lattice, |x, y| {
        let r2 = (x - xc - 1.0).powi(2) + (y - yc + 0.5).powi(2);
        C64::new((-r2 / 4.0).exp(), 0.0)
    })?;
    let mut hamiltonian = Hamiltonian::new(&lattice, 1.0, args.coupling)?;
    let omega = args.omega;
    hamiltonian.initialize_potential(|x, y| {
        0.5 * omega.powi(2) * ((x - xc).powi(2) + (y - yc).powi(2))
    })?;
    let mut solver
        = Solver::new(&lattice, state, hamiltonian, args.dt, &args.kernel, &Solo)?;

    let mut energy = solver.energies()?.total;
    info!(energy, "initial state");
    for block in 1..=args.max_blocks {
        solver.evolve(args.block, true)?;
        let e = solver.energies()?;
        let change = e.total - energy;
        energy = e.total;
        info!(
            block,
            iterations = solver.iterations(),
            energy,
            change,
            kinetic = e.kinetic,
            potential = e.potential,
            "imaginary-time block"
        );
        if change.abs() < args.tol { break; }
    }
    let (x, y) = solver.mean_position()?;
    println!(
        "E0 = {:.8} (continuum {:.8}); <r> - r_c = ({:.2e}, {:.2e}); {} iterations",
        energy,
        omega,
        x - xc,
        y - yc,
        solver.iterations(),
    );
    Ok(())
}
