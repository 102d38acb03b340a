//! Provides a distributed time-evolution engine for single-particle
//! wavefunctions on 2D lattices, using a second-order Trotter-Suzuki
//! (split-operator) integration scheme.
//!
//! Supports:
//! - Real-time (Schrödinger) and imaginary-time (ground-state) propagation
//! - Closed or periodic boundaries along each axis
//! - External potentials, contact interactions, and rotating frames
//! - Block decomposition of the lattice over a process group, with halo
//!   exchange between neighbouring blocks
//! - Pluggable stepping backends:
//!     - `"cpu"`: serial sweeps
//!     - `"parallel"`: sweeps distributed over a [`rayon`] thread pool
//!
//! The engine is organized around four objects: a [`Lattice`] describing the
//! domain and this worker's block of it, a [`State`] and [`Hamiltonian`] bound
//! to the lattice, and a [`Solver`] that owns the latter two and applies a
//! [`Kernel`] to them. Workers communicate only through a [`Communicator`].
//!
//! ```ignore
//! let lattice = Lattice::single(Geometry::square(256, 256.0, 256.0))?;
//! let state = State::from_fn(&lattice, |x, y| gaussian(x, y))?;
//! let hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0)?;
//! let mut solver = Solver::new(&lattice, state, hamiltonian, 0.08, "cpu", &Solo)?;
//! solver.evolve(100, false)?;
//! let snapshot = solver.gather(0, "t100")?;
//! ```
//!
//! See [`docs`] for theoretical background.

pub mod error;
pub mod lattice;
pub mod comm;
pub mod state;
pub mod hamiltonian;
pub mod halo;
pub mod kernel;
pub mod observables;
pub mod snapshot;
pub mod solver;
pub mod config;

pub mod docs;

pub use crate::{
    comm::{ Communicator, Solo, ThreadComm, ThreadGroup },
    config::SimulationConfig,
    error::{ TsError, TsResult },
    hamiltonian::Hamiltonian,
    kernel::{ Kernel, KernelKind },
    lattice::{ Geometry, Lattice },
    snapshot::Snapshot,
    solver::Solver,
    state::State,
};
