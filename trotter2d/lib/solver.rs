//! Orchestration of repeated Trotter-Suzuki steps.

use std::{ ptr, time::Instant };
use tracing::{ debug, info, trace };
use crate::{
    comm::Communicator,
    error::{ CommError, ConfigError, NumericalError, TsError, TsResult },
    hamiltonian::Hamiltonian,
    kernel::{ Kernel, KernelKind, TimeStep },
    lattice::Lattice,
    observables::{ self, Energies },
    snapshot::Snapshot,
    state::State,
};

/// Drives a [`Kernel`] over a [`State`] for a fixed [`Hamiltonian`].
///
/// The solver owns the state and the Hamiltonian for the duration of a run and
/// borrows the lattice they share and the communicator of the process group.
/// Every worker of the group must construct its own solver and call the same
/// sequence of collective methods (`evolve`, `norm2`, `energies`,
/// `mean_position`, `gather`).
pub struct Solver<'a> {
    lattice: &'a Lattice,
    state: State<'a>,
    hamiltonian: Hamiltonian<'a>,
    kernel: Box<dyn Kernel>,
    comm: &'a dyn Communicator,
    delta_t: f64,
    normalization_period: usize,
    iterations: usize,
    imaginary_time: Option<bool>,
}

impl<'a> Solver<'a> {
    /// Create a new solver, selecting the kernel backend by name.
    ///
    /// Fails if the state or Hamiltonian was built on a different lattice, if
    /// `delta_t` is not positive, or if `kernel` does not name an available
    /// backend.
    pub fn new(
        lattice: &'a Lattice,
        state: State<'a>,
        hamiltonian: Hamiltonian<'a>,
        delta_t: f64,
        kernel: &str,
        comm: &'a dyn Communicator,
    ) -> TsResult<Self>
    {
        if !ptr::eq(state.lattice(), lattice) {
            return Err(ConfigError::LatticeMismatch("state").into());
        }
        if !ptr::eq(hamiltonian.lattice(), lattice) {
            return Err(ConfigError::LatticeMismatch("hamiltonian").into());
        }
        lattice.check_group(comm.rank(), comm.size())?;
        ConfigError::check_time_step(delta_t)?;
        let kind: KernelKind = kernel.parse()?;
        debug!(rank = comm.rank(), kernel = kind.name(), dt = delta_t, "solver ready");
        Ok(Self {
            lattice,
            state,
            hamiltonian,
            kernel: kind.build(),
            comm,
            delta_t,
            normalization_period: 1,
            iterations: 0,
            imaginary_time: None,
        })
    }

    /// Set how many imaginary-time steps run between renormalizations.
    pub fn with_normalization_period(mut self, period: usize) -> TsResult<Self> {
        ConfigError::check_period(period)?;
        self.normalization_period = period;
        Ok(self)
    }

    /// Select a kernel backend by name.
    ///
    /// Selecting the current backend is a no-op. Selecting a different one is
    /// only allowed before the first step.
    pub fn set_kernel(&mut self, kernel: &str) -> TsResult<()> {
        let kind: KernelKind = kernel.parse()?;
        let current = self.kernel.kind();
        if kind == current { return Ok(()); }
        if self.iterations > 0 {
            return Err(ConfigError::KernelSwitch {
                from: current.name(),
                to: kind.name(),
                iterations: self.iterations,
            }.into());
        }
        self.kernel = kind.build();
        Ok(())
    }

    pub fn kernel_kind(&self) -> KernelKind { self.kernel.kind() }

    pub fn kernel_name(&self) -> &'static str { self.kernel.kind().name() }

    pub fn lattice(&self) -> &'a Lattice { self.lattice }

    pub fn state(&self) -> &State<'a> { &self.state }

    pub fn hamiltonian(&self) -> &Hamiltonian<'a> { &self.hamiltonian }

    pub fn delta_t(&self) -> f64 { self.delta_t }

    pub fn normalization_period(&self) -> usize { self.normalization_period }

    /// Total number of steps applied so far.
    pub fn iterations(&self) -> usize { self.iterations }

    /// Total simulated time, `iterations × dt`.
    pub fn elapsed_time(&self) -> f64 { self.iterations as f64 * self.delta_t }

    /// Propagation mode of the most recent non-empty `evolve` call.
    pub fn imaginary_time(&self) -> Option<bool> { self.imaginary_time }

    /// Apply `iterations` steps in real or imaginary time.
    ///
    /// In imaginary time the state is rescaled to unit norm after every
    /// [normalization period][Self::with_normalization_period] and at the end
    /// of the call. A numerical failure on any worker aborts the process group
    /// and fails the call everywhere.
    ///
    /// This is a collective operation.
    pub fn evolve(&mut self, iterations: usize, imaginary_time: bool) -> TsResult<()> {
        if iterations == 0 { return Ok(()); }
        self.imaginary_time = Some(imaginary_time);
        let timestep
            = if imaginary_time {
                TimeStep::imaginary(self.delta_t)
            } else {
                TimeStep::real(self.delta_t)
            };
        let start = Instant::now();
        if let Err(err) = self.run(iterations, timestep) {
            if !matches!(err, TsError::Comm(CommError::Aborted { .. })) {
                self.comm.abort(&err.to_string());
            }
            return Err(err);
        }
        // surfaces an abort raised by a peer during the final step
        self.comm.all_reduce_sum(0.0)?;
        info!(
            rank = self.comm.rank(),
            kernel = self.kernel_name(),
            steps = iterations,
            imaginary_time,
            total_iterations = self.iterations,
            elapsed_time = self.elapsed_time(),
            wall_ms = start.elapsed().as_millis() as u64,
            "evolve finished"
        );
        Ok(())
    }

    fn run(&mut self, iterations: usize, timestep: TimeStep) -> TsResult<()> {
        for k in 1..=iterations {
            self.kernel.step(
                &mut self.state, &self.hamiltonian, self.comm, timestep)?;
            self.iterations += 1;
            if let Some((row, col)) = self.state.find_non_finite() {
                return Err(NumericalError::NonFinite {
                    rank: self.comm.rank(),
                    iteration: self.iterations,
                    row,
                    col,
                }.into());
            }
            if timestep.is_imaginary()
                && (k % self.normalization_period == 0 || k == iterations)
            {
                self.renormalize()?;
            }
        }
        Ok(())
    }

    fn renormalize(&mut self) -> TsResult<()> {
        let norm2 = self.state.norm2(self.comm)?;
        if !(norm2 > 0.0 && norm2.is_finite()) {
            return Err(NumericalError::VanishingNorm {
                iteration: self.iterations,
                norm2,
            }.into());
        }
        trace!(iteration = self.iterations, norm2, "renormalizing");
        self.state.rescale(norm2.sqrt().recip());
        Ok(())
    }

    /// Global `Σ |ψ|² dx dy`. This is a collective operation.
    pub fn norm2(&self) -> TsResult<f64> { self.state.norm2(self.comm) }

    /// Energy expectation values. This is a collective operation.
    pub fn energies(&mut self) -> TsResult<Energies> {
        observables::energies(&mut self.state, &self.hamiltonian, self.comm)
    }

    /// Mean position `⟨(x, y)⟩`. This is a collective operation.
    pub fn mean_position(&self) -> TsResult<(f64, f64)> {
        observables::mean_position(&self.state, self.comm)
    }

    /// Assemble the global wavefunction on `root`, labelled by `label`.
    ///
    /// Returns `Some` on `root` and `None` everywhere else. This is a
    /// collective operation.
    pub fn gather(&self, root: usize, label: &str) -> TsResult<Option<Snapshot>> {
        let snapshot
            = self.state.gather(self.comm, root)?
            .map(|psi| {
                Snapshot::new(
                    label,
                    psi,
                    self.lattice,
                    self.iterations,
                    self.elapsed_time(),
                )
            });
        Ok(snapshot)
    }

    /// Release the state and Hamiltonian.
    pub fn into_parts(self) -> (State<'a>, Hamiltonian<'a>) {
        (self.state, self.hamiltonian)
    }
}
