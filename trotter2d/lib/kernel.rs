//! Backend-abstracted Trotter-Suzuki stepping.
//!
//! A [`Kernel`] applies one full second-order step to a [`State`] in place:
//! ```text
//! exp(-i dt H) ≈ K(dt/2) P(dt) K(dt/2)ᵀ
//! K(τ) = Cy₀(τ) Rx₀(τ) Cy₁(τ) Rx₁(τ)
//! ```
//! where `Rxₚ` (`Cyₚ`) exponentiates every bond of parity `p` along the rows
//! (columns), `P` multiplies by the pointwise potential phase, and `ᵀ` means
//! the same sweeps in reverse order. Bond parity is taken from the *global*
//! index so every worker pairs the same cells. See [`docs`][crate::docs] for the
//! derivation.
//!
//! All backends run exactly the same arithmetic per cell; they differ only in
//! how independent lanes are scheduled.

use std::{ fmt, marker::PhantomData, str::FromStr };
use ndarray as nd;
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };
use tracing::debug;
use crate::{
    comm::Communicator,
    error::{ ConfigError, TsResult },
    halo,
    hamiltonian::Hamiltonian,
    lattice::Lattice,
    state::State,
};

/// Direction of time in a step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Propagation {
    /// Unitary Schrödinger evolution.
    Real,
    /// Evolution under `t → -iτ`, decaying toward the ground state.
    Imaginary,
}

/// Size and direction of a single step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeStep {
    pub delta: f64,
    pub mode: Propagation,
}

impl TimeStep {
    pub fn real(delta: f64) -> Self { Self { delta, mode: Propagation::Real } }

    pub fn imaginary(delta: f64) -> Self {
        Self { delta, mode: Propagation::Imaginary }
    }

    pub fn is_imaginary(&self) -> bool { self.mode == Propagation::Imaginary }
}

/// Closed set of available backends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// Serial sweeps on the calling thread.
    Cpu,
    /// Lanes distributed over the rayon thread pool.
    Parallel,
}

impl KernelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Parallel => "parallel",
        }
    }

    /// Construct a fresh kernel of this kind.
    pub fn build(self) -> Box<dyn Kernel> {
        match self {
            Self::Cpu => Box::new(CpuKernel::default()),
            Self::Parallel => Box::new(ParallelKernel::default()),
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KernelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "parallel" => Ok(Self::Parallel),
            "gpu" | "cuda" => Err(ConfigError::KernelUnavailable(s.to_string())),
            _ => Err(ConfigError::UnknownKernel(s.to_string())),
        }
    }
}

/// Shared stepping contract of all backends.
pub trait Kernel {
    fn kind(&self) -> KernelKind;

    /// Apply one full Trotter-Suzuki step to `state` in place and advance its
    /// time counter.
    ///
    /// Halos are exchanged first if they are stale and always at the end, so
    /// on success the halo is fresh. This is a collective operation over the
    /// neighbours.
    fn step(
        &mut self,
        state: &mut State<'_>,
        hamiltonian: &Hamiltonian<'_>,
        comm: &dyn Communicator,
        timestep: TimeStep,
    ) -> TsResult<()>;
}

/// Exact exponential of one two-site bond Hamiltonian `[[0, w], [w*, 0]]`.
///
/// Acting on the pair `(p, q)`:
/// ```text
/// p' = diag p + up q
/// q' = diag q + down p
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BondOp {
    pub diag: f64,
    pub up: C64,
    pub down: C64,
}

impl BondOp {
    /// Build `exp(-i τ h)` (real time) or `exp(-τ h)` (imaginary time) for bond
    /// amplitude `w ≠ 0`.
    pub fn new(w: C64, tau: f64, mode: Propagation) -> Self {
        let r = w.norm();
        let u = w / r;
        match mode {
            Propagation::Real => {
                let (s, c) = (tau * r).sin_cos();
                let up = -C64::i() * s * u;
                let down = -C64::i() * s * u.conj();
                Self { diag: c, up, down }
            },
            Propagation::Imaginary => {
                let (s, c) = ((tau * r).sinh(), (tau * r).cosh());
                Self { diag: c, up: -s * u, down: -s * u.conj() }
            },
        }
    }

    #[inline]
    pub fn apply(&self, p: C64, q: C64) -> (C64, C64) {
        (self.diag * p + self.up * q, self.diag * q + self.down * p)
    }
}

/// Which bonds of one parity are live along a lane.
///
/// `active[c]` is true when lane positions `c` and `c + 1` both lie inside the
/// physical domain; only positions `start, start + 2, …` are visited.
#[derive(Clone, Debug, PartialEq)]
pub struct Bonds {
    pub start: usize,
    pub active: Vec<bool>,
}

impl Bonds {
    fn along<W>(origin: isize, len: usize, parity: isize, wrap: W) -> Self
    where W: Fn(isize) -> Option<usize>
    {
        let start = (parity - origin).rem_euclid(2) as usize;
        let active: Vec<bool>
            = (0..len.saturating_sub(1))
            .map(|c| {
                let g = origin + c as isize;
                wrap(g).is_some() && wrap(g + 1).is_some()
            })
            .collect();
        Self { start, active }
    }
}

fn sweep_lane(mut lane: nd::ArrayViewMut1<'_, C64>, bonds: &Bonds, op: &BondOp) {
    let n = lane.len();
    let mut c = bonds.start;
    while c + 1 < n {
        if bonds.active[c] {
            let (p, q) = op.apply(lane[c], lane[c + 1]);
            lane[c] = p;
            lane[c + 1] = q;
        }
        c += 2;
    }
}

/// Density-dependent part of the potential step, `exp(-i g dt |ψ|²)`.
#[derive(Copy, Clone, Debug)]
pub struct Nonlinear {
    g_dt: f64,
    mode: Propagation,
}

impl Nonlinear {
    #[inline]
    fn factor(&self, density: f64) -> C64 {
        potential_factor(self.g_dt * density, self.mode)
    }
}

// exp(-i e) in real time, exp(-e) in imaginary time, for e = energy × dt
fn potential_factor(e_dt: f64, mode: Propagation) -> C64 {
    match mode {
        Propagation::Real => C64::cis(-e_dt),
        Propagation::Imaginary => C64::new((-e_dt).exp(), 0.0),
    }
}

fn apply_cell(psi: &mut C64, factor: &C64, nonlinear: Option<Nonlinear>) {
    let mut k = *factor;
    if let Some(nl) = nonlinear { k *= nl.factor(psi.norm_sqr()); }
    *psi *= k;
}

/// Scheduling strategy for independent lanes and cells.
pub trait Sweep {
    const KIND: KernelKind;

    /// Number of threads the sweeps are spread over.
    fn threads() -> usize;

    /// Apply `op[i]` to the live bonds of every row `i`.
    fn rows(psi: &mut nd::Array2<C64>, ops: &nd::Array1<BondOp>, bonds: &Bonds);

    /// Apply `op[j]` to the live bonds of every column `j`.
    fn columns(psi: &mut nd::Array2<C64>, ops: &nd::Array1<BondOp>, bonds: &Bonds);

    /// Multiply every cell by its potential factor.
    fn potential(
        psi: &mut nd::Array2<C64>,
        factors: &nd::Array2<C64>,
        nonlinear: Option<Nonlinear>,
    );
}

/// Serial lane scheduling.
#[derive(Copy, Clone, Debug, Default)]
pub struct Serial;

impl Sweep for Serial {
    const KIND: KernelKind = KernelKind::Cpu;

    fn threads() -> usize { 1 }

    fn rows(psi: &mut nd::Array2<C64>, ops: &nd::Array1<BondOp>, bonds: &Bonds) {
        nd::Zip::from(psi.rows_mut()).and(ops)
            .for_each(|lane, op| sweep_lane(lane, bonds, op));
    }

    fn columns(psi: &mut nd::Array2<C64>, ops: &nd::Array1<BondOp>, bonds: &Bonds) {
        nd::Zip::from(psi.columns_mut()).and(ops)
            .for_each(|lane, op| sweep_lane(lane, bonds, op));
    }

    fn potential(
        psi: &mut nd::Array2<C64>,
        factors: &nd::Array2<C64>,
        nonlinear: Option<Nonlinear>,
    ) {
        nd::Zip::from(psi).and(factors)
            .for_each(|psi_ij, f_ij| apply_cell(psi_ij, f_ij, nonlinear));
    }
}

/// Lane scheduling over the rayon thread pool.
#[derive(Copy, Clone, Debug, Default)]
pub struct Threaded;

impl Sweep for Threaded {
    const KIND: KernelKind = KernelKind::Parallel;

    fn threads() -> usize { rayon::current_num_threads() }

    fn rows(psi: &mut nd::Array2<C64>, ops: &nd::Array1<BondOp>, bonds: &Bonds) {
        nd::Zip::from(psi.rows_mut()).and(ops)
            .par_for_each(|lane, op| sweep_lane(lane, bonds, op));
    }

    fn columns(psi: &mut nd::Array2<C64>, ops: &nd::Array1<BondOp>, bonds: &Bonds) {
        nd::Zip::from(psi.columns_mut()).and(ops)
            .par_for_each(|lane, op| sweep_lane(lane, bonds, op));
    }

    fn potential(
        psi: &mut nd::Array2<C64>,
        factors: &nd::Array2<C64>,
        nonlinear: Option<Nonlinear>,
    ) {
        nd::Zip::from(psi).and(factors)
            .par_for_each(|psi_ij, f_ij| apply_cell(psi_ij, f_ij, nonlinear));
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct CacheKey {
    shape: (usize, usize),
    delta: u64,
    mode: Propagation,
}

// precomputed operators for one (shape, dt, mode)
#[derive(Clone, Debug)]
struct StepCache {
    key: CacheKey,
    row_ops: nd::Array1<BondOp>,
    column_ops: nd::Array1<BondOp>,
    row_bonds: [Bonds; 2],
    column_bonds: [Bonds; 2],
    potential: nd::Array2<C64>,
    nonlinear: Option<Nonlinear>,
}

impl StepCache {
    fn build(lattice: &Lattice, hamiltonian: &Hamiltonian<'_>, timestep: TimeStep)
        -> Self
    {
        let shape = lattice.tile_shape();
        let (tr, tc) = shape;
        let TimeStep { delta, mode } = timestep;
        let tau = delta / 2.0;
        let row_origin = lattice.tile_row_origin();
        let col_origin = lattice.tile_col_origin();

        // y of each tile row (unwrapped beyond closed edges, where nothing is
        // live anyway)
        let row_ops: nd::Array1<BondOp>
            = (0..tr)
            .map(|ti| {
                let g = row_origin + ti as isize;
                let gi = lattice.wrap_row(g).map(|gi| gi as f64).unwrap_or(g as f64);
                BondOp::new(hamiltonian.row_bond(gi * lattice.dy()), tau, mode)
            })
            .collect();
        let column_ops: nd::Array1<BondOp>
            = (0..tc)
            .map(|tj| {
                let g = col_origin + tj as isize;
                let gj = lattice.wrap_col(g).map(|gj| gj as f64).unwrap_or(g as f64);
                BondOp::new(hamiltonian.column_bond(gj * lattice.dx()), tau, mode)
            })
            .collect();
        // row lanes run along x, column lanes along y
        let row_bonds = [0, 1].map(|p| {
            Bonds::along(col_origin, tc, p, |g| lattice.wrap_col(g))
        });
        let column_bonds = [0, 1].map(|p| {
            Bonds::along(row_origin, tr, p, |g| lattice.wrap_row(g))
        });

        let diagonal = hamiltonian.kinetic_diagonal();
        let potential: nd::Array2<C64>
            = hamiltonian.potential()
            .mapv(|v| potential_factor((v + diagonal) * delta, mode));
        let g = hamiltonian.coupling();
        let nonlinear = (g != 0.0).then_some(Nonlinear { g_dt: g * delta, mode });

        Self {
            key: CacheKey { shape, delta: delta.to_bits(), mode },
            row_ops,
            column_ops,
            row_bonds,
            column_bonds,
            potential,
            nonlinear,
        }
    }
}

/// Second-order split-step kernel, generic over lane scheduling.
#[derive(Clone, Debug)]
pub struct SplitStep<S> {
    cache: Option<StepCache>,
    sweep: PhantomData<S>,
}

impl<S> Default for SplitStep<S> {
    fn default() -> Self { Self { cache: None, sweep: PhantomData } }
}

/// Serial backend, selected by the name `"cpu"`.
pub type CpuKernel = SplitStep<Serial>;

/// Rayon backend, selected by the name `"parallel"`.
pub type ParallelKernel = SplitStep<Threaded>;

impl<S: Sweep> SplitStep<S> {
    fn prepare(&mut self, lattice: &Lattice, hamiltonian: &Hamiltonian<'_>, timestep: TimeStep)
        -> &StepCache
    {
        let key = CacheKey {
            shape: lattice.tile_shape(),
            delta: timestep.delta.to_bits(),
            mode: timestep.mode,
        };
        if self.cache.as_ref().is_some_and(|cache| cache.key != key) {
            self.cache = None;
        }
        self.cache.get_or_insert_with(|| {
            debug!(
                kernel = S::KIND.name(),
                threads = S::threads(),
                rows = key.shape.0,
                cols = key.shape.1,
                dt = timestep.delta,
                mode = ?timestep.mode,
                "building step cache"
            );
            StepCache::build(lattice, hamiltonian, timestep)
        })
    }
}

impl<S: Sweep> Kernel for SplitStep<S> {
    fn kind(&self) -> KernelKind { S::KIND }

    fn step(
        &mut self,
        state: &mut State<'_>,
        hamiltonian: &Hamiltonian<'_>,
        comm: &dyn Communicator,
        timestep: TimeStep,
    ) -> TsResult<()>
    {
        if state.halo_stale() { halo::exchange(state, comm)?; }
        let cache = self.prepare(state.lattice(), hamiltonian, timestep);
        let psi = state.tile_mut();

        S::columns(psi, &cache.column_ops, &cache.column_bonds[0]);
        S::rows(psi, &cache.row_ops, &cache.row_bonds[0]);
        S::columns(psi, &cache.column_ops, &cache.column_bonds[1]);
        S::rows(psi, &cache.row_ops, &cache.row_bonds[1]);

        S::potential(psi, &cache.potential, cache.nonlinear);

        S::rows(psi, &cache.row_ops, &cache.row_bonds[1]);
        S::columns(psi, &cache.column_ops, &cache.column_bonds[1]);
        S::rows(psi, &cache.row_ops, &cache.row_bonds[0]);
        S::columns(psi, &cache.column_ops, &cache.column_bonds[0]);

        halo::exchange(state, comm)?;
        state.advance_time(timestep.delta);
        Ok(())
    }
}
