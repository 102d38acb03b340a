//! Serializable description of a whole run.
//!
//! A [`SimulationConfig`] carries everything a driver needs to set up
//! identical solvers on every worker of a group: the geometry, the particle,
//! the initial state, the potential, and the stepping schedule. It is read from
//! JSON; every field except `geometry`, `delta_t`, and `iterations` has a
//! default.
//!
//! ```json
//! {
//!   "geometry": { "rows": 128, "cols": 128, "length_x": 128.0, "length_y": 128.0 },
//!   "delta_t": 0.08,
//!   "iterations": 10,
//!   "snapshots": 5,
//!   "workers": 4,
//!   "initial_state": {
//!     "gaussian": { "x0": 40.0, "y0": 64.0, "sigma": 8.0, "kx": 0.4, "ky": 0.0 }
//!   }
//! }
//! ```

use std::{ fs, path::Path };
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };
use crate::{
    error::{ ConfigError, TsResult },
    kernel::KernelKind,
    lattice::{ Geometry, Lattice, ProcessGrid },
};

/// Mass and contact-interaction strength of the particle.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleConfig {
    #[serde(default = "def_mass")]
    pub mass: f64,
    #[serde(default)]
    pub coupling: f64,
}

fn def_mass() -> f64 { 1.0 }

impl Default for ParticleConfig {
    fn default() -> Self { Self { mass: def_mass(), coupling: 0.0 } }
}

/// Analytic initial wavefunctions.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialState {
    /// `exp(-((x - x0)² + (y - y0)²) / 2σ²) exp(i (kx x + ky y))`
    Gaussian { x0: f64, y0: f64, sigma: f64, kx: f64, ky: f64 },
    /// `exp(i (kx x + ky y))`
    PlaneWave { kx: f64, ky: f64 },
}

impl InitialState {
    pub fn amplitude(&self, x: f64, y: f64) -> C64 {
        match *self {
            Self::Gaussian { x0, y0, sigma, kx, ky } => {
                let r2 = (x - x0).powi(2) + (y - y0).powi(2);
                C64::cis(kx * x + ky * y) * (-r2 / (2.0 * sigma.powi(2))).exp()
            },
            Self::PlaneWave { kx, ky } => C64::cis(kx * x + ky * y),
        }
    }
}

/// External potentials.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PotentialConfig {
    /// `V = value` everywhere; with closed edges this is a particle in a box.
    Constant { value: f64 },
    /// `V = m ω² ((x - x0)² + (y - y0)²) / 2`
    Harmonic { omega: f64, x0: f64, y0: f64 },
}

impl Default for PotentialConfig {
    fn default() -> Self { Self::Constant { value: 0.0 } }
}

impl PotentialConfig {
    pub fn value(&self, mass: f64, x: f64, y: f64) -> f64 {
        match *self {
            Self::Constant { value } => value,
            Self::Harmonic { omega, x0, y0 } => {
                0.5 * mass * omega.powi(2) * ((x - x0).powi(2) + (y - y0).powi(2))
            },
        }
    }
}

/// Complete description of a run.
///
/// The run consists of `snapshots` segments of `iterations` steps each; the
/// iteration count and elapsed time accumulate across segments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub geometry: Geometry,
    #[serde(default)]
    pub particle: ParticleConfig,
    #[serde(default)]
    pub potential: PotentialConfig,
    /// Defaults to a Gaussian of width `L/10` at the domain centre.
    #[serde(default)]
    pub initial_state: Option<InitialState>,
    pub delta_t: f64,
    #[serde(default = "def_kernel")]
    pub kernel: String,
    #[serde(default = "def_one")]
    pub normalization_period: usize,
    #[serde(default)]
    pub imaginary_time: bool,
    /// Steps per snapshot.
    pub iterations: usize,
    #[serde(default = "def_one")]
    pub snapshots: usize,
    #[serde(default = "def_one")]
    pub workers: usize,
    /// Explicit process grid; a balanced one is chosen if absent.
    #[serde(default)]
    pub process_grid: Option<ProcessGrid>,
}

fn def_kernel() -> String { "cpu".to_string() }

fn def_one() -> usize { 1 }

impl SimulationConfig {
    /// Parse a configuration from a JSON string and [validate][Self::validate]
    /// it.
    pub fn from_json_str(s: &str) -> TsResult<Self> {
        let config: Self = serde_json::from_str(s).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a JSON file and [validate][Self::validate]
    /// it.
    pub fn from_path<P>(path: P) -> TsResult<Self>
    where P: AsRef<Path>
    {
        let s = fs::read_to_string(path).map_err(ConfigError::from)?;
        Self::from_json_str(&s)
    }

    pub fn to_json_string(&self) -> TsResult<String> {
        Ok(serde_json::to_string_pretty(self).map_err(ConfigError::from)?)
    }

    /// Process grid used for the run.
    pub fn process_grid(&self) -> ProcessGrid {
        self.process_grid.unwrap_or_else(|| ProcessGrid::balanced(self.workers))
    }

    /// Build the lattice seen by `rank`.
    pub fn lattice(&self, rank: usize) -> TsResult<Lattice> {
        Lattice::with_process_grid(self.geometry, rank, self.process_grid())
    }

    pub fn initial_state(&self) -> InitialState {
        self.initial_state.unwrap_or_else(|| {
            let (lx, ly) = (self.geometry.length_x, self.geometry.length_y);
            InitialState::Gaussian {
                x0: lx / 2.0,
                y0: ly / 2.0,
                sigma: lx.min(ly) / 10.0,
                kx: 0.0,
                ky: 0.0,
            }
        })
    }

    pub fn kernel_kind(&self) -> TsResult<KernelKind> {
        Ok(self.kernel.parse()?)
    }

    /// Check every parameter that can be checked before a run starts.
    pub fn validate(&self) -> TsResult<()> {
        if self.workers == 0 { return Err(ConfigError::EmptyGroup.into()); }
        let grid = self.process_grid();
        if grid.size() != self.workers {
            return Err(ConfigError::ProcessGridMismatch {
                prows: grid.prows,
                pcols: grid.pcols,
                size: self.workers,
            }.into());
        }
        ConfigError::check_mass(self.particle.mass)?;
        ConfigError::check_coupling(self.particle.coupling)?;
        ConfigError::check_time_step(self.delta_t)?;
        ConfigError::check_period(self.normalization_period)?;
        self.kernel_kind()?;
        // partition checks are rank-independent
        self.lattice(0)?;
        Ok(())
    }
}
