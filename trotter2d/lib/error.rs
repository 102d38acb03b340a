//! Collection of all error types.
//!
//! All errors derive [`thiserror::Error`], making them composable with each
//! other through [`TsError`] and compatible with application code using
//! [`anyhow`][anyhow].
//!
//! [anyhow]: https://crates.io/crates/anyhow

use thiserror::Error;
use crate::comm::Tag;

/// Returned when a simulation is set up with parameters that cannot describe a
/// valid run. Nothing has been evolved when one of these is produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Returned when an axis has fewer than two grid points.
    #[error("axis {axis} must have at least 2 grid points; got {points}")]
    BadDimension { axis: &'static str, points: usize },

    /// Returned when a physical length is non-positive or non-finite.
    #[error("physical length along {axis} must be positive and finite; got {length}")]
    BadLength { axis: &'static str, length: f64 },

    /// Returned when a periodic axis has an odd number of grid points, which
    /// the even/odd bond checkerboard cannot tile.
    #[error("periodic axis {axis} must have an even number of grid points; got {points}")]
    OddPeriodicAxis { axis: &'static str, points: usize },

    /// Returned when the process group has no members.
    #[error("process group must contain at least one worker")]
    EmptyGroup,

    /// Returned when a rank does not belong to the process group.
    #[error("rank {rank} is out of range for a group of {size}")]
    RankOutOfRange { rank: usize, size: usize },

    /// Returned when an explicit process grid does not match the group size.
    #[error("process grid {prows}x{pcols} does not match a group of {size}")]
    ProcessGridMismatch { prows: usize, pcols: usize, size: usize },

    /// Returned when a communicator does not match the group a lattice was
    /// partitioned for.
    #[error(
        "communicator is rank {rank} of {size} but the lattice was built for \
        rank {lattice_rank} of {lattice_size}"
    )]
    GroupMismatch {
        rank: usize,
        size: usize,
        lattice_rank: usize,
        lattice_size: usize,
    },

    /// Returned when an axis is split into sub-domains too narrow to carry a
    /// full halo.
    #[error(
        "cannot partition {points} points along {axis} across {parts} workers: \
        local extent {extent} is below the halo width {halo}"
    )]
    PartitionTooSmall {
        axis: &'static str,
        points: usize,
        parts: usize,
        extent: usize,
        halo: usize,
    },

    /// Returned when a kernel name is not recognized.
    #[error("unknown kernel '{0}'; expected one of: cpu, parallel")]
    UnknownKernel(String),

    /// Returned when a kernel name is recognized but its backend is not part
    /// of this build.
    #[error("kernel '{0}' is not available in this build")]
    KernelUnavailable(String),

    /// Returned when the kernel backend is changed after evolution started.
    #[error("cannot switch kernel from {from} to {to} after {iterations} iterations")]
    KernelSwitch { from: &'static str, to: &'static str, iterations: usize },

    /// Returned when a non-positive or non-finite particle mass is encountered.
    #[error("particle mass must be positive and finite; got {0}")]
    BadMass(f64),

    /// Returned when a non-finite coupling constant is encountered.
    #[error("coupling constant must be finite; got {0}")]
    BadCoupling(f64),

    /// Returned when a non-positive or non-finite time step is encountered.
    #[error("time step must be positive and finite; got {0}")]
    BadTimeStep(f64),

    /// Returned when a normalization period of zero is requested.
    #[error("normalization period must be greater than 0")]
    BadNormalizationPeriod,

    /// Returned when a State or Hamiltonian is bound to a different Lattice
    /// than the Solver.
    #[error("{0} is bound to a different lattice than the solver")]
    LatticeMismatch(&'static str),

    /// Returned when a configuration file cannot be read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when a configuration file cannot be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn check_mass(mass: f64) -> Result<(), Self> {
        (mass > 0.0 && mass.is_finite()).then_some(()).ok_or(Self::BadMass(mass))
    }

    pub(crate) fn check_coupling(coupling: f64) -> Result<(), Self> {
        coupling.is_finite().then_some(()).ok_or(Self::BadCoupling(coupling))
    }

    pub(crate) fn check_time_step(dt: f64) -> Result<(), Self> {
        (dt > 0.0 && dt.is_finite()).then_some(()).ok_or(Self::BadTimeStep(dt))
    }

    pub(crate) fn check_period(period: usize) -> Result<(), Self> {
        (period != 0).then_some(()).ok_or(Self::BadNormalizationPeriod)
    }
}

/// Returned when caller-supplied physical input is not usable.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Returned when the potential function produces a non-finite value.
    #[error("potential is not finite at (x, y) = ({x}, {y}); got {value}")]
    NonFinitePotential { x: f64, y: f64, value: f64 },

    /// Returned when the initial-state function produces a non-finite value.
    #[error("initial amplitude is not finite at (x, y) = ({x}, {y})")]
    NonFiniteAmplitude { x: f64, y: f64 },

    /// Returned when a global array does not match the lattice dimensions.
    #[error("expected a {rows}x{cols} array; got {got_rows}x{got_cols}")]
    ShapeMismatch { rows: usize, cols: usize, got_rows: usize, got_cols: usize },
}

/// Returned when evolution produces unusable values. Always fatal for the
/// whole process group.
#[derive(Debug, Error)]
pub enum NumericalError {
    /// Returned when a non-finite amplitude appears after a step.
    #[error(
        "non-finite amplitude on rank {rank} at global cell ({row}, {col}) \
        after iteration {iteration}"
    )]
    NonFinite { rank: usize, iteration: usize, row: usize, col: usize },

    /// Returned when the global norm cannot be used to renormalize.
    #[error("cannot renormalize after iteration {iteration}: squared norm is {norm2}")]
    VanishingNorm { iteration: usize, norm2: f64 },

    /// Returned when an expectation value is taken on a state with no weight.
    #[error("expectation values need a positive norm; squared norm is {norm2}")]
    EmptyState { norm2: f64 },
}

/// Returned from process-group communication. Always fatal for the whole
/// process group.
#[derive(Debug, Error)]
pub enum CommError {
    /// Returned when a message is addressed to a rank outside the group.
    #[error("rank {peer} does not exist in a group of {size}")]
    NoSuchPeer { peer: usize, size: usize },

    /// Returned when a peer fails to deliver a message in time.
    #[error("rank {rank} timed out waiting for {tag:?} from rank {peer}")]
    Timeout { rank: usize, peer: usize, tag: Tag },

    /// Returned when a peer's mailbox has gone away.
    #[error("rank {peer} is no longer reachable")]
    Disconnected { peer: usize },

    /// Returned when any worker aborted the group.
    #[error("group aborted by rank {origin}: {reason}")]
    Aborted { origin: usize, reason: String },

    /// Returned when a message carries the wrong kind of payload.
    #[error("unexpected payload for {tag:?} from rank {peer}")]
    UnexpectedPayload { peer: usize, tag: Tag },

    /// Returned when a message carries the wrong number of values.
    #[error("expected {expected} values for {tag:?} from rank {peer}; got {got}")]
    BadLength { peer: usize, tag: Tag, expected: usize, got: usize },
}

/// Top-level error type, returned from all simulation operations.
#[derive(Debug, Error)]
pub enum TsError {
    /// [`ConfigError`]
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// [`DomainError`]
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// [`NumericalError`]
    #[error("numerical error: {0}")]
    Numerical(#[from] NumericalError),

    /// [`CommError`]
    #[error("communication error: {0}")]
    Comm(#[from] CommError),
}

pub type TsResult<T> = Result<T, TsError>;
