//! Discretized 2D domain and its block decomposition across a process group.
//!
//! Rows index the *y* axis and columns index the *x* axis. Global cell
//! `(i, j)` sits at the physical position `(x, y) = (j dx, i dy)`. Every worker
//! owns one contiguous block of cells (its *interior*) surrounded by a border of
//! [`HALO`] ghost cells on each side; the interior plus the border is called
//! the *tile*.
//!
//! Sub-domain bounds are a pure function of the rank, so any worker can compute
//! any other worker's block without communicating.

use serde::{ Deserialize, Serialize };
use tracing::debug;
use crate::error::{ ConfigError, TsResult };

/// Width of the ghost-cell border on every side of a tile.
///
/// One step applies four bond sweeps along each axis; each sweep can
/// invalidate one more cell inward from the tile edge, so four cells of halo
/// keep the interior exact between exchanges.
pub const HALO: usize = 4;

/// Physical and discrete description of the global domain.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Number of grid points along *y*.
    pub rows: usize,
    /// Number of grid points along *x*.
    pub cols: usize,
    /// Physical extent along *x*.
    pub length_x: f64,
    /// Physical extent along *y*.
    pub length_y: f64,
    /// Whether the *x* axis wraps around.
    #[serde(default)]
    pub periodic_x: bool,
    /// Whether the *y* axis wraps around.
    #[serde(default)]
    pub periodic_y: bool,
    /// Angular velocity of the rotating frame.
    #[serde(default)]
    pub angular_velocity: f64,
}

impl Geometry {
    /// Square grid of `dim × dim` points with the given physical lengths and
    /// no periodicity or rotation.
    pub fn square(dim: usize, length_x: f64, length_y: f64) -> Self {
        Self {
            rows: dim,
            cols: dim,
            length_x,
            length_y,
            periodic_x: false,
            periodic_y: false,
            angular_velocity: 0.0,
        }
    }

    /// Set periodicity flags for the *x* and *y* axes.
    pub fn with_periodic(mut self, periodic_x: bool, periodic_y: bool) -> Self {
        self.periodic_x = periodic_x;
        self.periodic_y = periodic_y;
        self
    }

    /// Set the angular velocity of the rotating frame.
    pub fn with_angular_velocity(mut self, omega: f64) -> Self {
        self.angular_velocity = omega;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (axis, points, length, periodic) in [
            ("x", self.cols, self.length_x, self.periodic_x),
            ("y", self.rows, self.length_y, self.periodic_y),
        ] {
            if points < 2 {
                return Err(ConfigError::BadDimension { axis, points });
            }
            if !(length > 0.0 && length.is_finite()) {
                return Err(ConfigError::BadLength { axis, length });
            }
            if periodic && points % 2 != 0 {
                return Err(ConfigError::OddPeriodicAxis { axis, points });
            }
        }
        Ok(())
    }
}

/// One of the four ordinal neighbour directions.
///
/// `Up` points toward smaller row indices (smaller *y*), `Left` toward smaller
/// column indices (smaller *x*).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Shape of the process grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessGrid {
    pub prows: usize,
    pub pcols: usize,
}

impl ProcessGrid {
    /// Factor `size` into a grid as close to square as possible, with at least
    /// as many process rows as process columns.
    pub fn balanced(size: usize) -> Self {
        let mut pcols = 1;
        let mut k = 1;
        while k * k <= size {
            if size % k == 0 { pcols = k; }
            k += 1;
        }
        Self { prows: size / pcols.max(1), pcols }
    }

    pub fn size(&self) -> usize { self.prows * self.pcols }

    /// Grid coordinates `(prow, pcol)` of a rank (row-major).
    pub fn coords(&self, rank: usize) -> (usize, usize) {
        (rank / self.pcols, rank % self.pcols)
    }

    /// Rank at grid coordinates `(prow, pcol)` (row-major).
    pub fn rank(&self, prow: usize, pcol: usize) -> usize {
        prow * self.pcols + pcol
    }
}

/// Block of global cells owned by one worker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Extent {
    /// Global index of the first owned row.
    pub row_offset: usize,
    /// Global index of the first owned column.
    pub col_offset: usize,
    /// Number of owned rows.
    pub rows: usize,
    /// Number of owned columns.
    pub cols: usize,
}

impl Extent {
    /// Shape of the tile (interior plus halo border).
    pub fn tile_shape(&self) -> (usize, usize) {
        (self.rows + 2 * HALO, self.cols + 2 * HALO)
    }

    /// Whether the global cell `(i, j)` is owned by this block.
    pub fn contains(&self, i: usize, j: usize) -> bool {
        (self.row_offset..self.row_offset + self.rows).contains(&i)
            && (self.col_offset..self.col_offset + self.cols).contains(&j)
    }
}

// balanced 1D split: part `c` of `parts` over `n` points
fn split(n: usize, parts: usize, c: usize) -> (usize, usize) {
    let base = n / parts;
    let rem = n % parts;
    (c * base + c.min(rem), base + usize::from(c < rem))
}

/// The global domain together with this worker's place in its decomposition.
#[derive(Clone, Debug)]
pub struct Lattice {
    geometry: Geometry,
    dx: f64,
    dy: f64,
    grid: ProcessGrid,
    rank: usize,
    coords: (usize, usize),
    extent: Extent,
}

impl Lattice {
    /// Build the lattice seen by `rank` in a group of `size` workers, using a
    /// [balanced][ProcessGrid::balanced] process grid.
    pub fn new(geometry: Geometry, rank: usize, size: usize) -> TsResult<Self> {
        if size == 0 { return Err(ConfigError::EmptyGroup.into()); }
        Self::with_process_grid(geometry, rank, ProcessGrid::balanced(size))
    }

    /// Build a lattice for a single worker owning the whole domain.
    pub fn single(geometry: Geometry) -> TsResult<Self> {
        Self::new(geometry, 0, 1)
    }

    /// Build the lattice seen by `rank` with an explicit process grid.
    pub fn with_process_grid(geometry: Geometry, rank: usize, grid: ProcessGrid)
        -> TsResult<Self>
    {
        geometry.validate()?;
        if grid.size() == 0 { return Err(ConfigError::EmptyGroup.into()); }
        if rank >= grid.size() {
            return Err(
                ConfigError::RankOutOfRange { rank, size: grid.size() }.into());
        }
        for (axis, points, parts, periodic) in [
            ("x", geometry.cols, grid.pcols, geometry.periodic_x),
            ("y", geometry.rows, grid.prows, geometry.periodic_y),
        ] {
            // the smallest part is the last one
            let (_, extent) = split(points, parts, parts - 1);
            let needs_halo = parts > 1 || periodic;
            if extent == 0 || (needs_halo && extent < HALO) {
                return Err(ConfigError::PartitionTooSmall {
                    axis, points, parts, extent, halo: HALO,
                }.into());
            }
        }
        let dx = geometry.length_x / geometry.cols as f64;
        let dy = geometry.length_y / geometry.rows as f64;
        let coords = grid.coords(rank);
        let mut lattice = Self {
            geometry,
            dx,
            dy,
            grid,
            rank,
            coords,
            extent: Extent { row_offset: 0, col_offset: 0, rows: 0, cols: 0 },
        };
        lattice.extent = lattice.extent_of(rank);
        debug!(
            rank,
            prows = grid.prows,
            pcols = grid.pcols,
            row_offset = lattice.extent.row_offset,
            col_offset = lattice.extent.col_offset,
            rows = lattice.extent.rows,
            cols = lattice.extent.cols,
            "lattice partitioned"
        );
        Ok(lattice)
    }

    pub fn geometry(&self) -> &Geometry { &self.geometry }

    /// Global number of rows (points along *y*).
    pub fn rows(&self) -> usize { self.geometry.rows }

    /// Global number of columns (points along *x*).
    pub fn cols(&self) -> usize { self.geometry.cols }

    pub fn length_x(&self) -> f64 { self.geometry.length_x }

    pub fn length_y(&self) -> f64 { self.geometry.length_y }

    /// Grid spacing along *x*.
    pub fn dx(&self) -> f64 { self.dx }

    /// Grid spacing along *y*.
    pub fn dy(&self) -> f64 { self.dy }

    /// Area element `dx dy`.
    pub fn cell_area(&self) -> f64 { self.dx * self.dy }

    pub fn periodic_x(&self) -> bool { self.geometry.periodic_x }

    pub fn periodic_y(&self) -> bool { self.geometry.periodic_y }

    pub fn angular_velocity(&self) -> f64 { self.geometry.angular_velocity }

    /// Physical centre of the domain.
    pub fn center(&self) -> (f64, f64) {
        (self.geometry.length_x / 2.0, self.geometry.length_y / 2.0)
    }

    pub fn process_grid(&self) -> ProcessGrid { self.grid }

    pub fn rank(&self) -> usize { self.rank }

    /// Number of workers in the process group.
    pub fn size(&self) -> usize { self.grid.size() }

    /// This worker's `(prow, pcol)` coordinates in the process grid.
    pub fn coords(&self) -> (usize, usize) { self.coords }

    /// Block owned by this worker.
    pub fn extent(&self) -> Extent { self.extent }

    // a communicator must be the group this lattice was partitioned for
    pub(crate) fn check_group(&self, rank: usize, size: usize)
        -> Result<(), ConfigError>
    {
        ((rank, size) == (self.rank, self.size())).then_some(())
            .ok_or(ConfigError::GroupMismatch {
                rank,
                size,
                lattice_rank: self.rank,
                lattice_size: self.size(),
            })
    }

    /// Block owned by any worker in the group, computed without communication.
    ///
    /// *Panics if `rank` is out of range for the process grid*.
    pub fn extent_of(&self, rank: usize) -> Extent {
        assert!(rank < self.grid.size(), "rank {rank} out of range");
        let (prow, pcol) = self.grid.coords(rank);
        let (row_offset, rows) = split(self.geometry.rows, self.grid.prows, prow);
        let (col_offset, cols) = split(self.geometry.cols, self.grid.pcols, pcol);
        Extent { row_offset, col_offset, rows, cols }
    }

    /// Shape of this worker's tile.
    pub fn tile_shape(&self) -> (usize, usize) { self.extent.tile_shape() }

    /// Rank of the neighbouring partition in `dir`, wrapping around periodic
    /// axes. Returns `None` at a closed edge.
    ///
    /// The neighbour may be this worker itself when a periodic axis is not
    /// split.
    pub fn neighbor(&self, dir: Direction) -> Option<usize> {
        let (prow, pcol) = self.coords;
        let ProcessGrid { prows, pcols } = self.grid;
        let step = |c: usize, n: usize, fwd: bool, periodic: bool| {
            match (fwd, c) {
                (false, 0) => periodic.then(|| n - 1),
                (false, c) => Some(c - 1),
                (true, c) if c + 1 == n => periodic.then_some(0),
                (true, c) => Some(c + 1),
            }
        };
        match dir {
            Direction::Up
                => step(prow, prows, false, self.geometry.periodic_y)
                .map(|r| self.grid.rank(r, pcol)),
            Direction::Down
                => step(prow, prows, true, self.geometry.periodic_y)
                .map(|r| self.grid.rank(r, pcol)),
            Direction::Left
                => step(pcol, pcols, false, self.geometry.periodic_x)
                .map(|c| self.grid.rank(prow, c)),
            Direction::Right
                => step(pcol, pcols, true, self.geometry.periodic_x)
                .map(|c| self.grid.rank(prow, c)),
        }
    }

    /// Global index of a local interior cell.
    pub fn local_to_global(&self, i: usize, j: usize) -> (usize, usize) {
        (self.extent.row_offset + i, self.extent.col_offset + j)
    }

    /// Local interior index of a global cell, if this worker owns it.
    pub fn global_to_local(&self, i: usize, j: usize) -> Option<(usize, usize)> {
        self.extent.contains(i, j)
            .then(|| (i - self.extent.row_offset, j - self.extent.col_offset))
    }

    /// Physical position `(x, y)` of a global cell.
    pub fn global_position(&self, i: usize, j: usize) -> (f64, f64) {
        (j as f64 * self.dx, i as f64 * self.dy)
    }

    /// Physical position `(x, y)` of a local interior cell.
    pub fn position(&self, i: usize, j: usize) -> (f64, f64) {
        let (gi, gj) = self.local_to_global(i, j);
        self.global_position(gi, gj)
    }

    // global (unwrapped) index of tile row `ti`; negative or past-the-end
    // values lie in the halo beyond the global edge
    pub(crate) fn tile_row_origin(&self) -> isize {
        self.extent.row_offset as isize - HALO as isize
    }

    pub(crate) fn tile_col_origin(&self) -> isize {
        self.extent.col_offset as isize - HALO as isize
    }

    // wrap an unwrapped global row index into the domain; `None` if it falls
    // beyond a closed edge
    pub(crate) fn wrap_row(&self, g: isize) -> Option<usize> {
        wrap(g, self.geometry.rows, self.geometry.periodic_y)
    }

    pub(crate) fn wrap_col(&self, g: isize) -> Option<usize> {
        wrap(g, self.geometry.cols, self.geometry.periodic_x)
    }

    /// Global cell addressed by tile index `(ti, tj)`, if it lies inside the
    /// physical domain.
    pub(crate) fn tile_to_global(&self, ti: usize, tj: usize)
        -> Option<(usize, usize)>
    {
        let gi = self.wrap_row(self.tile_row_origin() + ti as isize)?;
        let gj = self.wrap_col(self.tile_col_origin() + tj as isize)?;
        Some((gi, gj))
    }
}

fn wrap(g: isize, n: usize, periodic: bool) -> Option<usize> {
    if periodic {
        Some(g.rem_euclid(n as isize) as usize)
    } else {
        (0..n as isize).contains(&g).then_some(g as usize)
    }
}
