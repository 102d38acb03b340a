//! Physical operator driving the evolution.
//!
//! The Hamiltonian is
//! ```text
//!        1
//! H = - --- ∇² + V(x, y) + g |ψ|² - Ω L_z,    L_z = (x - x_c) p_y - (y - y_c) p_x
//!       2 m
//! ```
//! in units where ħ = 1, with ∇² replaced by the five-point finite-difference
//! Laplacian of the [`Lattice`]. See [`docs`][crate::docs] for how each piece
//! enters the splitting.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    error::{ ConfigError, DomainError, TsResult },
    lattice::Lattice,
};

/// Physical constants and the sampled external potential for one worker's
/// tile.
#[derive(Clone, Debug)]
pub struct Hamiltonian<'a> {
    lattice: &'a Lattice,
    mass: f64,
    coupling: f64,
    rotation_center: (f64, f64),
    omega: f64,
    potential: nd::Array2<f64>,
}

impl<'a> Hamiltonian<'a> {
    /// Create a Hamiltonian with zero potential, rotating about the lattice
    /// centre at the lattice's frame speed.
    pub fn new(lattice: &'a Lattice, mass: f64, coupling: f64) -> TsResult<Self> {
        ConfigError::check_mass(mass)?;
        ConfigError::check_coupling(coupling)?;
        Ok(Self {
            lattice,
            mass,
            coupling,
            rotation_center: lattice.center(),
            omega: lattice.angular_velocity(),
            potential: nd::Array2::zeros(lattice.tile_shape()),
        })
    }

    /// Override the rotation centre and angular frequency.
    pub fn with_rotation(mut self, center_x: f64, center_y: f64, omega: f64)
        -> Self
    {
        self.rotation_center = (center_x, center_y);
        self.omega = omega;
        self
    }

    /// Sample the external potential `v(x, y)` at every tile cell inside the
    /// domain. Halo cells across a periodic edge use the wrapped position;
    /// cells beyond a closed edge hold zero.
    pub fn initialize_potential<F>(&mut self, v: F) -> TsResult<()>
    where F: Fn(f64, f64) -> f64
    {
        let lattice = self.lattice;
        let mut potential: nd::Array2<f64> = nd::Array2::zeros(lattice.tile_shape());
        for ((ti, tj), v_ij) in potential.indexed_iter_mut() {
            let Some((gi, gj)) = lattice.tile_to_global(ti, tj) else { continue; };
            let (x, y) = lattice.global_position(gi, gj);
            let value = v(x, y);
            if !value.is_finite() {
                return Err(DomainError::NonFinitePotential { x, y, value }.into());
            }
            *v_ij = value;
        }
        self.potential = potential;
        Ok(())
    }

    /// Set a spatially constant potential.
    pub fn constant_potential(&mut self, value: f64) -> TsResult<()> {
        self.initialize_potential(|_, _| value)
    }

    pub fn lattice(&self) -> &'a Lattice { self.lattice }

    pub fn mass(&self) -> f64 { self.mass }

    pub fn coupling(&self) -> f64 { self.coupling }

    pub fn omega(&self) -> f64 { self.omega }

    pub fn rotation_center(&self) -> (f64, f64) { self.rotation_center }

    /// Potential sampled over the whole tile.
    pub fn potential(&self) -> nd::ArrayView2<'_, f64> { self.potential.view() }

    /// Hopping amplitude `1 / (2 m dx²)` along *x*.
    pub fn hopping_x(&self) -> f64 {
        (2.0 * self.mass * self.lattice.dx().powi(2)).recip()
    }

    /// Hopping amplitude `1 / (2 m dy²)` along *y*.
    pub fn hopping_y(&self) -> f64 {
        (2.0 * self.mass * self.lattice.dy().powi(2)).recip()
    }

    /// Diagonal part of the discrete kinetic operator, `2 t_x + 2 t_y`.
    ///
    /// This is a constant energy shift; it is folded into the potential step.
    pub fn kinetic_diagonal(&self) -> f64 {
        2.0 * (self.hopping_x() + self.hopping_y())
    }

    /// Amplitude `w` of the bond between column `j` and `j + 1` in a row at
    /// physical height `y`, including the rotating-frame current.
    pub fn row_bond(&self, y: f64) -> C64 {
        let alpha = -self.omega * (y - self.rotation_center.1)
            / (2.0 * self.lattice.dx());
        C64::new(-self.hopping_x(), alpha)
    }

    /// Amplitude `w` of the bond between row `i` and `i + 1` in a column at
    /// physical position `x`, including the rotating-frame current.
    pub fn column_bond(&self, x: f64) -> C64 {
        let alpha = self.omega * (x - self.rotation_center.0)
            / (2.0 * self.lattice.dy());
        C64::new(-self.hopping_y(), alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Geometry;

    #[test]
    fn coefficients_follow_mass_and_spacing() {
        let lattice = Lattice::single(Geometry::square(16, 8.0, 4.0)).unwrap();
        let h = Hamiltonian::new(&lattice, 2.0, 0.0).unwrap();
        // dx = 0.5, dy = 0.25
        assert!((h.hopping_x() - 1.0).abs() < 1e-15);
        assert!((h.hopping_y() - 4.0).abs() < 1e-15);
        assert!((h.kinetic_diagonal() - 10.0).abs() < 1e-15);
        assert_eq!(h.row_bond(3.0).im, 0.0);
    }

    #[test]
    fn closed_edges_hold_no_potential() {
        let lattice = Lattice::single(Geometry::square(8, 8.0, 8.0)).unwrap();
        let mut h = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
        h.constant_potential(3.0).unwrap();
        let v = h.potential();
        assert_eq!(v[[0, 0]], 0.0);
        assert_eq!(v[[4, 4]], 3.0);
        assert_eq!(v.sum(), 3.0 * 64.0);
    }
}
