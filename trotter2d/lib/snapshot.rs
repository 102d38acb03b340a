//! Gathered wavefunctions with their physical metadata.
//!
//! A [`Snapshot`] is what the solver hands to whatever writes or plots the
//! state: the full global array assembled on one worker, together with
//! everything needed to interpret it. Momentum-space quantities are computed
//! here, on the assembled array, rather than on distributed tiles.

use std::f64::consts::TAU;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rustfft as fft;
use crate::lattice::Lattice;

/// Generate an array of frequency-space coordinates to accompany a FFT of `n`
/// points for sampling interval `d`, in the same (unshifted) order as the FFT
/// output.
pub fn fft_freq(n: usize, d: f64) -> nd::Array1<f64> {
    let scale = (n as f64 * d).recip();
    let positive = (n + 1) / 2;
    (0..n)
        .map(|k| {
            if k < positive {
                k as f64 * scale
            } else {
                -((n - k) as f64) * scale
            }
        })
        .collect()
}

/// Angular wavenumbers `2π f` accompanying a FFT of `n` points spaced by `d`.
pub fn wavenumbers(n: usize, d: f64) -> nd::Array1<f64> {
    fft_freq(n, d).mapv(|f| TAU * f)
}

// forward FFT of every lane of `a` along `axis`
fn fft_axis(a: &mut nd::Array2<C64>, axis: nd::Axis, planner: &mut fft::FftPlanner<f64>) {
    let n = a.len_of(axis);
    let plan = planner.plan_fft_forward(n);
    let mut buf: Vec<C64> = vec![C64::new(0.0, 0.0); n];
    for mut lane in a.lanes_mut(axis) {
        buf.iter_mut().zip(lane.iter())
            .for_each(|(b, l)| { *b = *l; });
        plan.process(&mut buf);
        lane.iter_mut().zip(buf.iter())
            .for_each(|(l, b)| { *l = *b; });
    }
}

/// Momentum-space representation of a snapshot.
#[derive(Clone, Debug)]
pub struct MomentumDensity {
    /// Wavenumbers along *x*, indexing columns of `density`.
    pub kx: nd::Array1<f64>,
    /// Wavenumbers along *y*, indexing rows of `density`.
    pub ky: nd::Array1<f64>,
    /// `|φ(k_x, k_y)|²`, normalized so that its integral over `dk_x dk_y`
    /// equals the position-space norm.
    pub density: nd::Array2<f64>,
}

impl MomentumDensity {
    /// `⟨(k_x, k_y)⟩`.
    pub fn mean(&self) -> (f64, f64) {
        let total = self.density.sum();
        let kx_mean
            = nd::Zip::from(self.density.columns()).and(&self.kx)
            .fold(0.0, |acc, col, k| acc + k * col.sum());
        let ky_mean
            = nd::Zip::from(self.density.rows()).and(&self.ky)
            .fold(0.0, |acc, row, k| acc + k * row.sum());
        (kx_mean / total, ky_mean / total)
    }
}

/// A global wavefunction assembled on one worker.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub label: String,
    /// `rows × cols` amplitudes; rows index *y*.
    pub amplitudes: nd::Array2<C64>,
    pub length_x: f64,
    pub length_y: f64,
    pub dx: f64,
    pub dy: f64,
    /// Cumulative number of steps applied before the snapshot was taken.
    pub iterations: usize,
    /// Cumulative simulated time.
    pub elapsed_time: f64,
}

impl Snapshot {
    pub fn new(
        label: &str,
        amplitudes: nd::Array2<C64>,
        lattice: &Lattice,
        iterations: usize,
        elapsed_time: f64,
    ) -> Self
    {
        Self {
            label: label.to_string(),
            amplitudes,
            length_x: lattice.length_x(),
            length_y: lattice.length_y(),
            dx: lattice.dx(),
            dy: lattice.dy(),
            iterations,
            elapsed_time,
        }
    }

    /// Number of grid points along *y*.
    pub fn rows(&self) -> usize { self.amplitudes.nrows() }

    /// Number of grid points along *x*.
    pub fn cols(&self) -> usize { self.amplitudes.ncols() }

    /// Probability density `|ψ|²`.
    pub fn density(&self) -> nd::Array2<f64> {
        self.amplitudes.mapv(|psi| psi.norm_sqr())
    }

    /// Complex phase of every amplitude, in `(-π, π]`.
    pub fn phase(&self) -> nd::Array2<f64> {
        self.amplitudes.mapv(|psi| psi.arg())
    }

    /// `Σ |ψ|² dx dy`.
    pub fn norm2(&self) -> f64 {
        self.amplitudes.iter().map(|psi| psi.norm_sqr()).sum::<f64>()
            * self.dx * self.dy
    }

    /// Physical coordinates of the columns.
    pub fn x(&self) -> nd::Array1<f64> {
        (0..self.cols()).map(|j| j as f64 * self.dx).collect()
    }

    /// Physical coordinates of the rows.
    pub fn y(&self) -> nd::Array1<f64> {
        (0..self.rows()).map(|i| i as f64 * self.dy).collect()
    }

    /// Momentum-space density via a 2D FFT, with continuum normalization
    /// `φ(k) = dx dy / 2π Σ ψ(r) exp(-i k·r)`.
    pub fn momentum_density(&self) -> MomentumDensity {
        let mut phi = self.amplitudes.clone();
        let mut planner = fft::FftPlanner::new();
        fft_axis(&mut phi, nd::Axis(1), &mut planner);
        fft_axis(&mut phi, nd::Axis(0), &mut planner);
        let scale = (self.dx * self.dy / TAU).powi(2);
        MomentumDensity {
            kx: wavenumbers(self.cols(), self.dx),
            ky: wavenumbers(self.rows(), self.dy),
            density: phi.mapv(|p| p.norm_sqr() * scale),
        }
    }

    /// `⟨(k_x, k_y)⟩`.
    pub fn mean_momentum(&self) -> (f64, f64) { self.momentum_density().mean() }
}
