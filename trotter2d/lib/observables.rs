//! Collective expectation values.
//!
//! Every quantity here is evaluated with the same finite-difference
//! Hamiltonian that the bond splitting integrates, so in real time the total
//! energy is conserved up to the splitting error. All functions are
//! collective: each worker sums over the cells it owns (bonds are attributed
//! to their lower-index cell) and a single reduction combines the parts.

use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };
use crate::{
    comm::Communicator,
    error::{ NumericalError, TsResult },
    halo,
    hamiltonian::Hamiltonian,
    lattice::HALO,
    state::State,
};

/// Energy expectation values per unit norm.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Energies {
    /// `⟨-∇²/2m⟩`
    pub kinetic: f64,
    /// `⟨V⟩`
    pub potential: f64,
    /// `⟨g |ψ|² / 2⟩`
    pub interaction: f64,
    /// `⟨-Ω L_z⟩`
    pub rotation: f64,
    /// Sum of the above.
    pub total: f64,
    /// `Σ |ψ|² dx dy` of the state they were measured on.
    pub norm2: f64,
}

fn conj_mul(p: C64, q: C64) -> C64 { p.conj() * q }

// reduced Σ|ψ|² must be usable as a divisor
fn check_weight(weight: f64, cell_area: f64) -> TsResult<()> {
    (weight > 0.0 && weight.is_finite()).then_some(())
        .ok_or(NumericalError::EmptyState { norm2: weight * cell_area }.into())
}

/// Compute the [`Energies`] of `state` under `hamiltonian`.
///
/// Halos are refreshed first if they are stale.
pub fn energies(
    state: &mut State<'_>,
    hamiltonian: &Hamiltonian<'_>,
    comm: &dyn Communicator,
) -> TsResult<Energies>
{
    if state.halo_stale() { halo::exchange(state, comm)?; }
    let lattice = state.lattice();
    let psi = state.tile();
    let v = hamiltonian.potential();
    let diagonal = hamiltonian.kinetic_diagonal();
    let g = hamiltonian.coupling();
    let ext = lattice.extent();

    let mut sums = [0.0_f64; 5];
    for i in 0..ext.rows {
        for j in 0..ext.cols {
            let (ti, tj) = (i + HALO, j + HALO);
            let (gi, gj) = lattice.local_to_global(i, j);
            let (x, y) = lattice.global_position(gi, gj);
            let p = psi[[ti, tj]];
            let n = p.norm_sqr();
            sums[0] += n;
            sums[1] += diagonal * n;
            sums[2] += v[[ti, tj]] * n;
            sums[3] += 0.5 * g * n * n;
            // each bond enters <ψ|h|ψ> as 2 Re(p* w q)
            if lattice.wrap_col(gj as isize + 1).is_some() {
                let pq = conj_mul(p, psi[[ti, tj + 1]]);
                let w = hamiltonian.row_bond(y);
                sums[1] += 2.0 * w.re * pq.re;
                sums[4] -= 2.0 * w.im * pq.im;
            }
            if lattice.wrap_row(gi as isize + 1).is_some() {
                let pq = conj_mul(p, psi[[ti + 1, tj]]);
                let w = hamiltonian.column_bond(x);
                sums[1] += 2.0 * w.re * pq.re;
                sums[4] -= 2.0 * w.im * pq.im;
            }
        }
    }
    let totals = comm.all_reduce(&sums)?;
    check_weight(totals[0], lattice.cell_area())?;
    let norm2 = totals[0] * lattice.cell_area();
    let per_norm = |s: f64| s / totals[0];
    let kinetic = per_norm(totals[1]);
    let potential = per_norm(totals[2]);
    let interaction = per_norm(totals[3]);
    let rotation = per_norm(totals[4]);
    Ok(Energies {
        kinetic,
        potential,
        interaction,
        rotation,
        total: kinetic + potential + interaction + rotation,
        norm2,
    })
}

/// Compute the mean position `⟨(x, y)⟩` of `state`.
///
/// Positions are measured in the unwrapped global frame, so on a periodic
/// axis the result is only meaningful for a well-localized state.
pub fn mean_position(state: &State<'_>, comm: &dyn Communicator)
    -> TsResult<(f64, f64)>
{
    let lattice = state.lattice();
    let mut sums = [0.0_f64; 3];
    for ((i, j), p) in state.interior().indexed_iter() {
        let (x, y) = lattice.position(i, j);
        let n = p.norm_sqr();
        sums[0] += n;
        sums[1] += x * n;
        sums[2] += y * n;
    }
    let totals = comm.all_reduce(&sums)?;
    check_weight(totals[0], lattice.cell_area())?;
    Ok((totals[1] / totals[0], totals[2] / totals[0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ comm::Solo, error::TsError, lattice::{ Geometry, Lattice } };

    #[test]
    fn uniform_periodic_state_has_no_kinetic_energy() {
        let geometry = Geometry::square(8, 8.0, 8.0).with_periodic(true, true);
        let lattice = Lattice::single(geometry).unwrap();
        let mut state
            = State::from_fn(&lattice, |_, _| C64::new(0.125, 0.0)).unwrap();
        let mut h = Hamiltonian::new(&lattice, 1.0, 2.0).unwrap();
        h.constant_potential(0.5).unwrap();
        let e = energies(&mut state, &h, &Solo).unwrap();
        assert!(e.kinetic.abs() < 1e-14);
        assert!((e.potential - 0.5).abs() < 1e-14);
        assert!(e.rotation.abs() < 1e-14);
        // |ψ|² = 1/64 everywhere, interaction = g/2 |ψ|²
        assert!((e.interaction - 1.0 / 64.0).abs() < 1e-14);
        assert!((e.norm2 - 1.0).abs() < 1e-14);
    }

    #[test]
    fn mean_position_of_a_point() {
        let lattice = Lattice::single(Geometry::square(8, 4.0, 8.0)).unwrap();
        let state = State::from_fn(&lattice, |x, y| {
            if x == 1.5 && y == 3.0 { C64::new(1.0, 0.0) } else { C64::new(0.0, 0.0) }
        }).unwrap();
        let (x, y) = mean_position(&state, &Solo).unwrap();
        assert_eq!((x, y), (1.5, 3.0));
    }

    #[test]
    fn zero_state_has_no_expectation_values() {
        let lattice = Lattice::single(Geometry::square(8, 8.0, 8.0)).unwrap();
        let mut state = State::new(&lattice);
        let h = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
        assert!(matches!(
            energies(&mut state, &h, &Solo),
            Err(TsError::Numerical(NumericalError::EmptyState { norm2 })) if norm2 == 0.0
        ));
        assert!(matches!(
            mean_position(&state, &Solo),
            Err(TsError::Numerical(NumericalError::EmptyState { .. }))
        ));
    }
}
