//! Local wavefunction storage.

use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::{
    comm::{ Communicator, Payload, Tag },
    error::{ CommError, DomainError, TsResult },
    lattice::{ Lattice, HALO },
};

/// Complex amplitudes on one worker's tile of a [`Lattice`].
///
/// The interior holds the amplitudes this worker owns; the [`HALO`]-wide border
/// mirrors the neighbours' interiors as of the last halo exchange. Cells beyond
/// a closed edge of the domain are always zero.
#[derive(Clone, Debug)]
pub struct State<'a> {
    lattice: &'a Lattice,
    psi: nd::Array2<C64>,
    time: f64,
    halo_stale: bool,
}

impl<'a> State<'a> {
    /// Allocate a zero wavefunction on `lattice`.
    pub fn new(lattice: &'a Lattice) -> Self {
        Self {
            lattice,
            psi: nd::Array2::zeros(lattice.tile_shape()),
            time: 0.0,
            halo_stale: true,
        }
    }

    /// Allocate a wavefunction and [initialize][Self::init_state] it from `f`.
    pub fn from_fn<F>(lattice: &'a Lattice, f: F) -> TsResult<Self>
    where F: Fn(f64, f64) -> C64
    {
        let mut state = Self::new(lattice);
        state.init_state(f)?;
        Ok(state)
    }

    pub fn lattice(&self) -> &'a Lattice { self.lattice }

    /// Evaluate `f(x, y)` at every interior point, with `(x, y)` the global
    /// physical position of the point.
    ///
    /// The halo is left for the next exchange to fill.
    pub fn init_state<F>(&mut self, f: F) -> TsResult<()>
    where F: Fn(f64, f64) -> C64
    {
        let lattice = self.lattice;
        let mut interior = interior_mut(&mut self.psi);
        for ((i, j), psi_ij) in interior.indexed_iter_mut() {
            let (x, y) = lattice.position(i, j);
            let value = f(x, y);
            if !value.is_finite() {
                return Err(DomainError::NonFiniteAmplitude { x, y }.into());
            }
            *psi_ij = value;
        }
        self.halo_stale = true;
        Ok(())
    }

    /// Copy this worker's block out of a full `rows × cols` global array.
    pub fn init_from_global<S>(&mut self, global: &nd::ArrayBase<S, nd::Ix2>)
        -> TsResult<()>
    where S: nd::Data<Elem = C64>
    {
        let (rows, cols) = (self.lattice.rows(), self.lattice.cols());
        let (got_rows, got_cols) = global.dim();
        if (got_rows, got_cols) != (rows, cols) {
            return Err(
                DomainError::ShapeMismatch { rows, cols, got_rows, got_cols }
                .into()
            );
        }
        let ext = self.lattice.extent();
        let block = global.slice(nd::s![
            ext.row_offset..ext.row_offset + ext.rows,
            ext.col_offset..ext.col_offset + ext.cols
        ]);
        if let Some(((i, j), _))
            = block.indexed_iter().find(|(_, psi_ij)| !psi_ij.is_finite())
        {
            let (x, y) = self.lattice.position(i, j);
            return Err(DomainError::NonFiniteAmplitude { x, y }.into());
        }
        interior_mut(&mut self.psi).assign(&block);
        self.halo_stale = true;
        Ok(())
    }

    /// View of the owned amplitudes.
    pub fn interior(&self) -> nd::ArrayView2<'_, C64> {
        self.psi.slice(interior_slice(self.psi.dim()))
    }

    /// View of the whole tile, halo included.
    pub fn tile(&self) -> nd::ArrayView2<'_, C64> { self.psi.view() }

    pub(crate) fn tile_mut(&mut self) -> &mut nd::Array2<C64> {
        self.halo_stale = true;
        &mut self.psi
    }

    /// Cumulative evolution time applied to this state.
    pub fn time(&self) -> f64 { self.time }

    pub(crate) fn advance_time(&mut self, dt: f64) { self.time += dt; }

    /// Whether the halo is out of date with respect to the neighbours.
    pub fn halo_stale(&self) -> bool { self.halo_stale }

    pub(crate) fn mark_halo_fresh(&mut self) { self.halo_stale = false; }

    /// `Σ |ψ|² dx dy` over the owned cells.
    pub fn local_norm2(&self) -> f64 {
        self.interior().iter().map(|psi_ij| psi_ij.norm_sqr()).sum::<f64>()
            * self.lattice.cell_area()
    }

    /// `Σ |ψ|² dx dy` over the whole group.
    ///
    /// This is a collective operation: every worker must call it.
    pub fn norm2(&self, comm: &dyn Communicator) -> TsResult<f64> {
        Ok(comm.all_reduce_sum(self.local_norm2())?)
    }

    /// Multiply every amplitude, halo included, by `scale`.
    pub fn rescale(&mut self, scale: f64) {
        self.psi.map_inplace(|psi_ij| { *psi_ij *= scale; });
    }

    /// Global index of the first non-finite owned amplitude, if any.
    pub fn find_non_finite(&self) -> Option<(usize, usize)> {
        self.interior().indexed_iter()
            .find(|(_, psi_ij)| !psi_ij.is_finite())
            .map(|((i, j), _)| self.lattice.local_to_global(i, j))
    }

    /// Assemble the global `rows × cols` wavefunction on `root`.
    ///
    /// Returns `Some` on `root` and `None` everywhere else. This is a
    /// collective operation: every worker must call it.
    pub fn gather(&self, comm: &dyn Communicator, root: usize)
        -> TsResult<Option<nd::Array2<C64>>>
    {
        let rank = comm.rank();
        self.lattice.check_group(rank, comm.size())?;
        if root >= comm.size() {
            return Err(CommError::NoSuchPeer { peer: root, size: comm.size() }.into());
        }
        if rank != root {
            let block: Vec<C64> = self.interior().iter().copied().collect();
            comm.send(root, Tag::Gather, Payload::Amplitudes(block))?;
            return Ok(None);
        }
        let mut global: nd::Array2<C64>
            = nd::Array2::from_elem(
                (self.lattice.rows(), self.lattice.cols()), C64::zero());
        for peer in 0..comm.size() {
            let ext = self.lattice.extent_of(peer);
            let mut target = global.slice_mut(nd::s![
                ext.row_offset..ext.row_offset + ext.rows,
                ext.col_offset..ext.col_offset + ext.cols
            ]);
            if peer == rank {
                target.assign(&self.interior());
                continue;
            }
            let block
                = comm.recv(peer, Tag::Gather)?
                .into_amplitudes(peer, Tag::Gather)?;
            if block.len() != ext.rows * ext.cols {
                return Err(CommError::BadLength {
                    peer,
                    tag: Tag::Gather,
                    expected: ext.rows * ext.cols,
                    got: block.len(),
                }.into());
            }
            target.iter_mut().zip(block)
                .for_each(|(t, b)| { *t = b; });
        }
        Ok(Some(global))
    }
}

pub(crate) fn interior_slice((rows, cols): (usize, usize))
    -> nd::SliceInfo<[nd::SliceInfoElem; 2], nd::Ix2, nd::Ix2>
{
    nd::s![HALO..rows - HALO, HALO..cols - HALO]
}

pub(crate) fn interior_mut(psi: &mut nd::Array2<C64>) -> nd::ArrayViewMut2<'_, C64> {
    let dim = psi.dim();
    psi.slice_mut(interior_slice(dim))
}
