//! Ghost-cell exchange between neighbouring tiles.
//!
//! The exchange runs in two phases. First the interior rows' left and right
//! strips are swapped with the horizontal neighbours; then full-width strips,
//! which now include the freshly received side halos, are swapped with the
//! vertical neighbours. The second phase therefore also fills the corners.
//!
//! A neighbour that is this worker itself (a periodic axis that is not split)
//! is served by a local copy; a missing neighbour (closed edge) leaves a zero
//! halo.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    comm::{ Communicator, Payload, Tag },
    error::{ CommError, TsResult },
    lattice::{ Direction, HALO },
    state::State,
};

// one strip leaving the tile: where it goes and which way it travels
struct Outgoing {
    to: Option<usize>,
    travel: Direction,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
}

// one strip arriving into the halo: who sends it and which way it travels
struct Incoming {
    from: Option<usize>,
    travel: Direction,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
}

/// Refresh every halo cell of `state` from the neighbouring workers.
///
/// This is a collective operation over the neighbours: every worker must call
/// it the same number of times.
pub fn exchange(state: &mut State<'_>, comm: &dyn Communicator) -> TsResult<()> {
    let lattice = state.lattice();
    let ext = lattice.extent();
    let (lr, lc) = (ext.rows, ext.cols);
    let (tr, tc) = ext.tile_shape();
    let h = HALO;

    let horizontal = (
        [
            Outgoing {
                to: lattice.neighbor(Direction::Left),
                travel: Direction::Left,
                rows: h..h + lr,
                cols: h..2 * h,
            },
            Outgoing {
                to: lattice.neighbor(Direction::Right),
                travel: Direction::Right,
                rows: h..h + lr,
                cols: lc..lc + h,
            },
        ],
        [
            // the left halo holds what travelled rightward out of the left
            // neighbour
            Incoming {
                from: lattice.neighbor(Direction::Left),
                travel: Direction::Right,
                rows: h..h + lr,
                cols: 0..h,
            },
            Incoming {
                from: lattice.neighbor(Direction::Right),
                travel: Direction::Left,
                rows: h..h + lr,
                cols: lc + h..tc,
            },
        ],
    );
    let vertical = (
        [
            Outgoing {
                to: lattice.neighbor(Direction::Up),
                travel: Direction::Up,
                rows: h..2 * h,
                cols: 0..tc,
            },
            Outgoing {
                to: lattice.neighbor(Direction::Down),
                travel: Direction::Down,
                rows: lr..lr + h,
                cols: 0..tc,
            },
        ],
        [
            Incoming {
                from: lattice.neighbor(Direction::Up),
                travel: Direction::Down,
                rows: 0..h,
                cols: 0..tc,
            },
            Incoming {
                from: lattice.neighbor(Direction::Down),
                travel: Direction::Up,
                rows: lr + h..tr,
                cols: 0..tc,
            },
        ],
    );

    let rank = comm.rank();
    let psi = state.tile_mut();
    for (outgoing, incoming) in [horizontal, vertical] {
        let mut local: Vec<(Direction, Vec<C64>)> = Vec::new();
        for out in outgoing.iter() {
            let Some(dest) = out.to else { continue; };
            let strip: Vec<C64>
                = psi.slice(nd::s![out.rows.clone(), out.cols.clone()])
                .iter().copied().collect();
            if dest == rank {
                local.push((out.travel, strip));
            } else {
                comm.send(dest, Tag::Halo(out.travel), Payload::Amplitudes(strip))?;
            }
        }
        for inc in incoming.iter() {
            let mut target
                = psi.slice_mut(nd::s![inc.rows.clone(), inc.cols.clone()]);
            let Some(src) = inc.from else {
                target.fill(C64::new(0.0, 0.0));
                continue;
            };
            let tag = Tag::Halo(inc.travel);
            let strip
                = if src == rank {
                    local.iter()
                        .position(|(travel, _)| *travel == inc.travel)
                        .map(|k| local.swap_remove(k).1)
                        .ok_or(CommError::UnexpectedPayload { peer: src, tag })?
                } else {
                    comm.recv(src, tag)?.into_amplitudes(src, tag)?
                };
            if strip.len() != target.len() {
                return Err(CommError::BadLength {
                    peer: src,
                    tag,
                    expected: target.len(),
                    got: strip.len(),
                }.into());
            }
            target.iter_mut().zip(strip)
                .for_each(|(t, s)| { *t = s; });
        }
    }
    state.mark_halo_fresh();
    Ok(())
}
