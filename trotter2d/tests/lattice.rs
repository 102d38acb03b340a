use proptest::prelude::*;
use trotter2d::{
    error::{ ConfigError, TsError },
    lattice::{ Direction, Geometry, Lattice, ProcessGrid, HALO },
};

fn geometry(rows: usize, cols: usize) -> Geometry {
    Geometry {
        rows,
        cols,
        length_x: cols as f64,
        length_y: rows as f64,
        periodic_x: false,
        periodic_y: false,
        angular_velocity: 0.0,
    }
}

// Property: every global cell is owned by exactly one worker, and block sizes
// along an axis differ by at most one.
proptest! {
    #[test]
    fn prop_partition_is_complete(rows in 4_usize..60, cols in 4_usize..60, size in 1_usize..10) {
        let geometry = geometry(rows, cols);
        let Ok(lattice) = Lattice::new(geometry, 0, size) else {
            // too fine a split; nothing to check
            return Ok(());
        };
        let mut owners = vec![0_u8; rows * cols];
        let (mut min_rows, mut max_rows) = (usize::MAX, 0);
        let (mut min_cols, mut max_cols) = (usize::MAX, 0);
        for rank in 0..size {
            let ext = lattice.extent_of(rank);
            prop_assert!(ext.rows >= HALO || lattice.process_grid().prows == 1);
            min_rows = min_rows.min(ext.rows);
            max_rows = max_rows.max(ext.rows);
            min_cols = min_cols.min(ext.cols);
            max_cols = max_cols.max(ext.cols);
            for i in ext.row_offset..ext.row_offset + ext.rows {
                for j in ext.col_offset..ext.col_offset + ext.cols {
                    owners[i * cols + j] += 1;
                }
            }
        }
        prop_assert!(owners.iter().all(|&n| n == 1));
        prop_assert!(max_rows - min_rows <= 1);
        prop_assert!(max_cols - min_cols <= 1);
    }
}

// Property: neighbour relations are symmetric.
proptest! {
    #[test]
    fn prop_neighbors_are_symmetric(
        size in 1_usize..10,
        periodic_x in any::<bool>(),
        periodic_y in any::<bool>(),
    ) {
        let geometry = geometry(48, 48).with_periodic(periodic_x, periodic_y);
        for rank in 0..size {
            let lattice = Lattice::new(geometry, rank, size).unwrap();
            for dir in [Direction::Up, Direction::Down, Direction::Left, Direction::Right] {
                let Some(peer) = lattice.neighbor(dir) else { continue; };
                let other = Lattice::new(geometry, peer, size).unwrap();
                prop_assert_eq!(other.neighbor(dir.opposite()), Some(rank));
            }
        }
    }
}

#[test]
fn local_and_global_indices_agree() {
    let lattice
        = Lattice::with_process_grid(geometry(20, 30), 5, ProcessGrid { prows: 2, pcols: 3 })
        .unwrap();
    assert_eq!(lattice.coords(), (1, 2));
    let ext = lattice.extent();
    assert_eq!(ext.row_offset, 10);
    assert_eq!(ext.col_offset, 20);
    assert_eq!(lattice.local_to_global(0, 0), (10, 20));
    assert_eq!(lattice.global_to_local(12, 25), Some((2, 5)));
    assert_eq!(lattice.global_to_local(9, 25), None);
    assert_eq!(lattice.position(1, 2), (22.0, 11.0));
    assert_eq!(lattice.tile_shape(), (10 + 2 * HALO, 10 + 2 * HALO));
}

#[test]
fn closed_edges_have_no_neighbors() {
    let lattice
        = Lattice::with_process_grid(geometry(32, 32), 0, ProcessGrid { prows: 2, pcols: 2 })
        .unwrap();
    assert_eq!(lattice.neighbor(Direction::Up), None);
    assert_eq!(lattice.neighbor(Direction::Left), None);
    assert_eq!(lattice.neighbor(Direction::Down), Some(2));
    assert_eq!(lattice.neighbor(Direction::Right), Some(1));

    let periodic = geometry(32, 32).with_periodic(true, false);
    let single = Lattice::single(periodic).unwrap();
    assert_eq!(single.neighbor(Direction::Left), Some(0));
    assert_eq!(single.neighbor(Direction::Right), Some(0));
    assert_eq!(single.neighbor(Direction::Up), None);
}

#[test]
fn invalid_geometries_are_rejected() {
    let err = Lattice::single(geometry(1, 16)).unwrap_err();
    assert!(matches!(err, TsError::Config(ConfigError::BadDimension { axis: "y", .. })));

    let mut bad_length = geometry(16, 16);
    bad_length.length_x = -1.0;
    let err = Lattice::single(bad_length).unwrap_err();
    assert!(matches!(err, TsError::Config(ConfigError::BadLength { axis: "x", .. })));

    let odd = geometry(16, 15).with_periodic(true, false);
    let err = Lattice::single(odd).unwrap_err();
    assert!(matches!(err, TsError::Config(ConfigError::OddPeriodicAxis { .. })));

    // 16 rows over 5 process rows leaves 3 rows, narrower than the halo
    let err = Lattice::new(geometry(16, 16), 0, 5).unwrap_err();
    assert!(matches!(err, TsError::Config(ConfigError::PartitionTooSmall { .. })));

    let err = Lattice::new(geometry(16, 16), 4, 4).unwrap_err();
    assert!(matches!(err, TsError::Config(ConfigError::RankOutOfRange { .. })));

    let err = Lattice::new(geometry(16, 16), 0, 0).unwrap_err();
    assert!(matches!(err, TsError::Config(ConfigError::EmptyGroup)));
}
