//! Fatal preconditions and failure propagation.

use cannon::cannon::multiply;
use cannon::error::shape_mismatch;
use cannon::{
    CannonConfig, CannonError, Cluster, DistributedMatMul, ProcessGrid, RankOrder, Schedule, Tile,
};
use ndarray::Array2;

#[test]
fn test_six_processes_is_invalid_topology() {
    assert_eq!(
        ProcessGrid::new(6, RankOrder::RowMajor).unwrap_err(),
        CannonError::InvalidTopology { processes: 6 }
    );
    assert!(matches!(
        Cluster::new(CannonConfig::new(6)),
        Err(CannonError::InvalidTopology { processes: 6 })
    ));
    assert!(matches!(
        DistributedMatMul::new(CannonConfig::new(6)),
        Err(CannonError::InvalidTopology { processes: 6 })
    ));
}

#[test]
fn test_zero_processes_is_invalid_topology() {
    assert!(matches!(
        Cluster::new(CannonConfig::new(0)),
        Err(CannonError::InvalidTopology { processes: 0 })
    ));
}

#[test]
fn test_huge_process_count_is_invalid_topology() {
    for processes in [usize::MAX - 1, usize::MAX] {
        assert!(matches!(
            Cluster::new(CannonConfig::new(processes)),
            Err(CannonError::InvalidTopology { .. })
        ));
    }
}

#[test]
fn test_order_not_divisible_by_grid_side() {
    let engine = DistributedMatMul::new(CannonConfig::new(4)).unwrap();
    let a = Array2::<f64>::zeros((5, 5));
    assert!(matches!(
        engine.run(&a, &a),
        Err(CannonError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_non_square_or_mismatched_operands() {
    let engine = DistributedMatMul::new(CannonConfig::new(4)).unwrap();
    let square = Array2::<f64>::zeros((4, 4));
    let rect = Array2::<f64>::zeros((4, 6));
    let bigger = Array2::<f64>::zeros((8, 8));

    assert!(matches!(
        engine.run(&rect, &rect),
        Err(CannonError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        engine.run(&square, &bigger),
        Err(CannonError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_disagreeing_tile_sides_abort_the_run() {
    let cluster = Cluster::new(CannonConfig::new(4)).unwrap();
    for schedule in [Schedule::Blocking, Schedule::NonBlocking] {
        let err = cluster
            .run::<i32, (), _>(|ctx| {
                // Rank 3 holds bigger tiles than everyone else.
                let side = if ctx.rank() == 3 { 3 } else { 2 };
                let mut a = Tile::identity(side);
                let mut b = Tile::identity(side);
                let mut c = Tile::zeros(side);
                multiply(ctx, schedule, &mut a, &mut b, &mut c)
            })
            .unwrap_err();
        assert!(
            matches!(err, CannonError::ShapeMismatch { .. }),
            "{schedule}: {err}"
        );
    }
}

#[test]
fn test_failed_rank_aborts_its_peers() {
    let cluster = Cluster::new(CannonConfig::new(9)).unwrap();
    let err = cluster
        .run::<f64, (), _>(|ctx| {
            if ctx.rank() == 4 {
                return Err(shape_mismatch(2, 0, "rank 4 could not load its tiles"));
            }
            let mut a = Tile::identity(2);
            let mut b = Tile::identity(2);
            let mut c = Tile::zeros(2);
            multiply(ctx, Schedule::NonBlocking, &mut a, &mut b, &mut c)
        })
        .unwrap_err();
    assert!(matches!(err, CannonError::ShapeMismatch { actual: 0, .. }));
}
