//! MPI backend on a single-process world.
//!
//! MPI can be initialized once per process, so everything runs in one test.
//! Run with `cargo test --features mpi --test mpi`.

#![cfg(feature = "mpi")]

use cannon::cannon::multiply;
use cannon::comm::Communicator;
use cannon::comm_mpi::MpiComm;
use cannon::kernel::mat_mult_seq;
use cannon::topology::Shift;
use cannon::{Axis, CannonError, Coords, GridContext, Schedule, Tile};

#[test]
fn test_single_process_world() {
    let universe = mpi::initialize().unwrap();
    let comm = MpiComm::new(&universe.world()).unwrap();

    assert_eq!(comm.coords(), Coords { row: 0, col: 0 });
    assert_eq!(
        comm.shift(Axis::Row, -1).unwrap(),
        Shift { source: 0, dest: 0 }
    );

    let ctx = GridContext::new::<i64>(&comm, MpiComm::RANK_ORDER).unwrap();
    assert_eq!(ctx.side(), 1);

    let a0 = Tile::from_fn(3, |i, j| (i * 3 + j) as i64 - 4);
    let b0 = Tile::from_fn(3, |i, j| (2 * i + j) as i64);
    let mut expected = vec![0; 9];
    mat_mult_seq(a0.as_slice(), b0.as_slice(), &mut expected, 3);

    for schedule in [Schedule::Blocking, Schedule::NonBlocking] {
        let mut a = a0.clone();
        let mut b = b0.clone();
        let mut c = Tile::zeros(3);
        multiply(&ctx, schedule, &mut a, &mut b, &mut c).unwrap();
        assert_eq!(c.as_slice(), expected.as_slice(), "{schedule}");
        assert_eq!((a, b), (a0.clone(), b0.clone()), "{schedule}");
    }

    // A short message into a longer buffer is reported, not silently padded.
    let mut buf = [0i64; 2];
    let requests = [
        comm.isend(&[7i64], 0, 1).unwrap(),
        comm.irecv(&mut buf, 0, 1).unwrap(),
    ];
    let err = comm.overlap(requests, || ()).unwrap_err();
    assert!(matches!(
        err,
        CannonError::ShapeMismatch {
            expected: 2,
            actual: 1,
            ..
        }
    ));

    assert!(Communicator::<i64>::isend(&comm, &[1], 3, 0).is_err());
}
