//! MPI backend for [`Communicator`].
//!
//! Requires the `mpi` feature and an MPI installation. The caller initializes
//! MPI and passes the world communicator to [`MpiComm::new`], which arranges
//! the processes as a periodic cartesian grid with rank reordering enabled.
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new(&universe.world())?;
//! let ctx = GridContext::new::<f64>(&comm, MpiComm::RANK_ORDER)?;
//! ```
//!
//! Non-blocking transfers are posted with `immediate_send`/`immediate_receive`
//! inside an `mpi::request::scope` that spans the overlapped work, so the
//! scope guarantees every request completes before its buffer is released.

use log::{debug, trace};
use mpi::datatype::Equivalence;
use mpi::point_to_point::{self as p2p, Destination, Source, Status};
use mpi::topology::{CartesianCommunicator, Communicator as _, SimpleCommunicator};
use mpi::{Count, Rank};

use crate::comm::{Communicator, Request, Tag};
use crate::error::{communication_error, shape_mismatch, Result};
use crate::tile::Element;
use crate::topology::{Axis, Coords, ProcessGrid, RankOrder, Shift};

/// Communicator endpoint backed by an MPI cartesian communicator.
pub struct MpiComm {
    cart: CartesianCommunicator,
    grid: ProcessGrid,
    rank: usize,
}

impl MpiComm {
    /// MPI numbers cartesian ranks in row-major order.
    pub const RANK_ORDER: RankOrder = RankOrder::RowMajor;

    /// Arranges the processes of `world` as a periodic `s x s` grid.
    ///
    /// Fails with [`CannonError::InvalidTopology`](crate::error::CannonError)
    /// if the world size is not a perfect square.
    pub fn new(world: &SimpleCommunicator) -> Result<Self> {
        let grid = ProcessGrid::new(world.size() as usize, Self::RANK_ORDER)?;
        let side = grid.side() as Count;
        let cart = world
            .create_cartesian_communicator(&[side, side], &[true, true], true)
            .ok_or_else(|| {
                communication_error(world.rank() as usize, "left out of the cartesian grid")
            })?;

        let comm = Self {
            rank: cart.rank() as usize,
            cart,
            grid,
        };
        comm.check_layout()?;
        debug!(
            "world rank {} is grid rank {} at {:?}",
            world.rank(),
            comm.rank,
            comm.coords()
        );
        Ok(comm)
    }

    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    /// Coordinates of this process as MPI placed it.
    pub fn coords(&self) -> Coords {
        let c = self.cart.rank_to_coordinates(self.cart.rank());
        Coords {
            row: c[0] as usize,
            col: c[1] as usize,
        }
    }

    /// Source and destination of a cyclic shift, as resolved by MPI.
    pub fn shift(&self, axis: Axis, displacement: isize) -> Result<Shift> {
        // Dimension 0 is the row index, so a shift along a row moves dimension 1.
        let dimension = match axis {
            Axis::Row => 1,
            Axis::Column => 0,
        };
        match self.cart.shift(dimension, displacement as Count) {
            (Some(source), Some(dest)) => Ok(Shift {
                source: source as usize,
                dest: dest as usize,
            }),
            _ => Err(communication_error(self.rank, format!("{axis:?} axis is not periodic"))),
        }
    }

    // The grid arithmetic used by the algorithm must match the layout MPI chose.
    fn check_layout(&self) -> Result<()> {
        let placed = self.coords();
        let expected = self.grid.coords_of(self.rank);
        if placed != expected {
            return Err(communication_error(
                self.rank,
                format!("MPI placed the process at {placed:?}, expected {expected:?}"),
            ));
        }
        for axis in [Axis::Row, Axis::Column] {
            let resolved = self.shift(axis, -1)?;
            let computed = self.grid.shift(self.rank, axis, -1);
            if resolved != computed {
                return Err(communication_error(
                    self.rank,
                    format!("{axis:?} neighbors {resolved:?} disagree with {computed:?}"),
                ));
            }
        }
        Ok(())
    }

    fn peer(&self, rank: usize) -> Result<Rank> {
        if rank < self.grid.size() {
            Ok(rank as Rank)
        } else {
            Err(communication_error(self.rank, format!("rank {rank} does not exist")))
        }
    }
}

impl<T: Element + Equivalence> Communicator<T> for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.grid.size()
    }

    fn sendrecv_replace(
        &self,
        buf: &mut [T],
        dest: usize,
        source: usize,
        tag: Tag,
    ) -> Result<()> {
        let dest = self.cart.process_at_rank(self.peer(dest)?);
        let source = self.cart.process_at_rank(self.peer(source)?);
        let tag = tag as mpi::Tag;
        let status = p2p::send_receive_replace_into_with_tags(buf, &dest, tag, &source, tag);
        check_count::<T>(self.rank, &status, buf.len())
    }

    fn isend<'a>(&self, buf: &'a [T], dest: usize, tag: Tag) -> Result<Request<'a, T>> {
        self.peer(dest)?;
        Ok(Request::Send { buf, dest, tag })
    }

    fn irecv<'a>(&self, buf: &'a mut [T], source: usize, tag: Tag) -> Result<Request<'a, T>> {
        self.peer(source)?;
        Ok(Request::Recv { buf, source, tag })
    }

    fn wait(&self, request: Request<'_, T>) -> Result<()> {
        self.overlap([request], || ())
    }

    fn wait_all<'a, I>(&self, requests: I) -> Result<()>
    where
        I: IntoIterator<Item = Request<'a, T>>,
        T: 'a,
    {
        self.overlap(requests, || ())
    }

    fn overlap<'a, I, R, F>(&self, requests: I, work: F) -> Result<R>
    where
        I: IntoIterator<Item = Request<'a, T>>,
        T: 'a,
        F: FnOnce() -> R,
    {
        let requests: Vec<_> = requests.into_iter().collect();
        // Peers are checked before anything is posted; a request dropped
        // inside the scope without completing panics.
        for request in &requests {
            match request {
                Request::Send { dest, .. } => self.peer(*dest)?,
                Request::Recv { source, .. } => self.peer(*source)?,
            };
        }

        mpi::request::scope(|scope| {
            let pending: Vec<_> = requests
                .into_iter()
                .map(|request| match request {
                    Request::Send { buf, dest, tag } => {
                        trace!(
                            "rank {} -> {}: {} elements, tag {}",
                            self.rank,
                            dest,
                            buf.len(),
                            tag
                        );
                        let process = self.cart.process_at_rank(dest as Rank);
                        (process.immediate_send_with_tag(scope, buf, tag as mpi::Tag), None)
                    }
                    Request::Recv { buf, source, tag } => {
                        let expected = buf.len();
                        let process = self.cart.process_at_rank(source as Rank);
                        let request =
                            process.immediate_receive_into_with_tag(scope, buf, tag as mpi::Tag);
                        (request, Some(expected))
                    }
                })
                .collect();

            let out = work();

            let mut outcome = Ok(());
            for (request, expected) in pending {
                let status = request.wait();
                if let (Some(expected), Ok(())) = (expected, &outcome) {
                    outcome = check_count::<T>(self.rank, &status, expected);
                }
            }
            outcome.map(|()| out)
        })
    }
}

fn check_count<T: Equivalence>(rank: usize, status: &Status, expected: usize) -> Result<()> {
    let actual = status.count(T::equivalent_datatype()) as usize;
    if actual == expected {
        Ok(())
    } else {
        Err(shape_mismatch(
            expected,
            actual,
            format!(
                "rank {rank} got a message of the wrong size from rank {}",
                status.source_rank()
            ),
        ))
    }
}
