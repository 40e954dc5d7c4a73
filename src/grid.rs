//! Per-process view of the grid, threaded through every core operation.

use crate::comm::Communicator;
use crate::error::{invalid_topology, Result};
use crate::tile::Element;
use crate::topology::{Axis, Coords, Neighbors, ProcessGrid, RankOrder, Shift};

/// A communicator bound to a [`ProcessGrid`], with this process's position
/// and neighbors resolved once up front.
pub struct GridContext<'c, C> {
    comm: &'c C,
    grid: ProcessGrid,
    rank: usize,
    coords: Coords,
    neighbors: Neighbors,
}

impl<'c, C> GridContext<'c, C> {
    /// Arranges the processes of `comm` as a square torus.
    ///
    /// Fails with [`CannonError::InvalidTopology`](crate::error::CannonError)
    /// if the communicator size is not a perfect square.
    pub fn new<T: Element>(comm: &'c C, order: RankOrder) -> Result<Self>
    where
        C: Communicator<T>,
    {
        let grid = ProcessGrid::new(comm.size(), order)?;
        let rank = comm.rank();
        if rank >= grid.size() {
            return Err(invalid_topology(comm.size()));
        }
        Ok(Self {
            comm,
            grid,
            rank,
            coords: grid.coords_of(rank),
            neighbors: grid.neighbors(rank),
        })
    }

    pub fn comm(&self) -> &'c C {
        self.comm
    }

    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn coords(&self) -> Coords {
        self.coords
    }

    pub fn neighbors(&self) -> Neighbors {
        self.neighbors
    }

    /// Grid side length `s`.
    pub fn side(&self) -> usize {
        self.grid.side()
    }

    /// Source and destination for shifting this process's data by
    /// `displacement` along `axis`.
    pub fn shift(&self, axis: Axis, displacement: isize) -> Shift {
        self.grid.shift(self.rank, axis, displacement)
    }
}
