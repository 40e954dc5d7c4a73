//! Periodic 2D process grid.
//!
//! `P` processes are laid out as an `s x s` torus, `s = √P`. Every rank has a
//! `(row, col)` coordinate and four wraparound neighbors. The mapping from flat
//! ranks to coordinates is chosen by a [`RankOrder`] and is always a bijection.

use std::fmt;
use std::str::FromStr;

use crate::error::{invalid_topology, Result};

/// Position of a process in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coords {
    pub row: usize,
    pub col: usize,
}

/// Direction of a cyclic shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Along a row: the column changes, the row stays.
    Row,
    /// Along a column: the row changes, the column stays.
    Column,
}

/// How flat ranks are laid onto grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankOrder {
    /// Rank `r` sits at `(r / s, r % s)`.
    #[default]
    RowMajor,
    /// Rank `r` sits at `(r % s, r / s)`.
    ColumnMajor,
}

impl fmt::Display for RankOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankOrder::RowMajor => write!(f, "row-major"),
            RankOrder::ColumnMajor => write!(f, "column-major"),
        }
    }
}

impl FromStr for RankOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "row-major" | "row" => Ok(RankOrder::RowMajor),
            "column-major" | "col-major" | "column" => Ok(RankOrder::ColumnMajor),
            other => Err(format!(
                "unknown rank order '{other}' (expected 'row-major' or 'column-major')"
            )),
        }
    }
}

/// The four immediate periodic neighbors of a process, as flat ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbors {
    pub left: usize,
    pub right: usize,
    pub up: usize,
    pub down: usize,
}

/// Ranks involved in a shift: receive from `source`, send to `dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub source: usize,
    pub dest: usize,
}

/// Immutable torus view over a square number of processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGrid {
    side: usize,
    order: RankOrder,
}

impl ProcessGrid {
    /// Builds the grid for `processes` ranks.
    ///
    /// Fails with [`CannonError::InvalidTopology`](crate::error::CannonError)
    /// unless `processes` is a non-zero perfect square.
    pub fn new(processes: usize, order: RankOrder) -> Result<Self> {
        let side = integer_sqrt(processes).ok_or_else(|| invalid_topology(processes))?;
        Ok(Self { side, order })
    }

    /// Grid side length `s`.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Total number of processes, `s * s`.
    pub fn size(&self) -> usize {
        self.side * self.side
    }

    pub fn order(&self) -> RankOrder {
        self.order
    }

    /// Coordinates of `rank`.
    ///
    /// # Panics
    ///
    /// Panics if `rank` is outside the grid.
    pub fn coords_of(&self, rank: usize) -> Coords {
        assert!(rank < self.size(), "rank {rank} outside {} processes", self.size());
        let (major, minor) = (rank / self.side, rank % self.side);
        match self.order {
            RankOrder::RowMajor => Coords {
                row: major,
                col: minor,
            },
            RankOrder::ColumnMajor => Coords {
                row: minor,
                col: major,
            },
        }
    }

    /// Flat rank of the process at `coords`, taken modulo the grid side.
    pub fn rank_at(&self, coords: Coords) -> usize {
        let (row, col) = (coords.row % self.side, coords.col % self.side);
        match self.order {
            RankOrder::RowMajor => row * self.side + col,
            RankOrder::ColumnMajor => col * self.side + row,
        }
    }

    /// Ranks for a cyclic shift of `displacement` steps along `axis`.
    ///
    /// `dest` is the process `displacement` steps ahead of `rank`, `source` the
    /// one the same distance behind, so that every process sending to `dest`
    /// and receiving from `source` moves data by `displacement` positions.
    pub fn shift(&self, rank: usize, axis: Axis, displacement: isize) -> Shift {
        let here = self.coords_of(rank);
        Shift {
            source: self.rank_at(self.offset(here, axis, -displacement)),
            dest: self.rank_at(self.offset(here, axis, displacement)),
        }
    }

    /// Left, right, up and down neighbors of `rank`.
    pub fn neighbors(&self, rank: usize) -> Neighbors {
        let row = self.shift(rank, Axis::Row, -1);
        let col = self.shift(rank, Axis::Column, -1);
        Neighbors {
            left: row.dest,
            right: row.source,
            up: col.dest,
            down: col.source,
        }
    }

    fn offset(&self, c: Coords, axis: Axis, d: isize) -> Coords {
        match axis {
            Axis::Row => Coords {
                row: c.row,
                col: wrap(c.col, d, self.side),
            },
            Axis::Column => Coords {
                row: wrap(c.row, d, self.side),
                col: c.col,
            },
        }
    }
}

#[inline(always)]
fn wrap(x: usize, d: isize, side: usize) -> usize {
    (x as isize + d).rem_euclid(side as isize) as usize
}

fn integer_sqrt(n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    // `None` means the square does not fit in a usize, so it exceeds `n`.
    let square = |s: usize| s.checked_mul(s);
    let mut s = (n as f64).sqrt() as usize;
    while square(s).map_or(true, |sq| sq > n) {
        s -= 1;
    }
    while square(s + 1).is_some_and(|sq| sq <= n) {
        s += 1;
    }
    (square(s) == Some(n)).then_some(s)
}
