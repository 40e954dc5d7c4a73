//! Square, row-major tiles owned by a single process.

use std::fmt::Debug;
use std::ops::{Index, IndexMut};

use crate::error::{shape_mismatch, Result};

/// Numeric element that can live in a tile and travel between processes.
pub trait Element: num::Num + Copy + Send + Sync + Debug + 'static {}

impl<T> Element for T where T: num::Num + Copy + Send + Sync + Debug + 'static {}

/// A `side x side` block of a matrix, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile<T> {
    side: usize,
    data: Vec<T>,
}

impl<T: Element> Tile<T> {
    /// Allocates a tile filled with zeros.
    pub fn zeros(side: usize) -> Self {
        Self {
            side,
            data: vec![T::zero(); side * side],
        }
    }

    /// Wraps row-major data, checking that it holds exactly `side * side` elements.
    pub fn from_vec(side: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != side * side {
            return Err(shape_mismatch(
                side * side,
                data.len(),
                format!("tile of side {side} needs {} elements", side * side),
            ));
        }
        Ok(Self { side, data })
    }

    /// Builds a tile by evaluating `f(row, col)` for every element.
    pub fn from_fn(side: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(side * side);
        for i in 0..side {
            for j in 0..side {
                data.push(f(i, j));
            }
        }
        Self { side, data }
    }

    /// The identity tile.
    pub fn identity(side: usize) -> Self {
        Self::from_fn(side, |i, j| if i == j { T::one() } else { T::zero() })
    }

    /// Resets every element to zero without reallocating.
    pub fn fill_zero(&mut self) {
        self.data.fill(T::zero());
    }

    /// Fails with [`CannonError::ShapeMismatch`](crate::error::CannonError) unless
    /// both tiles have the same side.
    pub fn ensure_same_side(&self, other: &Tile<T>, what: &str) -> Result<()> {
        if self.side != other.side {
            return Err(shape_mismatch(
                self.side,
                other.side,
                format!("{what} tile side differs"),
            ));
        }
        Ok(())
    }
}

impl<T> Tile<T> {
    pub fn side(&self) -> usize {
        self.side
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T> Default for Tile<T> {
    /// An empty tile of side zero.
    fn default() -> Self {
        Self {
            side: 0,
            data: Vec::new(),
        }
    }
}

impl<T> Index<(usize, usize)> for Tile<T> {
    type Output = T;

    #[inline(always)]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.data[i * self.side + j]
    }
}

impl<T> IndexMut<(usize, usize)> for Tile<T> {
    #[inline(always)]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        &mut self.data[i * self.side + j]
    }
}
