//! Running Cannon's algorithm over a whole matrix.
//!
//! A [`Cluster`] hosts one logical process per grid cell on a dedicated rayon
//! pool. [`scatter`] and [`gather`] move between a global `ndarray` matrix and
//! the per-rank tiles, and [`DistributedMatMul`] ties the pieces together.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{info, warn};
use ndarray::{s, Array2, ArrayView2};

use crate::cannon;
use crate::comm::{ChannelComm, Communicator};
use crate::config::CannonConfig;
use crate::error::{communication_error, shape_mismatch, CannonError, Result};
use crate::grid::GridContext;
use crate::tile::{Element, Tile};
use crate::topology::{Coords, ProcessGrid};

/// A fixed set of cooperating processes arranged as a square grid.
pub struct Cluster {
    config: CannonConfig,
    grid: ProcessGrid,
    pool: rayon::ThreadPool,
}

impl Cluster {
    /// Validates the topology and starts one worker thread per process.
    ///
    /// A process count that is not a perfect square fails here, before any
    /// thread is started or tile allocated.
    pub fn new(config: CannonConfig) -> Result<Self> {
        let grid = ProcessGrid::new(config.processes, config.rank_order)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(grid.size())
            .thread_name(|i| format!("cannon-rank-{i}"))
            .build()
            .map_err(|e| {
                communication_error(0, format!("cannot start {} process threads: {e}", grid.size()))
            })?;
        Ok(Self { config, grid, pool })
    }

    pub fn config(&self) -> &CannonConfig {
        &self.config
    }

    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    /// Runs `f` on every process and returns the results indexed by rank.
    pub fn run<T, R, F>(&self, f: F) -> Result<Vec<R>>
    where
        T: Element,
        R: Send,
        F: Fn(&GridContext<'_, ChannelComm<T>>) -> Result<R> + Sync,
    {
        let inputs = vec![(); self.grid.size()];
        self.run_with::<T, _, _, _>(inputs, |ctx, ()| f(ctx))
    }

    /// Runs `f` on every process, handing rank `r` the input `inputs[r]`.
    ///
    /// All processes run concurrently. If any of them fails the whole run
    /// fails; there is no partial result.
    pub fn run_with<T, I, R, F>(&self, inputs: Vec<I>, f: F) -> Result<Vec<R>>
    where
        T: Element,
        I: Send,
        R: Send,
        F: Fn(&GridContext<'_, ChannelComm<T>>, I) -> Result<R> + Sync,
    {
        let size = self.grid.size();
        if inputs.len() != size {
            return Err(shape_mismatch(
                size,
                inputs.len(),
                "one input per process is required",
            ));
        }

        let order = self.config.rank_order;
        let endpoints = ChannelComm::<T>::world(size);
        let mut outcomes: Vec<Option<Result<R>>> = (0..size).map(|_| None).collect();
        let f = &f;

        self.pool.scope(|scope| {
            for ((endpoint, input), outcome) in
                endpoints.into_iter().zip(inputs).zip(outcomes.iter_mut())
            {
                scope.spawn(move |_| {
                    let result =
                        GridContext::new::<T>(&endpoint, order).and_then(|ctx| f(&ctx, input));
                    if let Err(e) = &result {
                        warn!("rank {} failed: {}", endpoint.rank(), e);
                    }
                    *outcome = Some(result);
                    // Dropping the endpoint here unblocks peers still waiting on it.
                });
            }
        });

        let mut results = Vec::with_capacity(size);
        let mut errors = Vec::new();
        for (rank, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(r)) => results.push(r),
                Some(Err(e)) => errors.push(e),
                None => errors.push(communication_error(rank, "process did not report")),
            }
        }
        match root_cause(errors) {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

// A failure on one rank makes its peers fail with "hung up" errors; report
// the original failure rather than one of those.
fn root_cause(errors: Vec<CannonError>) -> Option<CannonError> {
    let first = errors.first().cloned()?;
    Some(
        errors
            .into_iter()
            .find(|e| !matches!(e, CannonError::Communication { .. }))
            .unwrap_or(first),
    )
}

/// Splits a square matrix into one tile per process.
///
/// The tile for rank `r` is the block at `grid.coords_of(r)`. Fails with
/// [`CannonError::ShapeMismatch`] if the matrix is not square or its order is
/// not a multiple of the grid side.
pub fn scatter<T: Element>(matrix: &Array2<T>, grid: &ProcessGrid) -> Result<Vec<Tile<T>>> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(shape_mismatch(rows, cols, "matrix must be square"));
    }
    let side = grid.side();
    if rows % side != 0 {
        return Err(shape_mismatch(
            rows - rows % side,
            rows,
            format!("matrix order must be a multiple of the grid side {side}"),
        ));
    }

    let m = rows / side;
    (0..grid.size())
        .map(|rank| {
            let Coords { row, col } = grid.coords_of(rank);
            let block = matrix.slice(s![row * m..(row + 1) * m, col * m..(col + 1) * m]);
            Tile::from_vec(m, block.iter().copied().collect())
        })
        .collect()
}

/// Reassembles per-rank tiles into the global matrix. Inverse of [`scatter`].
pub fn gather<T: Element>(tiles: &[Tile<T>], grid: &ProcessGrid) -> Result<Array2<T>> {
    if tiles.len() != grid.size() {
        return Err(shape_mismatch(
            grid.size(),
            tiles.len(),
            "one tile per process is required",
        ));
    }

    let m = tiles.first().map_or(0, Tile::side);
    let n = m * grid.side();
    let mut matrix = Array2::from_elem((n, n), T::zero());

    for (rank, tile) in tiles.iter().enumerate() {
        if tile.side() != m {
            return Err(shape_mismatch(
                m,
                tile.side(),
                format!("tile of rank {rank} has a different side"),
            ));
        }
        let Coords { row, col } = grid.coords_of(rank);
        let view = ArrayView2::from_shape((m, m), tile.as_slice())
            .map_err(|e| shape_mismatch(m * m, tile.as_slice().len(), e.to_string()))?;
        matrix
            .slice_mut(s![row * m..(row + 1) * m, col * m..(col + 1) * m])
            .assign(&view);
    }

    Ok(matrix)
}

/// Result of a distributed multiply.
#[derive(Debug, Clone)]
pub struct Product<T> {
    /// `A * B`.
    pub c: Array2<T>,
    /// A as gathered after restoration.
    pub a: Array2<T>,
    /// B as gathered after restoration.
    pub b: Array2<T>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Multiplies whole matrices on a [`Cluster`].
pub struct DistributedMatMul {
    cluster: Cluster,
}

impl DistributedMatMul {
    pub fn new(config: CannonConfig) -> Result<Self> {
        Ok(Self {
            cluster: Cluster::new(config)?,
        })
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Computes `A * B` with Cannon's algorithm.
    pub fn run<T: Element>(&self, a: &Array2<T>, b: &Array2<T>) -> Result<Product<T>> {
        if a.dim() != b.dim() {
            return Err(shape_mismatch(
                a.nrows(),
                b.nrows(),
                "A and B must have the same order",
            ));
        }

        let grid = self.cluster.grid();
        let schedule = self.cluster.config().schedule;
        let inputs: Vec<(Tile<T>, Tile<T>)> = scatter(a, grid)?
            .into_iter()
            .zip(scatter(b, grid)?)
            .collect();

        info!(
            "multiplying order {} on a {}x{} grid ({} schedule)",
            a.nrows(),
            grid.side(),
            grid.side(),
            schedule
        );
        let started_at = Utc::now();
        let clock = Instant::now();

        let outputs = self.cluster.run_with::<T, _, _, _>(inputs, |ctx, (mut a, mut b)| {
            let mut c = Tile::zeros(a.side());
            cannon::multiply(ctx, schedule, &mut a, &mut b, &mut c)?;
            Ok((a, b, c))
        })?;

        let elapsed = clock.elapsed();
        info!("finished in {:.3} ms", elapsed.as_secs_f64() * 1e3);

        let (mut a_tiles, mut b_tiles, mut c_tiles) = (Vec::new(), Vec::new(), Vec::new());
        for (a, b, c) in outputs {
            a_tiles.push(a);
            b_tiles.push(b);
            c_tiles.push(c);
        }

        Ok(Product {
            c: gather(&c_tiles, grid)?,
            a: gather(&a_tiles, grid)?,
            b: gather(&b_tiles, grid)?,
            started_at,
            elapsed,
        })
    }
}
