//! Distributed dense matrix multiplication with Cannon's algorithm.
//!
//! `P` cooperating processes form a `√P x √P` torus. Each one owns a tile of
//! A, B and C, skews A and B into place, runs `√P` multiply-and-shift steps,
//! and restores A and B afterwards. Two loop schedules are available: a
//! blocking one and a double-buffered one that overlaps communication with
//! the local multiply.
//!
//! Processes talk through the [`comm::Communicator`] trait. [`Cluster`] runs
//! them as threads over in-process channels; the `mpi` feature adds
//! `comm_mpi::MpiComm` for running one process per MPI rank.
//!
//! ```
//! use cannon::{CannonConfig, DistributedMatMul, Schedule};
//! use ndarray::Array2;
//!
//! let a = Array2::from_shape_fn((4, 4), |(i, j)| (i + j) as i64);
//! let b = Array2::from_shape_fn((4, 4), |(i, j)| (i * j) as i64);
//!
//! let config = CannonConfig::new(4).with_schedule(Schedule::NonBlocking);
//! let product = DistributedMatMul::new(config)?.run(&a, &b)?;
//! assert_eq!(product.c, a.dot(&b));
//! # Ok::<(), cannon::CannonError>(())
//! ```

pub mod cannon;
pub mod comm;
#[cfg(feature = "mpi")]
pub mod comm_mpi;
pub mod config;
pub mod distribute;
pub mod error;
pub mod grid;
pub mod kernel;
pub mod tile;
pub mod topology;

pub use config::{CannonConfig, Schedule};
pub use distribute::{gather, scatter, Cluster, DistributedMatMul, Product};
pub use error::{CannonError, Result};
pub use grid::GridContext;
pub use tile::{Element, Tile};
pub use topology::{Axis, Coords, Neighbors, ProcessGrid, RankOrder};
