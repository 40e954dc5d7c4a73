//! Cannon's algorithm with one MPI rank per grid cell.
//!
//! ```text
//! mpirun -n 16 cannon-mpi --order 1024 --schedule blocking --verify
//! ```

use std::time::Instant;

use anyhow::{ensure, Context};
use clap::Parser;
use log::info;
use mpi::collective::SystemOperation;
use mpi::traits::*;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cannon::cannon::multiply;
use cannon::comm_mpi::MpiComm;
use cannon::{scatter, GridContext, Schedule, Tile};

/// Multiply two random matrices with Cannon's algorithm across MPI processes.
#[derive(Parser, Debug)]
#[command(name = "cannon-mpi", version, about)]
struct Cli {
    /// Matrix order; must be a multiple of √(number of MPI processes)
    #[arg(short = 'n', long, default_value_t = 512)]
    order: usize,

    /// Loop schedule: blocking or non-blocking
    #[arg(short, long, default_value_t = Schedule::NonBlocking)]
    schedule: Schedule,

    /// Seed for the random inputs; every process draws the same matrices
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Compare each tile of C against a local reference product
    #[arg(long)]
    verify: bool,
}

fn random_matrix(n: usize, rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_fn((n, n), |_| rng.random_range(-1.0..1.0))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let universe = mpi::initialize().context("MPI was already initialized")?;
    let world = universe.world();
    let comm = MpiComm::new(&world).context("cannot arrange the MPI processes as a grid")?;
    let ctx = GridContext::new::<f64>(&comm, MpiComm::RANK_ORDER)?;
    let grid = *ctx.grid();
    let rank = ctx.rank();

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let a = random_matrix(cli.order, &mut rng);
    let b = random_matrix(cli.order, &mut rng);
    let a_own = scatter(&a, &grid)?.swap_remove(rank);
    let b_own = scatter(&b, &grid)?.swap_remove(rank);

    let mut a_tile = a_own.clone();
    let mut b_tile = b_own.clone();
    let mut c_tile = Tile::zeros(a_tile.side());

    world.barrier();
    let clock = Instant::now();
    multiply(&ctx, cli.schedule, &mut a_tile, &mut b_tile, &mut c_tile)?;
    let local = clock.elapsed().as_secs_f64();

    let mut slowest = 0.0f64;
    world.all_reduce_into(&local, &mut slowest, SystemOperation::max());
    if rank == 0 {
        println!(
            "order {} on {} processes ({}): {:.3} ms",
            cli.order,
            grid.size(),
            cli.schedule,
            slowest * 1e3
        );
    }

    if cli.verify {
        let expected = scatter(&a.dot(&b), &grid)?.swap_remove(rank);
        let local_diff = expected
            .as_slice()
            .iter()
            .zip(c_tile.as_slice())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0f64, f64::max);
        let mut max_diff = 0.0f64;
        world.all_reduce_into(&local_diff, &mut max_diff, SystemOperation::max());
        info!("rank {rank}: max |C - reference| = {local_diff:.3e}");

        ensure!(
            a_tile == a_own && b_tile == b_own,
            "rank {rank}: A or B was not restored"
        );
        ensure!(
            max_diff <= 1e-9 * cli.order as f64,
            "result differs from reference by {max_diff:.3e}"
        );
        if rank == 0 {
            println!("max |C - reference| = {max_diff:.3e}");
        }
    }

    Ok(())
}
