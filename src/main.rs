use std::time::Instant;

use anyhow::{ensure, Context};
use clap::Parser;
use log::info;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cannon::kernel::par_mat_mult;
use cannon::{CannonConfig, DistributedMatMul, RankOrder, Schedule};

/// Multiply two random matrices with Cannon's algorithm on an in-process grid.
#[derive(Parser, Debug)]
#[command(name = "cannon", version, about)]
struct Cli {
    /// Number of processes; must be a perfect square
    #[arg(short, long, default_value_t = 4)]
    processes: usize,

    /// Matrix order; must be a multiple of √processes
    #[arg(short = 'n', long, default_value_t = 512)]
    order: usize,

    /// Loop schedule: blocking or non-blocking
    #[arg(short, long, default_value_t = Schedule::NonBlocking)]
    schedule: Schedule,

    /// Rank placement: row-major or column-major
    #[arg(long, default_value_t = RankOrder::RowMajor)]
    rank_order: RankOrder,

    /// Seed for the random inputs
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Compare against the shared-memory parallel multiply
    #[arg(long)]
    verify: bool,
}

fn random_matrix(n: usize, rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_fn((n, n), |_| rng.random_range(-1.0..1.0))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = CannonConfig::new(cli.processes)
        .with_schedule(cli.schedule)
        .with_rank_order(cli.rank_order);
    let engine = DistributedMatMul::new(config).context("cannot set up the process grid")?;

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let a = random_matrix(cli.order, &mut rng);
    let b = random_matrix(cli.order, &mut rng);

    let product = engine.run(&a, &b).context("distributed multiply failed")?;
    println!(
        "[{}] order {} on {} processes ({}): {:.3} ms",
        product.started_at.format("%Y-%m-%d %H:%M:%S"),
        cli.order,
        cli.processes,
        cli.schedule,
        product.elapsed.as_secs_f64() * 1e3
    );

    if cli.verify {
        let n = cli.order;
        let (a_flat, b_flat) = (a.as_standard_layout(), b.as_standard_layout());
        let mut reference = vec![0.0; n * n];
        let clock = Instant::now();
        par_mat_mult(
            a_flat.as_slice().context("A is not contiguous")?,
            b_flat.as_slice().context("B is not contiguous")?,
            &mut reference,
            n,
        );
        info!("reference multiply took {:.3} ms", clock.elapsed().as_secs_f64() * 1e3);

        let max_diff = product
            .c
            .iter()
            .zip(&reference)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0f64, f64::max);
        println!("max |C - reference| = {max_diff:.3e}");

        ensure!(product.a == a && product.b == b, "A or B was not restored");
        ensure!(max_diff <= 1e-9 * n as f64, "result differs from reference");
    }

    Ok(())
}
