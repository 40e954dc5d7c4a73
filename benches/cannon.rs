use std::hint::black_box;

use cannon::kernel::{mat_mult_seq, par_mat_mult};
use cannon::{CannonConfig, DistributedMatMul, Schedule};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ====================================================================================
// --- Configuration ---
// ====================================================================================

/// Matrix orders, all divisible by the grid sides below.
///
/// *   96:  every operand fits in L2; communication overhead dominates.
/// *   192: tiles still fit in L2 on a 2x2 grid.
/// *   384: the sequential working set spills into L3.
const ORDERS: &[usize] = &[96, 192, 384];

/// Process counts: 2x2, 3x3 and 4x4 grids.
const PROCESSES: &[usize] = &[4, 9, 16];

/// Fixed seed so that every run multiplies the same matrices.
fn generate_random_data(n: usize) -> (Array2<f64>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(42);
    let a = Array2::from_shape_fn((n, n), |_| rng.random_range(-1.0..1.0));
    let b = Array2::from_shape_fn((n, n), |_| rng.random_range(-1.0..1.0));
    (a, b)
}

// ====================================================================================
// --- Benchmarks ---
// ====================================================================================

fn all_benchmarks(c: &mut Criterion) {
    for &n in ORDERS {
        let mut group = c.benchmark_group(format!("matmul_{n}x{n}"));
        group.sample_size(20);
        group.throughput(Throughput::Elements((2 * n * n * n) as u64));

        let (a, b) = generate_random_data(n);
        let a_flat: Vec<f64> = a.iter().copied().collect();
        let b_flat: Vec<f64> = b.iter().copied().collect();
        let mut out = vec![0.0; n * n];

        group.bench_function("sequential", |bench| {
            bench.iter(|| mat_mult_seq(black_box(&a_flat), black_box(&b_flat), &mut out, n))
        });

        group.bench_function("rayon rows", |bench| {
            bench.iter(|| par_mat_mult(black_box(&a_flat), black_box(&b_flat), &mut out, n))
        });

        for &p in PROCESSES {
            for schedule in [Schedule::Blocking, Schedule::NonBlocking] {
                let engine = DistributedMatMul::new(CannonConfig::new(p).with_schedule(schedule))
                    .expect("perfect-square process count");
                group.bench_with_input(
                    BenchmarkId::new(format!("cannon {schedule}"), p),
                    &p,
                    |bench, _| {
                        bench.iter(|| black_box(engine.run(black_box(&a), black_box(&b))))
                    },
                );
            }
        }

        group.finish();
    }
}

criterion_group!(benches, all_benchmarks);
criterion_main!(benches);
