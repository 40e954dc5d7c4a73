//! Local multiply-accumulate kernels.
//!
//! All matrices here are square, `m x m`, and stored **row-major**. The loop
//! order is i-k-j: for each row of C, every element `A(i, k)` is broadcast
//! across a full row of B, so one row of A and one row of C stay hot while B
//! is streamed sequentially.

use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};

use crate::tile::{Element, Tile};

/// Computes `C += A * B` in place.
///
/// C is **not** cleared; callers zero it once before the first call and then
/// accumulate partial products across as many calls as they need.
///
/// # Panics
///
/// Panics if any slice holds fewer than `m * m` elements.
pub fn mat_mult_acc<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize) {
    assert!(a.len() >= m * m, "A: expected {} elements", m * m);
    assert!(b.len() >= m * m, "B: expected {} elements", m * m);
    assert!(c.len() >= m * m, "C: expected {} elements", m * m);

    if m == 0 {
        return;
    }

    for (a_row, c_row) in a.chunks_exact(m).zip(c.chunks_exact_mut(m)).take(m) {
        accumulate_row(a_row, b, c_row, m);
    }
}

/// Computes `C = A * B`, overwriting C.
///
/// This is the sequential reference the distributed product is checked against.
pub fn mat_mult_seq<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize) {
    assert!(c.len() >= m * m, "C: expected {} elements", m * m);
    c[..m * m].fill(T::zero());
    mat_mult_acc(a, b, c, m);
}

/// Computes `C = A * B` with rows of C spread over the rayon pool.
///
/// Rows of C are disjoint, so every task owns its output row outright and
/// runs the same i-k-j inner loops as [`mat_mult_acc`].
pub fn par_mat_mult<T: Element>(a: &[T], b: &[T], c: &mut [T], m: usize) {
    assert!(a.len() >= m * m, "A: expected {} elements", m * m);
    assert!(b.len() >= m * m, "B: expected {} elements", m * m);
    assert!(c.len() >= m * m, "C: expected {} elements", m * m);

    if m == 0 {
        return;
    }

    c[..m * m]
        .par_chunks_mut(m)
        .enumerate()
        .for_each(|(i, c_row)| {
            c_row.fill(T::zero());
            accumulate_row(&a[i * m..(i + 1) * m], b, c_row, m);
        });
}

/// Tile wrapper around [`mat_mult_acc`].
pub fn tile_mult_acc<T: Element>(a: &Tile<T>, b: &Tile<T>, c: &mut Tile<T>) {
    debug_assert_eq!(a.side(), b.side());
    debug_assert_eq!(a.side(), c.side());
    let m = c.side();
    mat_mult_acc(a.as_slice(), b.as_slice(), c.as_mut_slice(), m);
}

#[inline(always)]
fn accumulate_row<T: Element>(a_row: &[T], b: &[T], c_row: &mut [T], m: usize) {
    for (k, &a_ik) in a_row.iter().enumerate() {
        let b_row = &b[k * m..(k + 1) * m];
        for (c_ij, &b_kj) in c_row.iter_mut().zip(b_row) {
            *c_ij = *c_ij + a_ik * b_kj;
        }
    }
}
