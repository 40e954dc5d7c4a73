//! Alignment and restoration of operand tiles across the grid.

use cannon::cannon::{align, restore};
use cannon::{gather, scatter, CannonConfig, Cluster, Coords, RankOrder, Tile};
use ndarray::Array2;

/// Matrix whose `(i, j)` block is filled with the label `i * s + j`, so that
/// every tile says where it came from.
fn labelled(s: usize, m: usize) -> Array2<i64> {
    Array2::from_shape_fn((s * m, s * m), |(i, j)| ((i / m) * s + j / m) as i64)
}

fn label_of(tile: &Tile<i64>) -> i64 {
    tile.as_slice()[0]
}

#[test]
fn test_align_then_restore_is_identity() {
    for processes in [1, 4, 9, 16, 25] {
        for order in [RankOrder::RowMajor, RankOrder::ColumnMajor] {
            let cluster =
                Cluster::new(CannonConfig::new(processes).with_rank_order(order)).unwrap();
            let grid = *cluster.grid();
            let a = labelled(grid.side(), 3);
            let b = labelled(grid.side(), 3).mapv(|x| -x);

            let inputs: Vec<_> = scatter(&a, &grid)
                .unwrap()
                .into_iter()
                .zip(scatter(&b, &grid).unwrap())
                .collect();

            let outputs = cluster
                .run_with::<i64, _, _, _>(inputs, |ctx, (mut ta, mut tb)| {
                    align(ctx, &mut ta, &mut tb)?;
                    restore(ctx, &mut ta, &mut tb)?;
                    Ok((ta, tb))
                })
                .unwrap();

            let (a_tiles, b_tiles): (Vec<_>, Vec<_>) = outputs.into_iter().unzip();
            assert_eq!(gather(&a_tiles, &grid).unwrap(), a, "P={processes} {order}");
            assert_eq!(gather(&b_tiles, &grid).unwrap(), b, "P={processes} {order}");
        }
    }
}

#[test]
fn test_alignment_skews_rows_and_columns() {
    for processes in [4, 9, 16] {
        let cluster = Cluster::new(CannonConfig::new(processes)).unwrap();
        let grid = *cluster.grid();
        let s = grid.side();
        let a = labelled(s, 2);
        let b = labelled(s, 2);

        let inputs: Vec<_> = scatter(&a, &grid)
            .unwrap()
            .into_iter()
            .zip(scatter(&b, &grid).unwrap())
            .collect();

        let outputs = cluster
            .run_with::<i64, _, _, _>(inputs, |ctx, (mut ta, mut tb)| {
                align(ctx, &mut ta, &mut tb)?;
                Ok((ctx.coords(), label_of(&ta), label_of(&tb)))
            })
            .unwrap();

        for (Coords { row, col }, a_label, b_label) in outputs {
            let k = (row + col) % s;
            // Process (row, col) now holds A(row, row + col) and B(row + col, col).
            assert_eq!(a_label, (row * s + k) as i64, "A at ({row}, {col})");
            assert_eq!(b_label, (k * s + col) as i64, "B at ({row}, {col})");
        }
    }
}
