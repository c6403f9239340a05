//! Panel distribution: turns a replicated CSC matrix into the block-sparse
//! panels local to one process of the 2D grid.
//!
//! This is the gather/scatter glue between the input format and the engine;
//! blocks are detected at supernode granularity from the matrix pattern,
//! closed under block fill-in, and stored dense within a block.

use crate::error::SluError;
use crate::matrix::{CscMatrix, SupernodePartition};
use crate::panel::{LPanel, UPanel};
use crate::parallel::{GridComm, ProcessGrid};

/// Build this process's local L and U panels for a block-cyclic 2D layout.
///
/// The returned vectors are indexed by local panel slot; slots this process
/// does not own (or whose panel has no nonzero blocks) hold empty panels.
pub fn distribute_panels<C: GridComm>(
    a: &CscMatrix,
    part: &SupernodePartition,
    grid: &ProcessGrid<C>,
) -> Result<(Vec<LPanel>, Vec<UPanel>), SluError> {
    if a.nrows() != a.ncols() {
        return Err(SluError::UnsupportedFormat(format!(
            "matrix is {}x{}, factorization needs a square matrix",
            a.nrows(),
            a.ncols()
        )));
    }
    let n = a.ncols();
    let nsupers = part.n_supernodes();
    if part.first_col(nsupers - 1) + part.size(nsupers - 1) != n {
        return Err(SluError::UnsupportedFormat(
            "supernode partition does not cover the matrix".into(),
        ));
    }

    let (lblocks, ublocks) = close_block_pattern(a, part);

    let mut l_panels = vec![LPanel::default(); grid.n_col_slots(nsupers)];
    let mut u_panels = vec![UPanel::default(); grid.n_row_slots(nsupers)];

    for k in 0..nsupers {
        let ksupc = part.size(k);
        let kfirst = part.first_col(k);

        if grid.kcol(k) == grid.mycol {
            let mut block_rows = Vec::new();
            // the diagonal block is always carried by the diagonal process row
            if grid.krow(k) == grid.myrow {
                block_rows.push((k, (kfirst..kfirst + ksupc).collect()));
            }
            for i in k + 1..nsupers {
                if lblocks[k][i] && grid.krow(i) == grid.myrow {
                    let span = (part.first_col(i)..part.first_col(i) + part.size(i)).collect();
                    block_rows.push((i, span));
                }
            }
            if !block_rows.is_empty() {
                let mut panel = LPanel::new(k, ksupc, block_rows);
                for col in kfirst..kfirst + ksupc {
                    let (rows, vals) = a.col(col);
                    for (&r, &v) in rows.iter().zip(vals) {
                        let i = part.supernode_of(r);
                        if i < k || grid.krow(i) != grid.myrow {
                            continue;
                        }
                        if let Some(slot) = panel.find(i) {
                            let pos = panel.block_offset(slot) + (r - part.first_col(i));
                            panel.set_value(pos, col - kfirst, v);
                        }
                    }
                }
                l_panels[grid.g2l_col(k)] = panel;
            }
        }

        if grid.krow(k) == grid.myrow {
            let mut block_cols = Vec::new();
            for j in k + 1..nsupers {
                if ublocks[k][j] && grid.kcol(j) == grid.mycol {
                    let jfirst = part.first_col(j);
                    block_cols.push((j, (jfirst..jfirst + part.size(j)).collect()));
                }
            }
            if !block_cols.is_empty() {
                let mut panel = UPanel::new(k, ksupc, block_cols);
                for j in k + 1..nsupers {
                    let Some(slot) = panel.find(j) else { continue };
                    let jfirst = part.first_col(j);
                    for col in jfirst..jfirst + part.size(j) {
                        let (rows, vals) = a.col(col);
                        for (&r, &v) in rows.iter().zip(vals) {
                            if part.supernode_of(r) == k {
                                let coff = panel.block_offset(slot) / ksupc + (col - jfirst);
                                panel.set_value(r - kfirst, coff, v);
                            }
                        }
                    }
                }
                u_panels[grid.g2l_row(k)] = panel;
            }
        }
    }

    Ok((l_panels, u_panels))
}

/// Block-level symbolic fill: close A's block pattern under elimination.
///
/// A product `L(i,k) * U(k,j)` scatters into block `(i,j)`, so that block
/// must exist in the panel layout even when A holds no entry there. Seeded
/// from the matrix pattern (`lblocks[k][i]` for block rows `i > k`,
/// `ublocks[k][j]` for block columns `j > k`), one ascending pass over `k`
/// inserts every reachable fill block: inserted blocks always lie in a later
/// panel, so they are expanded in turn when their panel comes up.
fn close_block_pattern(
    a: &CscMatrix,
    part: &SupernodePartition,
) -> (Vec<Vec<bool>>, Vec<Vec<bool>>) {
    let nsupers = part.n_supernodes();
    let mut lblocks = vec![vec![false; nsupers]; nsupers];
    let mut ublocks = vec![vec![false; nsupers]; nsupers];

    for k in 0..nsupers {
        let kfirst = part.first_col(k);
        for col in kfirst..kfirst + part.size(k) {
            let (rows, _) = a.col(col);
            for &r in rows {
                let i = part.supernode_of(r);
                if i > k {
                    lblocks[k][i] = true;
                } else if i < k {
                    ublocks[i][k] = true;
                }
            }
        }
    }

    for k in 0..nsupers {
        for j in k + 1..nsupers {
            if !ublocks[k][j] {
                continue;
            }
            for i in k + 1..nsupers {
                if !lblocks[k][i] {
                    continue;
                }
                if i > j {
                    lblocks[j][i] = true;
                } else if i < j {
                    ublocks[i][j] = true;
                }
            }
        }
    }
    (lblocks, ublocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    #[test]
    fn serial_distribution_covers_pattern() {
        // 4x4, two supernodes of size 2, block tridiagonal
        let a = Mat::from_fn(4, 4, |i, j| {
            if i / 2 == j / 2 || (i / 2) as i64 - (j / 2) as i64 == 1 || (j / 2) as i64 - (i / 2) as i64 == 1 {
                (i * 4 + j) as f64 + 1.0
            } else {
                0.0
            }
        });
        let csc = CscMatrix::from_dense(&a);
        let part = SupernodePartition::uniform(4, 2);
        let grid = ProcessGrid::serial();
        let (lp, up) = distribute_panels(&csc, &part, &grid).unwrap();

        assert_eq!(lp.len(), 2);
        assert_eq!(up.len(), 2);
        // panel 0: diag block + block row 1
        assert_eq!(lp[0].nblocks(), 2);
        assert!(lp[0].diag_included());
        assert_eq!(lp[0].global_id(1), 1);
        // panel 1: diag block only
        assert_eq!(lp[1].nblocks(), 1);
        // U panel 0: block column 1; U panel 1 has nothing right of the diagonal
        assert_eq!(up[0].nblocks(), 1);
        assert!(up[1].is_empty());

        // values land at their matrix positions
        assert_eq!(lp[0].value(2, 0), a[(2, 0)]);
        assert_eq!(up[0].value(1, 1), a[(1, 3)]);
    }

    #[test]
    fn fill_blocks_are_allocated() {
        // entries in blocks (2,0) and (0,1) produce an elimination update at
        // block (2,1), which has no entry in the input pattern
        let a = Mat::from_fn(6, 6, |i, j| {
            let (bi, bj) = (i / 2, j / 2);
            if i == j {
                10.0
            } else if bi == bj || (bi == 2 && bj == 0) || (bi == 0 && bj == 1) {
                1.0
            } else {
                0.0
            }
        });
        let csc = CscMatrix::from_dense(&a);
        let part = SupernodePartition::uniform(6, 2);
        let grid = ProcessGrid::serial();
        let (lp, up) = distribute_panels(&csc, &part, &grid).unwrap();

        let slot = lp[1].find(2).expect("fill block row (2,1)");
        // the fill block starts zero; only elimination writes it
        let off = lp[1].block_offset(slot);
        for j in 0..2 {
            for i in 0..2 {
                assert_eq!(lp[1].value(off + i, j), 0.0);
            }
        }
        // no spurious U fill for this pattern
        assert!(up[1].is_empty());
    }

    #[test]
    fn rejects_non_square() {
        let csc = CscMatrix::new(2, 3, vec![0, 0, 0, 0], vec![], vec![]).unwrap();
        let part = SupernodePartition::uniform(3, 2);
        let grid = ProcessGrid::serial();
        assert!(distribute_panels(&csc, &part, &grid).is_err());
    }
}
