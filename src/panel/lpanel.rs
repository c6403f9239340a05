//! Column panel of one supernode: the diagonal block (on the diagonal-owning
//! process row) and every nonzero block row below it.

use crate::accel::DenseKernel;
use crate::error::SluError;
use crate::panel::{DiagLU, PanelBlock, find_block, index_len, read_index, write_index};

/// Block-sparse column panel (L factor side) of supernode `k`.
///
/// Values are one column-major buffer with leading dimension equal to the
/// panel's total row count; block `i` occupies rows
/// `off(i)..off(i)+len(i)` of every column. Block-row ids are strictly
/// increasing, with the diagonal block first when present.
#[derive(Debug, Clone, Default)]
pub struct LPanel {
    k: usize,
    ncols: usize,
    blocks: Vec<PanelBlock>,
    /// Global row ids covered by each block, concatenated in block order.
    rows: Vec<usize>,
    vals: Vec<f64>,
    diag_included: bool,
}

impl LPanel {
    /// Build a panel from per-block global row lists, values zeroed.
    ///
    /// `block_rows` must be sorted by global block id with unique ids; the
    /// diagonal block (id == `k`), if present, comes first.
    pub fn new(k: usize, ncols: usize, block_rows: Vec<(usize, Vec<usize>)>) -> Self {
        let mut blocks = Vec::with_capacity(block_rows.len());
        let mut rows = Vec::new();
        for (gid, r) in block_rows {
            debug_assert!(blocks.last().is_none_or(|b: &PanelBlock| b.gid < gid));
            blocks.push(PanelBlock {
                gid,
                off: rows.len(),
                len: r.len(),
            });
            rows.extend_from_slice(&r);
        }
        let diag_included = blocks.first().is_some_and(|b| b.gid == k);
        let nrow = rows.len();
        LPanel {
            k,
            ncols,
            blocks,
            rows,
            vals: vec![0.0; nrow * ncols],
            diag_included,
        }
    }

    /// Reassemble a panel from broadcast index/value buffers.
    pub fn from_buffers(k: usize, ncols: usize, index: &[usize], vals: &[f64]) -> Self {
        let (blocks, rows) = read_index(index);
        let diag_included = blocks.first().is_some_and(|b| b.gid == k);
        LPanel {
            k,
            ncols,
            blocks,
            vals: vals[..rows.len() * ncols].to_vec(),
            rows,
            diag_included,
        }
    }

    /// Binary search for the slot holding global block row `gid`.
    pub fn find(&self, gid: usize) -> Option<usize> {
        find_block(&self.blocks, gid)
    }

    pub fn nblocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn supernode(&self) -> usize {
        self.k
    }

    pub fn diag_included(&self) -> bool {
        self.diag_included
    }

    pub fn global_id(&self, slot: usize) -> usize {
        self.blocks[slot].gid
    }

    pub fn n_rows(&self, slot: usize) -> usize {
        self.blocks[slot].len
    }

    /// Global row ids covered by block `slot`, for scatter mapping.
    pub fn row_list(&self, slot: usize) -> &[usize] {
        let b = self.blocks[slot];
        &self.rows[b.off..b.off + b.len]
    }

    /// Offset of block `slot`'s first row in the value buffer.
    pub fn block_offset(&self, slot: usize) -> usize {
        self.blocks[slot].off
    }

    /// Leading dimension of the value buffer.
    pub fn lda(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn vals(&self) -> &[f64] {
        &self.vals
    }

    pub fn vals_mut(&mut self) -> &mut [f64] {
        &mut self.vals
    }

    /// Number of value entries (the panel's serialized value size).
    pub fn nzval_len(&self) -> usize {
        self.vals.len()
    }

    /// Serialized index size.
    pub fn index_len(&self) -> usize {
        index_len(self.blocks.len(), self.rows.len())
    }

    /// Bytes needed for a device-resident copy of this panel.
    pub fn total_bytes(&self) -> usize {
        self.nzval_len() * size_of::<f64>() + self.index_len() * size_of::<usize>()
    }

    /// Serialize the index into `out` (cleared first).
    pub fn write_index(&self, out: &mut Vec<usize>) {
        write_index(&self.blocks, &self.rows, out);
    }

    /// Value at panel row `i` (0-based within the stacked rows), column `j`.
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.vals[i + j * self.lda()]
    }

    pub fn set_value(&mut self, i: usize, j: usize, v: f64) {
        let lda = self.lda();
        self.vals[i + j * lda] = v;
    }

    /// Dense partial-pivoting LU of the diagonal block, in place.
    ///
    /// The diagonal entry is kept as the pivot when its magnitude is at least
    /// `thresh` times the column maximum; otherwise the largest-magnitude
    /// entry of the active column is chosen. An all-below-threshold column
    /// still factors (with the max entry); only an exactly zero column is a
    /// numerical failure.
    pub fn diag_factor(&mut self, thresh: f64) -> Result<DiagLU, SluError> {
        debug_assert!(self.diag_included);
        let n = self.ncols;
        let lda = self.lda();
        let k = self.k;
        let a = &mut self.vals;
        let mut perm: Vec<usize> = (0..n).collect();

        for j in 0..n {
            let mut amax = 0.0f64;
            let mut imax = j;
            for i in j..n {
                let v = a[i + j * lda].abs();
                if v > amax {
                    amax = v;
                    imax = i;
                }
            }
            if amax == 0.0 {
                return Err(SluError::SingularPivot { supernode: k });
            }
            let piv = if a[j + j * lda].abs() >= thresh * amax {
                j
            } else {
                imax
            };
            if piv != j {
                for c in 0..n {
                    a.swap(j + c * lda, piv + c * lda);
                }
                perm.swap(j, piv);
            }
            let d = a[j + j * lda];
            for i in j + 1..n {
                a[i + j * lda] /= d;
            }
            for c in j + 1..n {
                let u = a[j + c * lda];
                if u != 0.0 {
                    for i in j + 1..n {
                        a[i + c * lda] -= a[i + j * lda] * u;
                    }
                }
            }
        }

        let mut lu = vec![0.0; n * n];
        self.pack_diag(&mut lu);
        Ok(DiagLU { n, lu, perm })
    }

    /// Copy the (factored) diagonal block into a contiguous n x n buffer.
    pub fn pack_diag(&self, out: &mut [f64]) {
        debug_assert!(self.diag_included);
        let n = self.ncols;
        let lda = self.lda();
        for j in 0..n {
            out[j * n..j * n + n].copy_from_slice(&self.vals[j * lda..j * lda + n]);
        }
    }

    /// Right triangular solve of the off-diagonal blocks against the upper
    /// factor of the freshly factored diagonal block: X := X U^-1.
    pub fn panel_solve(&mut self, kernel: &dyn DenseKernel, diag_lu: &[f64]) {
        let n = self.ncols;
        let lda = self.lda();
        let st = if self.diag_included { n } else { 0 };
        if lda == st {
            return;
        }
        kernel.trsm_right_upper(lda - st, n, diag_lu, n, &mut self.vals[st..], lda);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::HostKernel;
    use approx::assert_abs_diff_eq;

    fn panel_2blk() -> LPanel {
        // supernode 0, size 2, diag block + block row 2 covering rows 6, 8
        let mut p = LPanel::new(0, 2, vec![(0, vec![0, 1]), (2, vec![6, 8])]);
        for i in 0..4 {
            for j in 0..2 {
                p.set_value(i, j, (i * 2 + j) as f64 + 1.0);
            }
        }
        p
    }

    #[test]
    fn find_present_and_absent() {
        let p = panel_2blk();
        assert_eq!(p.find(0), Some(0));
        assert_eq!(p.find(2), Some(1));
        assert_eq!(p.find(1), None);
        assert_eq!(p.find(3), None);
        assert!(p.diag_included());
        assert_eq!(p.row_list(1), &[6, 8]);
        assert_eq!(p.block_offset(1), 2);
    }

    #[test]
    fn index_round_trips_through_broadcast_buffers() {
        let p = panel_2blk();
        let mut idx = Vec::new();
        p.write_index(&mut idx);
        assert_eq!(idx.len(), p.index_len());
        let q = LPanel::from_buffers(0, 2, &idx, p.vals());
        assert_eq!(q.nblocks(), 2);
        assert_eq!(q.row_list(1), p.row_list(1));
        assert_eq!(q.vals(), p.vals());
        assert!(q.diag_included());
    }

    #[test]
    fn empty_panel() {
        let p = LPanel::default();
        assert!(p.is_empty());
        assert_eq!(p.index_len(), 0);
        assert_eq!(p.nzval_len(), 0);
    }

    #[test]
    fn diag_factor_reproduces_block() {
        // A = [[4, 3], [6, 3]]; L = [[1,0],[1.5,1]], U = [[4,3],[0,-1.5]]
        let mut p = LPanel::new(1, 2, vec![(1, vec![2, 3])]);
        p.set_value(0, 0, 4.0);
        p.set_value(1, 0, 6.0);
        p.set_value(0, 1, 3.0);
        p.set_value(1, 1, 3.0);
        let f = p.diag_factor(1e-3).unwrap();
        assert_eq!(f.perm, vec![0, 1]);
        assert_abs_diff_eq!(f.lu[0], 4.0, epsilon = 1e-14);
        assert_abs_diff_eq!(f.lu[1], 1.5, epsilon = 1e-14);
        assert_abs_diff_eq!(f.lu[2], 3.0, epsilon = 1e-14);
        assert_abs_diff_eq!(f.lu[3], -1.5, epsilon = 1e-14);
    }

    #[test]
    fn diag_factor_pivots_when_diagonal_is_small() {
        let mut p = LPanel::new(0, 2, vec![(0, vec![0, 1])]);
        p.set_value(0, 0, 1e-12);
        p.set_value(1, 0, 2.0);
        p.set_value(0, 1, 1.0);
        p.set_value(1, 1, 1.0);
        let f = p.diag_factor(1e-3).unwrap();
        // rows swapped: pivot 2.0 beats the tiny diagonal
        assert_eq!(f.perm, vec![1, 0]);
        assert_abs_diff_eq!(f.lu[0], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn diag_factor_accepts_all_small_column() {
        // every entry tiny in absolute terms, still factorable: the max
        // magnitude entry is taken, no spurious singularity
        let mut p = LPanel::new(0, 2, vec![(0, vec![0, 1])]);
        p.set_value(0, 0, 1e-25);
        p.set_value(1, 0, 3e-20);
        p.set_value(0, 1, 1e-20);
        p.set_value(1, 1, 5e-20);
        let f = p.diag_factor(1e-3).unwrap();
        assert_abs_diff_eq!(f.lu[0], 3e-20, epsilon = 1e-34);
        assert_eq!(f.perm, vec![1, 0]);
    }

    #[test]
    fn diag_factor_rejects_zero_column() {
        let mut p = LPanel::new(2, 2, vec![(2, vec![4, 5])]);
        p.set_value(0, 1, 1.0);
        p.set_value(1, 1, 1.0);
        let err = p.diag_factor(1e-3);
        assert!(matches!(err, Err(SluError::SingularPivot { supernode: 2 })));
    }

    #[test]
    fn panel_solve_applies_right_upper_inverse() {
        // diag U = [[2, 1], [0, 4]]; off-diag row [2, 5] -> [1, 1]
        let mut p = LPanel::new(0, 2, vec![(0, vec![0, 1]), (1, vec![2])]);
        p.set_value(0, 0, 2.0);
        p.set_value(1, 0, 0.0);
        p.set_value(0, 1, 1.0);
        p.set_value(1, 1, 4.0);
        p.set_value(2, 0, 2.0);
        p.set_value(2, 1, 5.0);
        let f = p.diag_factor(1e-3).unwrap();
        p.panel_solve(&HostKernel, &f.lu);
        assert_abs_diff_eq!(p.value(2, 0), 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(p.value(2, 1), 1.0, epsilon = 1e-14);
    }
}
