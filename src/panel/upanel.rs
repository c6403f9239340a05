//! Row panel of one supernode: every nonzero block right of the diagonal.

use crate::accel::DenseKernel;
use crate::panel::{PanelBlock, find_block, index_len, read_index, write_index};

/// Block-sparse row panel (U factor side) of supernode `k`.
///
/// Structurally symmetric to `LPanel`: block entries are keyed by global
/// block-column id, strictly increasing. Values are one column-major buffer
/// with leading dimension equal to the supernode size, so block `j` occupies
/// the contiguous columns `off(j)..off(j)+len(j)`.
#[derive(Debug, Clone, Default)]
pub struct UPanel {
    k: usize,
    nrows: usize,
    blocks: Vec<PanelBlock>,
    /// Global column ids covered by each block, concatenated in block order.
    cols: Vec<usize>,
    vals: Vec<f64>,
}

impl UPanel {
    /// Build a panel from per-block global column lists, values zeroed.
    pub fn new(k: usize, nrows: usize, block_cols: Vec<(usize, Vec<usize>)>) -> Self {
        let mut blocks = Vec::with_capacity(block_cols.len());
        let mut cols = Vec::new();
        for (gid, c) in block_cols {
            debug_assert!(blocks.last().is_none_or(|b: &PanelBlock| b.gid < gid));
            blocks.push(PanelBlock {
                gid,
                off: cols.len(),
                len: c.len(),
            });
            cols.extend_from_slice(&c);
        }
        let ncol = cols.len();
        UPanel {
            k,
            nrows,
            blocks,
            cols,
            vals: vec![0.0; nrows * ncol],
        }
    }

    /// Reassemble a panel from broadcast index/value buffers.
    pub fn from_buffers(k: usize, nrows: usize, index: &[usize], vals: &[f64]) -> Self {
        let (blocks, cols) = read_index(index);
        UPanel {
            k,
            nrows,
            blocks,
            vals: vals[..nrows * cols.len()].to_vec(),
            cols,
        }
    }

    /// Binary search for the slot holding global block column `gid`.
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

    pub fn global_id(&self, slot: usize) -> usize {
        self.blocks[slot].gid
    }

    pub fn n_cols(&self, slot: usize) -> usize {
        self.blocks[slot].len
    }

    /// Global column ids covered by block `slot`, for scatter mapping.
    pub fn col_list(&self, slot: usize) -> &[usize] {
        let b = self.blocks[slot];
        &self.cols[b.off..b.off + b.len]
    }

    /// Offset of block `slot`'s first value in the buffer.
    pub fn block_offset(&self, slot: usize) -> usize {
        self.blocks[slot].off * self.nrows
    }

    /// Leading dimension of the value buffer (the supernode size).
    pub fn lda(&self) -> usize {
        self.nrows
    }

    pub fn total_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn vals(&self) -> &[f64] {
        &self.vals
    }

    pub fn vals_mut(&mut self) -> &mut [f64] {
        &mut self.vals
    }

    pub fn nzval_len(&self) -> usize {
        self.vals.len()
    }

    pub fn index_len(&self) -> usize {
        index_len(self.blocks.len(), self.cols.len())
    }

    pub fn total_bytes(&self) -> usize {
        self.nzval_len() * size_of::<f64>() + self.index_len() * size_of::<usize>()
    }

    pub fn write_index(&self, out: &mut Vec<usize>) {
        write_index(&self.blocks, &self.cols, out);
    }

    /// Value at row `i`, panel column `j` (0-based within the stacked cols).
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.vals[i + j * self.nrows]
    }

    pub fn set_value(&mut self, i: usize, j: usize, v: f64) {
        let n = self.nrows;
        self.vals[i + j * n] = v;
    }

    /// Solve the panel against the lower factor of the diagonal block:
    /// B := L^-1 P B, where `perm` is the row interchange recorded by the
    /// diagonal factorization.
    pub fn panel_solve(&mut self, kernel: &dyn DenseKernel, diag_lu: &[f64], perm: &[usize]) {
        if self.is_empty() {
            return;
        }
        let n = self.nrows;
        let ncol = self.cols.len();
        let mut col = vec![0.0; n];
        for j in 0..ncol {
            let base = j * n;
            for i in 0..n {
                col[i] = self.vals[base + perm[i]];
            }
            self.vals[base..base + n].copy_from_slice(&col);
        }
        kernel.trsm_left_unit_lower(n, ncol, diag_lu, n, &mut self.vals, n);
    }
}
