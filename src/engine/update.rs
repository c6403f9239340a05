//! Schur-complement update: dense block products scattered into the
//! block-sparse trailing matrix through indirect index maps.
//!
//! For supernode `k` the update iterates the flattened pair space of the
//! panel's block rows and block columns. Each pair produces one dense
//! product `V = L_i * U_j` whose destination block is unique to the pair,
//! so the product phase runs in parallel and the scatter pass applies the
//! subtractions in any order.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::error::SluError;
use crate::panel::{LPanel, UPanel};
use crate::parallel::GridComm;

use super::LuEngine;

/// Per-worker scatter scratch: the destination translation table and the
/// source-to-destination row/column maps, each bounded by the maximum
/// supernode size. Passed explicitly instead of indexing by a runtime
/// worker id.
pub struct WorkerScratch {
    table: Vec<usize>,
    rowmap: Vec<usize>,
    colmap: Vec<usize>,
}

impl WorkerScratch {
    pub fn new(ldt: usize) -> Self {
        WorkerScratch {
            table: vec![0; ldt],
            rowmap: vec![0; ldt],
            colmap: vec![0; ldt],
        }
    }
}

/// One computed block product awaiting its scatter.
struct BlockProduct {
    ii: usize,
    jj: usize,
    v: Vec<f64>,
}

impl<C: GridComm> LuEngine<C> {
    /// Index of the first block-row pair: the diagonal block is skipped on
    /// the process row holding `k`'s diagonal.
    fn st_lb(k_lpanel: &LPanel) -> usize {
        if k_lpanel.diag_included() { 1 } else { 0 }
    }

    /// Full Schur-complement update for supernode `k`: every `(i, j)` pair.
    pub fn schur_update(
        &mut self,
        k: usize,
        k_lpanel: &LPanel,
        k_upanel: &UPanel,
    ) -> Result<(), SluError> {
        if k_lpanel.is_empty() || k_upanel.is_empty() {
            return Ok(());
        }
        let st_lb = Self::st_lb(k_lpanel);
        let nlb = k_lpanel.nblocks();
        let nub = k_upanel.nblocks();
        let pairs: Vec<(usize, usize)> = (0..(nlb - st_lb) * nub)
            .map(|ij| (ij / nub + st_lb, ij % nub))
            .collect();
        self.update_pairs(k, false, &pairs, k_lpanel, k_upanel)
    }

    /// Look-ahead update: only the block row and block column of the next
    /// pivot `la`, so its diagonal factorization can start early.
    pub fn look_ahead_update(
        &mut self,
        k: usize,
        la: usize,
        k_lpanel: &LPanel,
        k_upanel: &UPanel,
    ) -> Result<(), SluError> {
        if k_lpanel.is_empty() || k_upanel.is_empty() {
            return Ok(());
        }
        let st_lb = Self::st_lb(k_lpanel);
        let la_iloc = k_lpanel.find(la);
        let la_jloc = k_upanel.find(la);

        let mut pairs = Vec::new();
        if let Some(jj) = la_jloc {
            for ii in st_lb..k_lpanel.nblocks() {
                pairs.push((ii, jj));
            }
        }
        if let Some(ii) = la_iloc {
            for jj in 0..k_upanel.nblocks() {
                if Some(jj) != la_jloc {
                    pairs.push((ii, jj));
                }
            }
        }
        self.update_pairs(k, true, &pairs, k_lpanel, k_upanel)
    }

    /// Full update minus the block row and block column of `ex`, which was
    /// already applied by the look-ahead pass. Together the two passes
    /// subtract each contribution exactly once.
    pub fn schur_update_exclude_one(
        &mut self,
        k: usize,
        ex: usize,
        k_lpanel: &LPanel,
        k_upanel: &UPanel,
    ) -> Result<(), SluError> {
        if k_lpanel.is_empty() || k_upanel.is_empty() {
            return Ok(());
        }
        let st_lb = Self::st_lb(k_lpanel);
        let nlb = k_lpanel.nblocks();
        let nub = k_upanel.nblocks();
        let ex_iloc = k_lpanel.find(ex);
        let ex_jloc = k_upanel.find(ex);

        let pairs: Vec<(usize, usize)> = (0..(nlb - st_lb) * nub)
            .map(|ij| (ij / nub + st_lb, ij % nub))
            .filter(|&(ii, jj)| Some(ii) != ex_iloc && Some(jj) != ex_jloc)
            .collect();
        self.update_pairs(k, false, &pairs, k_lpanel, k_upanel)
    }

    /// GEMM every pair, then scatter-subtract the products.
    fn update_pairs(
        &mut self,
        k: usize,
        look_ahead: bool,
        pairs: &[(usize, usize)],
        k_lpanel: &LPanel,
        k_upanel: &UPanel,
    ) -> Result<(), SluError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let ksupc = self.part.size(k);

        let offload = self.opts.accel_offload;
        let products: Vec<BlockProduct> = if let (true, Some(mirror)) =
            (offload, self.mirror.as_mut())
        {
            let n_lanes = mirror.n_lanes();
            pairs
                .iter()
                .enumerate()
                .map(|(t, &(ii, jj))| {
                    let m = k_lpanel.n_rows(ii);
                    let n = k_upanel.n_cols(jj);
                    let v = mirror.lane_gemm(
                        t % n_lanes,
                        look_ahead,
                        m,
                        n,
                        ksupc,
                        &k_lpanel.vals()[k_lpanel.block_offset(ii)..],
                        k_lpanel.lda(),
                        &k_upanel.vals()[k_upanel.block_offset(jj)..],
                        k_upanel.lda(),
                    );
                    BlockProduct { ii, jj, v }
                })
                .collect()
        } else {
            let kernel = self.kernel.as_ref();
            let product = |&(ii, jj): &(usize, usize)| {
                let m = k_lpanel.n_rows(ii);
                let n = k_upanel.n_cols(jj);
                let mut v = vec![0.0; m * n];
                kernel.gemm(
                    m,
                    n,
                    ksupc,
                    1.0,
                    &k_lpanel.vals()[k_lpanel.block_offset(ii)..],
                    k_lpanel.lda(),
                    &k_upanel.vals()[k_upanel.block_offset(jj)..],
                    k_upanel.lda(),
                    &mut v,
                    m,
                );
                BlockProduct { ii, jj, v }
            };
            #[cfg(feature = "rayon")]
            {
                pairs.par_iter().map(product).collect()
            }
            #[cfg(not(feature = "rayon"))]
            {
                pairs.iter().map(product).collect()
            }
        };

        for p in &products {
            self.scatter_block(k_lpanel, k_upanel, p)?;
        }
        Ok(())
    }

    /// Subtract one product from its trailing-matrix destination block,
    /// translating source row/column ids through the indirect maps.
    fn scatter_block(
        &mut self,
        k_lpanel: &LPanel,
        k_upanel: &UPanel,
        p: &BlockProduct,
    ) -> Result<(), SluError> {
        let gi = k_lpanel.global_id(p.ii);
        let gj = k_upanel.global_id(p.jj);
        let m = k_lpanel.n_rows(p.ii);
        let n = k_upanel.n_cols(p.jj);
        let src_rows = k_lpanel.row_list(p.ii);
        let src_cols = k_upanel.col_list(p.jj);
        let first_i = self.part.first_col(gi);
        let first_j = self.part.first_col(gj);

        if gj > gi {
            // upper trailing matrix: destination lives in a row panel, rows
            // uncompressed, columns translated through the block's col list
            let panel_slot = self.grid.g2l_row(gi);
            let dst = &self.u_panels[panel_slot];
            let slot = dst.find(gj).ok_or_else(|| {
                SluError::UnsupportedFormat(format!("missing trailing block ({gi}, {gj})"))
            })?;
            for (pos, &g) in dst.col_list(slot).iter().enumerate() {
                self.scratch.table[g - first_j] = pos;
            }
            for (j, &g) in src_cols.iter().enumerate() {
                self.scratch.colmap[j] = self.scratch.table[g - first_j];
            }
            for (i, &g) in src_rows.iter().enumerate() {
                self.scratch.rowmap[i] = g - first_i;
            }
            let dst = &mut self.u_panels[panel_slot];
            let base = dst.block_offset(slot);
            let ld = dst.lda();
            let vals = dst.vals_mut();
            for j in 0..n {
                let col = base + self.scratch.colmap[j] * ld;
                for i in 0..m {
                    vals[col + self.scratch.rowmap[i]] -= p.v[i + j * m];
                }
            }
        } else {
            // lower trailing matrix (or the next diagonal block): column
            // panel destination, rows translated, columns uncompressed
            let panel_slot = self.grid.g2l_col(gj);
            let dst = &self.l_panels[panel_slot];
            let slot = dst.find(gi).ok_or_else(|| {
                SluError::UnsupportedFormat(format!("missing trailing block ({gi}, {gj})"))
            })?;
            for (pos, &g) in dst.row_list(slot).iter().enumerate() {
                self.scratch.table[g - first_i] = pos;
            }
            for (i, &g) in src_rows.iter().enumerate() {
                self.scratch.rowmap[i] = self.scratch.table[g - first_i];
            }
            for (j, &g) in src_cols.iter().enumerate() {
                self.scratch.colmap[j] = g - first_j;
            }
            let dst = &mut self.l_panels[panel_slot];
            let base = dst.block_offset(slot);
            let ld = dst.lda();
            let vals = dst.vals_mut();
            for j in 0..n {
                let col = self.scratch.colmap[j] * ld;
                for i in 0..m {
                    vals[base + self.scratch.rowmap[i] + col] -= p.v[i + j * m];
                }
            }
        }
        Ok(())
    }
}
