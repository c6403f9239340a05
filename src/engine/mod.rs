//! The factorization engine: local panel storage, communication buffer
//! sizing, and the per-supernode pipeline
//! DiagFactor -> DiagBroadcast -> PanelSolve -> PanelBroadcast -> SchurUpdate
//! with depth-1 look-ahead overlapping the next diagonal factorization with
//! the bulk trailing update.

pub mod update;

use std::mem;

use crate::accel::{AccelMirror, DenseKernel, HostKernel, MemoryPlan};
use crate::config::FactorOptions;
use crate::error::SluError;
use crate::matrix::SupernodePartition;
use crate::panel::{LPanel, UPanel};
use crate::parallel::{GridComm, ProcessGrid};

pub use update::WorkerScratch;

/// Reusable one-to-many broadcast handle: the root rank within the
/// communicator plus the element count of the current transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BcastDesc {
    pub root: usize,
    pub count: usize,
}

impl BcastDesc {
    pub fn prepare(root: usize, count: usize) -> Self {
        BcastDesc { root, count }
    }

    pub fn run_f64<C: GridComm>(&self, comm: &C, buf: &mut [f64]) {
        if self.count > 0 {
            comm.broadcast_f64(&mut buf[..self.count], self.root);
        }
    }

    pub fn run_idx<C: GridComm>(&self, comm: &C, buf: &mut [usize]) {
        if self.count > 0 {
            comm.broadcast_usize(&mut buf[..self.count], self.root);
        }
    }
}

/// Distributed supernodal sparse LU factorization engine.
///
/// Owns the panels local to this process, the per-supernode send-count
/// tables (identical on every process after setup), and the fixed-size
/// receive buffers reused round-robin across the look-ahead window.
pub struct LuEngine<C: GridComm> {
    pub(crate) grid: ProcessGrid<C>,
    pub(crate) part: SupernodePartition,
    pub(crate) opts: FactorOptions,

    pub(crate) l_panels: Vec<LPanel>,
    pub(crate) u_panels: Vec<UPanel>,

    lval_send_counts: Vec<usize>,
    uval_send_counts: Vec<usize>,
    lidx_send_counts: Vec<usize>,
    uidx_send_counts: Vec<usize>,
    max_lval_count: usize,
    max_uval_count: usize,
    max_lidx_count: usize,
    max_uidx_count: usize,

    lval_recv: Vec<Vec<f64>>,
    uval_recv: Vec<Vec<f64>>,
    lidx_recv: Vec<Vec<usize>>,
    uidx_recv: Vec<Vec<usize>>,
    bcast_lval: Vec<BcastDesc>,
    bcast_uval: Vec<BcastDesc>,
    bcast_lidx: Vec<BcastDesc>,
    bcast_uidx: Vec<BcastDesc>,

    diag_bufs: Vec<Vec<f64>>,
    perm_bufs: Vec<Vec<usize>>,
    bcast_diag_row: Vec<BcastDesc>,
    bcast_diag_col: Vec<BcastDesc>,

    /// Per-supernode row interchanges, for the triangular-solve collaborator.
    perms: Vec<Vec<usize>>,

    pub(crate) kernel: Box<dyn DenseKernel>,
    pub(crate) mirror: Option<AccelMirror>,
    pub(crate) scratch: WorkerScratch,

    pub(crate) ldt: usize,
    /// Shared status: 0 on success, -(k+1) after a fatal failure at step k.
    info: i32,
}

impl<C: GridComm> LuEngine<C> {
    /// Set up the engine from distributed panels.
    ///
    /// Walks the local slots to record per-slot serialized sizes, then fills
    /// the global send-count tables with one broadcast per rank of the
    /// orthogonal communicator, O(grid dimension) collectives in total.
    pub fn new(
        grid: ProcessGrid<C>,
        part: SupernodePartition,
        l_panels: Vec<LPanel>,
        u_panels: Vec<UPanel>,
        opts: FactorOptions,
    ) -> Result<Self, SluError> {
        let nsupers = part.n_supernodes();
        let n_l = grid.n_col_slots(nsupers);
        let n_u = grid.n_row_slots(nsupers);
        if l_panels.len() != n_l || u_panels.len() != n_u {
            return Err(SluError::GridMismatch(format!(
                "{} column and {} row panel slots for {} supernodes on a {}x{} grid",
                l_panels.len(),
                u_panels.len(),
                nsupers,
                grid.nprow,
                grid.npcol
            )));
        }
        let ldt = part.max_size();

        #[cfg(feature = "rayon")]
        {
            let workers = if opts.workers == 0 {
                num_cpus::get()
            } else {
                opts.workers
            };
            rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build_global()
                .ok();
        }

        let local_lval: Vec<usize> = l_panels.iter().map(|p| p.nzval_len()).collect();
        let local_lidx: Vec<usize> = l_panels.iter().map(|p| p.index_len()).collect();
        let local_uval: Vec<usize> = u_panels.iter().map(|p| p.nzval_len()).collect();
        let local_uidx: Vec<usize> = u_panels.iter().map(|p| p.index_len()).collect();

        let mut lval_send_counts = vec![0usize; nsupers];
        let mut lidx_send_counts = vec![0usize; nsupers];
        let mut uval_send_counts = vec![0usize; nsupers];
        let mut uidx_send_counts = vec![0usize; nsupers];

        let mut recv = vec![0usize; n_l.max(n_u)];
        for pr in 0..grid.nprow {
            for (local, table) in [
                (&local_uval, &mut uval_send_counts),
                (&local_uidx, &mut uidx_send_counts),
            ] {
                recv[..n_u].copy_from_slice(local);
                grid.col_comm.broadcast_usize(&mut recv[..n_u], pr);
                let mut i = 0;
                while i * grid.nprow + pr < nsupers {
                    table[i * grid.nprow + pr] = recv[i];
                    i += 1;
                }
            }
        }
        for pc in 0..grid.npcol {
            for (local, table) in [
                (&local_lval, &mut lval_send_counts),
                (&local_lidx, &mut lidx_send_counts),
            ] {
                recv[..n_l].copy_from_slice(local);
                grid.row_comm.broadcast_usize(&mut recv[..n_l], pc);
                let mut i = 0;
                while i * grid.npcol + pc < nsupers {
                    table[i * grid.npcol + pc] = recv[i];
                    i += 1;
                }
            }
        }

        let max_lval_count = lval_send_counts.iter().copied().max().unwrap_or(0);
        let max_lidx_count = lidx_send_counts.iter().copied().max().unwrap_or(0);
        let max_uval_count = uval_send_counts.iter().copied().max().unwrap_or(0);
        let max_uidx_count = uidx_send_counts.iter().copied().max().unwrap_or(0);

        let depth = opts.lookahead.max(1);
        let lval_recv = (0..depth).map(|_| vec![0.0; max_lval_count]).collect();
        let uval_recv = (0..depth).map(|_| vec![0.0; max_uval_count]).collect();
        let lidx_recv = (0..depth).map(|_| vec![0usize; max_lidx_count]).collect();
        let uidx_recv = (0..depth).map(|_| vec![0usize; max_uidx_count]).collect();

        let n_diag = opts.lookahead.max(2);
        let diag_bufs = (0..n_diag).map(|_| vec![0.0; ldt * ldt]).collect();
        let perm_bufs = (0..n_diag).map(|_| vec![0usize; ldt]).collect();

        Ok(LuEngine {
            grid,
            part,
            opts,
            l_panels,
            u_panels,
            lval_send_counts,
            uval_send_counts,
            lidx_send_counts,
            uidx_send_counts,
            max_lval_count,
            max_uval_count,
            max_lidx_count,
            max_uidx_count,
            lval_recv,
            uval_recv,
            lidx_recv,
            uidx_recv,
            bcast_lval: vec![BcastDesc::default(); depth],
            bcast_uval: vec![BcastDesc::default(); depth],
            bcast_lidx: vec![BcastDesc::default(); depth],
            bcast_uidx: vec![BcastDesc::default(); depth],
            diag_bufs,
            perm_bufs,
            bcast_diag_row: vec![BcastDesc::default(); n_diag],
            bcast_diag_col: vec![BcastDesc::default(); n_diag],
            perms: vec![Vec::new(); nsupers],
            kernel: Box::new(HostKernel),
            mirror: None,
            scratch: WorkerScratch::new(ldt),
            ldt,
            info: 0,
        })
    }

    pub fn n_supernodes(&self) -> usize {
        self.part.n_supernodes()
    }

    pub fn partition(&self) -> &SupernodePartition {
        &self.part
    }

    pub fn grid(&self) -> &ProcessGrid<C> {
        &self.grid
    }

    /// Exact serialized value size of supernode `k`'s column panel.
    pub fn lval_send_count(&self, k: usize) -> usize {
        self.lval_send_counts[k]
    }

    pub fn uval_send_count(&self, k: usize) -> usize {
        self.uval_send_counts[k]
    }

    pub fn lidx_send_count(&self, k: usize) -> usize {
        self.lidx_send_counts[k]
    }

    pub fn uidx_send_count(&self, k: usize) -> usize {
        self.uidx_send_counts[k]
    }

    pub fn max_counts(&self) -> (usize, usize, usize, usize) {
        (
            self.max_lval_count,
            self.max_uval_count,
            self.max_lidx_count,
            self.max_uidx_count,
        )
    }

    /// Shared status field: 0 = success, negative = failing step index.
    pub fn status(&self) -> i32 {
        self.info
    }

    pub fn l_panel(&self, slot: usize) -> &LPanel {
        &self.l_panels[slot]
    }

    pub fn u_panel(&self, slot: usize) -> &UPanel {
        &self.u_panels[slot]
    }

    /// Row interchange recorded for supernode `k` during its diagonal
    /// factorization; empty until that step has run on this process.
    pub fn perm(&self, k: usize) -> &[usize] {
        &self.perms[k]
    }

    /// Plan and instantiate the accelerator mirror for `free_bytes` of free
    /// device memory. Fatal if fewer than two lanes fit.
    pub fn setup_accel(&mut self, free_bytes: usize) -> Result<(), SluError> {
        let plan = MemoryPlan::new(
            &self.part,
            &self.l_panels,
            &self.u_panels,
            self.max_lval_count,
            self.max_uval_count,
            self.max_lidx_count,
            self.max_uidx_count,
            &self.opts,
        );
        let usable = MemoryPlan::usable_memory(free_bytes, &self.opts);
        let lanes = plan.plan_lanes(usable, &self.opts, &self.grid.world)?;
        self.mirror = Some(AccelMirror::new(
            &plan,
            lanes,
            &self.part,
            &self.l_panels,
            &self.u_panels,
        )?);
        Ok(())
    }

    /// Factor all supernodes left to right.
    ///
    /// Step `k`'s panel broadcast is followed by the look-ahead update of
    /// pivot `k+1`, whose diagonal factorization and panel solves then run
    /// before the bulk exclude-one update of step `k`.
    pub fn factor(&mut self) -> Result<(), SluError> {
        let nsupers = self.part.n_supernodes();
        if nsupers == 0 {
            return Ok(());
        }
        let depth = self.opts.lookahead.max(1);
        let n_diag = self.diag_bufs.len();

        self.diag_factor_and_panel_solve(0, 0)?;
        for k in 0..nsupers {
            let slot = k % depth;
            self.panel_bcast(k, slot);
            let (k_lpanel, k_upanel) = self.take_step_panels(k, slot);
            if k + 1 < nsupers {
                self.look_ahead_update(k, k + 1, &k_lpanel, &k_upanel)?;
                self.diag_factor_and_panel_solve(k + 1, (k + 1) % n_diag)?;
                self.schur_update_exclude_one(k, k + 1, &k_lpanel, &k_upanel)?;
            } else {
                self.schur_update(k, &k_lpanel, &k_upanel)?;
            }
            self.restore_step_panels(k, k_lpanel, k_upanel);
            log::debug!("supernode {k} of {nsupers} complete");
        }

        if let Some(mirror) = self.mirror.as_mut() {
            // refresh the device images so they hold the factors
            mirror.upload(&self.part, &self.l_panels, &self.u_panels);
        }
        Ok(())
    }

    /// DiagFactor, DiagBroadcast and PanelSolve states for supernode `k`.
    pub fn diag_factor_and_panel_solve(&mut self, k: usize, offset: usize) -> Result<(), SluError> {
        let ksupc = self.part.size(k);
        let (krow, kcol) = (self.grid.krow(k), self.grid.kcol(k));

        if self.grid.owns_diag(k) {
            let slot = self.grid.g2l_col(k);
            let factored = match self.l_panels[slot].diag_factor(self.opts.pivot_thresh) {
                Ok(f) => f,
                Err(e) => {
                    self.info = -(k as i32) - 1;
                    log::error!("diagonal factorization failed at supernode {k}");
                    return Err(e);
                }
            };
            self.diag_bufs[offset][..ksupc * ksupc].copy_from_slice(&factored.lu);
            self.perm_bufs[offset][..ksupc].copy_from_slice(&factored.perm);
        }

        if self.grid.myrow == krow {
            self.bcast_diag_row[offset] = BcastDesc::prepare(kcol, ksupc * ksupc);
            self.bcast_diag_row[offset].run_f64(&self.grid.row_comm, &mut self.diag_bufs[offset]);
            self.grid
                .row_comm
                .broadcast_usize(&mut self.perm_bufs[offset][..ksupc], kcol);
        }
        if self.grid.mycol == kcol {
            self.bcast_diag_col[offset] = BcastDesc::prepare(krow, ksupc * ksupc);
            self.bcast_diag_col[offset].run_f64(&self.grid.col_comm, &mut self.diag_bufs[offset]);
            self.grid
                .col_comm
                .broadcast_usize(&mut self.perm_bufs[offset][..ksupc], krow);
        }

        if self.grid.myrow == krow || self.grid.mycol == kcol {
            self.perms[k] = self.perm_bufs[offset][..ksupc].to_vec();
        }
        if self.grid.myrow == krow {
            let slot = self.grid.g2l_row(k);
            let (panel, diag, perm) = (
                &mut self.u_panels[slot],
                &self.diag_bufs[offset],
                &self.perm_bufs[offset],
            );
            panel.panel_solve(self.kernel.as_ref(), &diag[..ksupc * ksupc], &perm[..ksupc]);
        }
        if self.grid.mycol == kcol {
            let slot = self.grid.g2l_col(k);
            let (panel, diag) = (&mut self.l_panels[slot], &self.diag_bufs[offset]);
            panel.panel_solve(self.kernel.as_ref(), &diag[..ksupc * ksupc]);
        }
        Ok(())
    }

    /// PanelBroadcast state: ship the solved panels of supernode `k` across
    /// the orthogonal communicators into the look-ahead slot's buffers.
    /// Zero-size panels skip their broadcast.
    pub fn panel_bcast(&mut self, k: usize, slot: usize) {
        let (krow, kcol) = (self.grid.krow(k), self.grid.kcol(k));

        if self.uidx_send_counts[k] > 0 {
            if self.grid.myrow == krow {
                let p = &self.u_panels[self.grid.g2l_row(k)];
                let mut idx = Vec::new();
                p.write_index(&mut idx);
                self.uidx_recv[slot][..idx.len()].copy_from_slice(&idx);
                self.uval_recv[slot][..p.nzval_len()].copy_from_slice(p.vals());
            }
            self.bcast_uidx[slot] = BcastDesc::prepare(krow, self.uidx_send_counts[k]);
            self.bcast_uval[slot] = BcastDesc::prepare(krow, self.uval_send_counts[k]);
            self.bcast_uidx[slot].run_idx(&self.grid.col_comm, &mut self.uidx_recv[slot]);
            self.bcast_uval[slot].run_f64(&self.grid.col_comm, &mut self.uval_recv[slot]);
        }

        if self.lidx_send_counts[k] > 0 {
            if self.grid.mycol == kcol {
                let p = &self.l_panels[self.grid.g2l_col(k)];
                let mut idx = Vec::new();
                p.write_index(&mut idx);
                self.lidx_recv[slot][..idx.len()].copy_from_slice(&idx);
                self.lval_recv[slot][..p.nzval_len()].copy_from_slice(p.vals());
            }
            self.bcast_lidx[slot] = BcastDesc::prepare(kcol, self.lidx_send_counts[k]);
            self.bcast_lval[slot] = BcastDesc::prepare(kcol, self.lval_send_counts[k]);
            self.bcast_lidx[slot].run_idx(&self.grid.row_comm, &mut self.lidx_recv[slot]);
            self.bcast_lval[slot].run_f64(&self.grid.row_comm, &mut self.lval_recv[slot]);
        }
    }

    /// The panels of supernode `k` used by this process's update step:
    /// the owner's own panel, or a copy reassembled from the receive slot.
    fn take_step_panels(&mut self, k: usize, slot: usize) -> (LPanel, UPanel) {
        let ksupc = self.part.size(k);
        let k_lpanel = if self.grid.mycol == self.grid.kcol(k) {
            mem::take(&mut self.l_panels[self.grid.g2l_col(k)])
        } else if self.lidx_send_counts[k] > 0 {
            LPanel::from_buffers(k, ksupc, &self.lidx_recv[slot], &self.lval_recv[slot])
        } else {
            LPanel::default()
        };
        let k_upanel = if self.grid.myrow == self.grid.krow(k) {
            mem::take(&mut self.u_panels[self.grid.g2l_row(k)])
        } else if self.uidx_send_counts[k] > 0 {
            UPanel::from_buffers(k, ksupc, &self.uidx_recv[slot], &self.uval_recv[slot])
        } else {
            UPanel::default()
        };
        (k_lpanel, k_upanel)
    }

    fn restore_step_panels(&mut self, k: usize, k_lpanel: LPanel, k_upanel: UPanel) {
        if self.grid.mycol == self.grid.kcol(k) {
            self.l_panels[self.grid.g2l_col(k)] = k_lpanel;
        }
        if self.grid.myrow == self.grid.krow(k) {
            self.u_panels[self.grid.g2l_row(k)] = k_upanel;
        }
    }

    /// Hand the factored panels and row interchanges to the solve
    /// collaborator.
    pub fn into_factors(self) -> (Vec<LPanel>, Vec<UPanel>, Vec<Vec<usize>>) {
        (self.l_panels, self.u_panels, self.perms)
    }
}
