//! Accelerator memory planner and panel mirror.
//!
//! The planner splits usable device memory into a fixed part (partition
//! array, every local panel image, per-panel descriptors) and a per-lane part
//! (receive buffers for one look-ahead step, GEMM scratch, diagonal-factor
//! scratch). The lane count is whatever fits, capped by the look-ahead depth
//! and the hard device limit, then agreed globally by a min-reduction so all
//! processes allocate symmetric buffer sets. Everything is carved out of one
//! arena allocation.

use crate::accel::{Arena, ArenaSlice, DenseKernel, HostKernel};
use crate::config::FactorOptions;
use crate::error::SluError;
use crate::matrix::SupernodePartition;
use crate::panel::{LPanel, UPanel};
use crate::parallel::GridComm;

/// Device image of one panel: index and value sub-allocations.
#[derive(Debug, Clone, Copy)]
pub struct PanelImage {
    pub index: ArenaSlice,
    pub vals: ArenaSlice,
}

/// One concurrent execution lane: paired kernel handles (primary and
/// look-ahead, so look-ahead GEMMs never queue behind bulk work) plus the
/// lane-private scratch buffers.
pub struct Lane {
    pub kernel: HostKernel,
    pub la_kernel: HostKernel,
    pub lval_recv: ArenaSlice,
    pub uval_recv: ArenaSlice,
    pub lidx_recv: ArenaSlice,
    pub uidx_recv: ArenaSlice,
    pub gemm_buf: ArenaSlice,
    pub diag_buf: ArenaSlice,
    /// Dedicated look-ahead GEMM scratch, `ldt * ldt` entries: every single
    /// block product fits, so look-ahead work never shares `gemm_buf`.
    pub la_gemm_buf: ArenaSlice,
}

/// Byte requirements of the mirror, split fixed vs. per lane.
#[derive(Debug, Clone, Copy)]
pub struct MemoryPlan {
    pub fixed_bytes: usize,
    pub per_lane_bytes: usize,
    pub gemm_buffer_len: usize,
    pub max_lval: usize,
    pub max_uval: usize,
    pub max_lidx: usize,
    pub max_uidx: usize,
    pub ldt: usize,
}

const WORD: usize = size_of::<u64>();

impl MemoryPlan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        part: &SupernodePartition,
        l_panels: &[LPanel],
        u_panels: &[UPanel],
        max_lval: usize,
        max_uval: usize,
        max_lidx: usize,
        max_uidx: usize,
        opts: &FactorOptions,
    ) -> Self {
        let ldt = part.max_size();
        let mut fixed = part.as_slice().len() * WORD;
        let mut total_nzval = 0usize;
        for p in l_panels {
            fixed += p.total_bytes();
            total_nzval += p.nzval_len();
        }
        for p in u_panels {
            fixed += p.total_bytes();
            total_nzval += p.nzval_len();
        }
        fixed += l_panels.len() * size_of::<PanelImage>();
        fixed += u_panels.len() * size_of::<PanelImage>();

        let gemm_buffer_len = opts
            .gemm_buffer_cap
            .min(total_nzval)
            .max(ldt * ldt);
        let per_lane = 3 * WORD * max_lval
            + 3 * WORD * max_uval
            + 2 * WORD * max_lidx
            + 2 * WORD * max_uidx
            + gemm_buffer_len * WORD
            // diagonal-factor scratch plus the dedicated look-ahead GEMM buffer
            + 2 * ldt * ldt * WORD;

        MemoryPlan {
            fixed_bytes: fixed,
            per_lane_bytes: per_lane,
            gemm_buffer_len,
            max_lval,
            max_uval,
            max_lidx,
            max_uidx,
            ldt,
        }
    }

    /// Usable share of free device memory for this process.
    pub fn usable_memory(free_bytes: usize, opts: &FactorOptions) -> usize {
        ((opts.mem_fraction * free_bytes as f64) as usize) / opts.procs_per_accel.max(1)
    }

    /// Number of lanes to instantiate, agreed across all processes.
    ///
    /// Fewer than two lanes is a fatal configuration error; no single-lane
    /// fallback is attempted.
    pub fn plan_lanes<C: GridComm>(
        &self,
        usable_bytes: usize,
        opts: &FactorOptions,
        world: &C,
    ) -> Result<usize, SluError> {
        let two_lanes = self.fixed_bytes + 2 * self.per_lane_bytes;
        if two_lanes > usable_bytes {
            return Err(SluError::DeviceMemory {
                required: two_lanes,
                available: usable_bytes,
            });
        }
        let max_fit = (usable_bytes - self.fixed_bytes) / self.per_lane_bytes;
        let lanes = max_fit.min(opts.lookahead.max(2)).min(opts.max_lanes);
        let agreed = world.all_reduce_min(lanes as i32) as usize;
        log::info!("accelerator planner: {agreed} look-ahead lanes");
        Ok(agreed)
    }
}

/// Device-side shadow of all local panels plus the lane pool.
pub struct AccelMirror {
    arena: Arena,
    xsup: ArenaSlice,
    l_images: Vec<Option<PanelImage>>,
    u_images: Vec<Option<PanelImage>>,
    lanes: Vec<Lane>,
}

impl AccelMirror {
    /// Carve the mirror out of one allocation sized by the plan.
    pub fn new(
        plan: &MemoryPlan,
        n_lanes: usize,
        part: &SupernodePartition,
        l_panels: &[LPanel],
        u_panels: &[UPanel],
    ) -> Result<Self, SluError> {
        let mut arena = Arena::new(plan.fixed_bytes + n_lanes * plan.per_lane_bytes)?;

        let xsup = arena.alloc_idx(part.as_slice().len())?;

        let mut l_images = Vec::with_capacity(l_panels.len());
        for p in l_panels {
            l_images.push(if p.is_empty() {
                None
            } else {
                Some(PanelImage {
                    index: arena.alloc_idx(p.index_len())?,
                    vals: arena.alloc_f64(p.nzval_len())?,
                })
            });
        }
        let mut u_images = Vec::with_capacity(u_panels.len());
        for p in u_panels {
            u_images.push(if p.is_empty() {
                None
            } else {
                Some(PanelImage {
                    index: arena.alloc_idx(p.index_len())?,
                    vals: arena.alloc_f64(p.nzval_len())?,
                })
            });
        }

        let mut lanes = Vec::with_capacity(n_lanes);
        for _ in 0..n_lanes {
            lanes.push(Lane {
                kernel: HostKernel,
                la_kernel: HostKernel,
                lval_recv: arena.alloc_f64(plan.max_lval)?,
                uval_recv: arena.alloc_f64(plan.max_uval)?,
                lidx_recv: arena.alloc_idx(plan.max_lidx)?,
                uidx_recv: arena.alloc_idx(plan.max_uidx)?,
                gemm_buf: arena.alloc_f64(plan.gemm_buffer_len)?,
                diag_buf: arena.alloc_f64(plan.ldt * plan.ldt)?,
                la_gemm_buf: arena.alloc_f64(plan.ldt * plan.ldt)?,
            });
        }

        let mut mirror = AccelMirror {
            arena,
            xsup,
            l_images,
            u_images,
            lanes,
        };
        mirror.upload(part, l_panels, u_panels);
        Ok(mirror)
    }

    pub fn n_lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Copy the partition and every local panel into the device region.
    pub fn upload(&mut self, part: &SupernodePartition, l_panels: &[LPanel], u_panels: &[UPanel]) {
        self.arena.idxs_mut(self.xsup).copy_from_slice(part.as_slice());
        let mut idx_buf = Vec::new();
        for (p, img) in l_panels.iter().zip(&self.l_images) {
            if let Some(img) = img {
                p.write_index(&mut idx_buf);
                self.arena.idxs_mut(img.index).copy_from_slice(&idx_buf);
                self.arena.f64s_mut(img.vals).copy_from_slice(p.vals());
            }
        }
        for (p, img) in u_panels.iter().zip(&self.u_images) {
            if let Some(img) = img {
                p.write_index(&mut idx_buf);
                self.arena.idxs_mut(img.index).copy_from_slice(&idx_buf);
                self.arena.f64s_mut(img.vals).copy_from_slice(p.vals());
            }
        }
    }

    /// Copy the device-resident panel values back into the host panels.
    pub fn download(&self, l_panels: &mut [LPanel], u_panels: &mut [UPanel]) {
        for (p, img) in l_panels.iter_mut().zip(&self.l_images) {
            if let Some(img) = img {
                p.vals_mut().copy_from_slice(self.arena.f64s(img.vals));
            }
        }
        for (p, img) in u_panels.iter_mut().zip(&self.u_images) {
            if let Some(img) = img {
                p.vals_mut().copy_from_slice(self.arena.f64s(img.vals));
            }
        }
    }

    /// Run one GEMM on a lane, into the lane's scratch buffer.
    ///
    /// Look-ahead products use the lane's dedicated buffer and handle so they
    /// never wait on bulk work queued on the primary pair.
    #[allow(clippy::too_many_arguments)]
    pub fn lane_gemm(
        &mut self,
        lane: usize,
        look_ahead: bool,
        m: usize,
        n: usize,
        k: usize,
        a: &[f64],
        lda: usize,
        b: &[f64],
        ldb: usize,
    ) -> Vec<f64> {
        let l = &self.lanes[lane];
        let (kernel, buf) = if look_ahead {
            (l.la_kernel, l.la_gemm_buf)
        } else {
            (l.kernel, l.gemm_buf)
        };
        debug_assert!(m * n <= buf.len());
        let c = self.arena.f64s_mut(buf);
        kernel.gemm(m, n, k, 1.0, a, lda, b, ldb, &mut c[..m * n], m);
        c[..m * n].to_vec()
    }
}
