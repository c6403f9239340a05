//! Process-grid communicators for the distributed factorization.
//!
//! The engine communicates exclusively through blocking collectives over a
//! 2D process grid (optionally replicated along a depth dimension). The
//! `GridComm` trait abstracts the collective surface so the same engine runs
//! on a single process (`SerialComm`) or across ranks (`MpiComm`, behind the
//! `mpi` feature).

pub trait GridComm {
    /// Rank of this process within the communicator.
    fn rank(&self) -> usize;
    /// Number of processes in the communicator.
    fn size(&self) -> usize;
    /// Synchronize all processes.
    fn barrier(&self);
    /// Broadcast a slice of values from `root` to every process.
    fn broadcast_f64(&self, buf: &mut [f64], root: usize);
    /// Broadcast a slice of indices from `root` to every process.
    fn broadcast_usize(&self, buf: &mut [usize], root: usize);
    /// Global minimum over all processes.
    fn all_reduce_min(&self, x: i32) -> i32;
}

/// Single-process communicator: every collective is a local no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl GridComm for SerialComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn broadcast_f64(&self, _buf: &mut [f64], _root: usize) {}
    fn broadcast_usize(&self, _buf: &mut [usize], _root: usize) {}
    fn all_reduce_min(&self, x: i32) -> i32 {
        x
    }
}

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

/// 2D process grid with a replicated depth dimension.
///
/// Wraps the world communicator plus the row, column and depth-replicate
/// sub-communicators this process belongs to, and exposes the block-cyclic
/// rank-to-(row, col) ownership mapping used by the factorization.
pub struct ProcessGrid<C: GridComm> {
    pub nprow: usize,
    pub npcol: usize,
    pub npdep: usize,
    /// Row coordinate of this process in the grid.
    pub myrow: usize,
    /// Column coordinate of this process in the grid.
    pub mycol: usize,
    /// All processes of the job.
    pub world: C,
    /// Processes in my process row (spans the column dimension).
    pub row_comm: C,
    /// Processes in my process column (spans the row dimension).
    pub col_comm: C,
    /// Replicas of my (row, col) position along the depth dimension.
    pub depth_comm: C,
}

impl ProcessGrid<SerialComm> {
    /// 1x1x1 grid for single-process runs and tests.
    pub fn serial() -> Self {
        ProcessGrid {
            nprow: 1,
            npcol: 1,
            npdep: 1,
            myrow: 0,
            mycol: 0,
            world: SerialComm,
            row_comm: SerialComm,
            col_comm: SerialComm,
            depth_comm: SerialComm,
        }
    }
}

impl<C: GridComm> ProcessGrid<C> {
    /// Process row owning block row `k` (block-cyclic layout).
    pub fn krow(&self, k: usize) -> usize {
        k % self.nprow
    }

    /// Process column owning block column `k`.
    pub fn kcol(&self, k: usize) -> usize {
        k % self.npcol
    }

    /// Local row-panel slot of global block row `k`.
    pub fn g2l_row(&self, k: usize) -> usize {
        k / self.nprow
    }

    /// Local column-panel slot of global block column `k`.
    pub fn g2l_col(&self, k: usize) -> usize {
        k / self.npcol
    }

    /// True when this process owns the diagonal block of supernode `k`.
    pub fn owns_diag(&self, k: usize) -> bool {
        self.myrow == self.krow(k) && self.mycol == self.kcol(k)
    }

    /// Number of local column-panel slots for `nsupers` supernodes.
    pub fn n_col_slots(&self, nsupers: usize) -> usize {
        nsupers.div_ceil(self.npcol)
    }

    /// Number of local row-panel slots for `nsupers` supernodes.
    pub fn n_row_slots(&self, nsupers: usize) -> usize {
        nsupers.div_ceil(self.nprow)
    }
}
