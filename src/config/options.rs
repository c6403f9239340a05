//! Tuning knobs for the factorization engine.
//!
//! This module provides the `FactorOptions` struct, which collects the
//! configuration consumed by the engine and the accelerator memory planner:
//! look-ahead depth, pivoting threshold, offload enablement and the
//! accelerator lane/memory limits.

/// Engine and accelerator configuration.
#[derive(Debug, Clone)]
pub struct FactorOptions {
    /// Number of concurrent in-flight pivot columns (look-ahead window depth).
    pub lookahead: usize,

    /// Relative pivot threshold: the diagonal entry is kept as the pivot when
    /// its magnitude is at least `pivot_thresh` times the column maximum.
    pub pivot_thresh: f64,

    /// Offload the Schur-complement update to the accelerator backend.
    pub accel_offload: bool,

    /// Hard upper bound on concurrent accelerator lanes.
    pub max_lanes: usize,

    /// Usable fraction of free accelerator memory.
    pub mem_fraction: f64,

    /// Number of processes sharing one accelerator.
    pub procs_per_accel: usize,

    /// Cap on the per-lane GEMM scratch buffer, in scalar entries.
    pub gemm_buffer_cap: usize,

    /// Worker threads for the block-product phase; 0 means one per logical
    /// CPU. Ignored without the `rayon` feature.
    pub workers: usize,
}

impl Default for FactorOptions {
    fn default() -> Self {
        FactorOptions {
            lookahead: 3,
            pivot_thresh: 1e-3,
            accel_offload: false,
            max_lanes: 16,
            mem_fraction: 0.9,
            procs_per_accel: 1,
            gemm_buffer_cap: 256 * 1024,
            workers: 0,
        }
    }
}
