//! Accelerator backend: dense kernels, the single-allocation arena, the
//! memory planner and the device mirror of the panel data.
//!
//! Dense algebra is a capability interface (`DenseKernel`) with the backend
//! selected by configuration, not conditional compilation. The host backend
//! wraps faer; an accelerator lane pairs a kernel handle with its own scratch
//! buffers carved out of one arena so lanes never race.

pub mod arena;
pub mod planner;

pub use arena::{Arena, ArenaSlice};
pub use planner::{AccelMirror, MemoryPlan};

use faer::linalg::matmul::matmul;
use faer::{Accum, MatMut, MatRef, Par};

/// Dense linear-algebra capability used by the factorization.
pub trait DenseKernel: Send + Sync {
    /// C := alpha * A * B, all column-major with explicit leading dimensions.
    #[allow(clippy::too_many_arguments)]
    fn gemm(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: f64,
        a: &[f64],
        lda: usize,
        b: &[f64],
        ldb: usize,
        c: &mut [f64],
        ldc: usize,
    );

    /// In-place right triangular solve B := B * U^-1 with U upper triangular
    /// (non-unit diagonal), B of size m x n.
    fn trsm_right_upper(&self, m: usize, n: usize, u: &[f64], ldu: usize, b: &mut [f64], ldb: usize);

    /// In-place left triangular solve B := L^-1 * B with L unit lower
    /// triangular, B of size m x n (m is the dimension of L).
    fn trsm_left_unit_lower(&self, m: usize, n: usize, l: &[f64], ldl: usize, b: &mut [f64], ldb: usize);
}

/// Host execution backend, GEMM delegated to faer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostKernel;

impl DenseKernel for HostKernel {
    fn gemm(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: f64,
        a: &[f64],
        lda: usize,
        b: &[f64],
        ldb: usize,
        c: &mut [f64],
        ldc: usize,
    ) {
        if m == 0 || n == 0 {
            return;
        }
        let a = MatRef::from_column_major_slice_with_stride(a, m, k, lda);
        let b = MatRef::from_column_major_slice_with_stride(b, k, n, ldb);
        let c = MatMut::from_column_major_slice_with_stride_mut(c, m, n, ldc);
        matmul(c, Accum::Replace, a, b, alpha, Par::Seq);
    }

    fn trsm_right_upper(&self, m: usize, n: usize, u: &[f64], ldu: usize, b: &mut [f64], ldb: usize) {
        for j in 0..n {
            for p in 0..j {
                let upj = u[p + j * ldu];
                if upj != 0.0 {
                    for i in 0..m {
                        b[i + j * ldb] -= upj * b[i + p * ldb];
                    }
                }
            }
            let d = u[j + j * ldu];
            for i in 0..m {
                b[i + j * ldb] /= d;
            }
        }
    }

    fn trsm_left_unit_lower(&self, m: usize, n: usize, l: &[f64], ldl: usize, b: &mut [f64], ldb: usize) {
        for j in 0..n {
            for i in 1..m {
                let mut s = b[i + j * ldb];
                for p in 0..i {
                    s -= l[i + p * ldl] * b[p + j * ldb];
                }
                b[i + j * ldb] = s;
            }
        }
    }
}
