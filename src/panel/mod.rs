//! Block-sparse panels: the per-supernode storage of the L and U factors.
//!
//! A panel holds the nonzero blocks below (L) or right of (U) one diagonal
//! supernode block in compressed "skyline" form: an ordered list of block
//! entries keyed by global block id, over one dense value buffer with a
//! shared leading dimension. Block ids within a panel are strictly
//! increasing, so lookup is a binary search.

pub mod lpanel;
pub mod upanel;

pub use lpanel::LPanel;
pub use upanel::UPanel;

/// One nonzero block entry of a panel.
///
/// `off` is both the offset into the panel's index array and the position of
/// the block's first row (L) or column (U) in the value buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelBlock {
    /// Global block-row (L) or block-column (U) id.
    pub gid: usize,
    pub off: usize,
    pub len: usize,
}

/// Factored diagonal block: combined unit-lower/upper LU in one dense
/// column-major block, plus the row interchange applied during pivoting.
///
/// `perm[i]` is the original row of the block now sitting in position `i`,
/// i.e. `(P A)[i, :] = A[perm[i], :]`.
#[derive(Debug, Clone)]
pub struct DiagLU {
    pub n: usize,
    pub lu: Vec<f64>,
    pub perm: Vec<usize>,
}

/// Serialized index header: block count and total compressed length.
pub(crate) const IDX_HEADER: usize = 2;

pub(crate) fn write_index(blocks: &[PanelBlock], ids: &[usize], out: &mut Vec<usize>) {
    out.clear();
    out.push(blocks.len());
    out.push(ids.len());
    for b in blocks {
        out.push(b.gid);
        out.push(b.len);
    }
    out.extend_from_slice(ids);
}

pub(crate) fn read_index(buf: &[usize]) -> (Vec<PanelBlock>, Vec<usize>) {
    let nb = buf[0];
    let total = buf[1];
    let mut blocks = Vec::with_capacity(nb);
    let mut off = 0;
    for b in 0..nb {
        let gid = buf[IDX_HEADER + 2 * b];
        let len = buf[IDX_HEADER + 2 * b + 1];
        blocks.push(PanelBlock { gid, off, len });
        off += len;
    }
    debug_assert_eq!(off, total);
    let ids = buf[IDX_HEADER + 2 * nb..IDX_HEADER + 2 * nb + total].to_vec();
    (blocks, ids)
}

/// Serialized index length for a panel with `nb` blocks and `total` ids.
pub(crate) fn index_len(nb: usize, total: usize) -> usize {
    if nb == 0 { 0 } else { IDX_HEADER + 2 * nb + total }
}

pub(crate) fn find_block(blocks: &[PanelBlock], gid: usize) -> Option<usize> {
    blocks.binary_search_by_key(&gid, |b| b.gid).ok()
}
