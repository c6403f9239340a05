// Supernode partition ("xsup"): supernode k covers columns xsup[k]..xsup[k+1].

use crate::error::SluError;

/// Monotonic map from supernode index to its first global row/column.
///
/// Produced by an external symbolic-analysis collaborator; immutable once
/// built. All supernode sizes and ownership coordinates derive from it.
#[derive(Debug, Clone)]
pub struct SupernodePartition {
    xsup: Vec<usize>,
}

impl SupernodePartition {
    /// Wrap a first-column array. `xsup` must start at 0, end at the matrix
    /// dimension, and be strictly increasing.
    pub fn new(xsup: Vec<usize>) -> Result<Self, SluError> {
        if xsup.len() < 2 || xsup[0] != 0 {
            return Err(SluError::UnsupportedFormat(
                "supernode partition must start at column 0".into(),
            ));
        }
        if xsup.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SluError::UnsupportedFormat(
                "supernode partition is not strictly increasing".into(),
            ));
        }
        Ok(SupernodePartition { xsup })
    }

    /// Uniform partition: supernodes of `block` columns each (the last one
    /// possibly smaller).
    pub fn uniform(n: usize, block: usize) -> Self {
        let mut xsup = Vec::with_capacity(n.div_ceil(block) + 1);
        let mut c = 0;
        while c < n {
            xsup.push(c);
            c += block.min(n - c);
        }
        xsup.push(n);
        SupernodePartition { xsup }
    }

    pub fn n_supernodes(&self) -> usize {
        self.xsup.len() - 1
    }

    /// First global row/column of supernode `k`.
    pub fn first_col(&self, k: usize) -> usize {
        self.xsup[k]
    }

    /// Number of rows/columns in supernode `k`.
    pub fn size(&self, k: usize) -> usize {
        self.xsup[k + 1] - self.xsup[k]
    }

    /// Supernode containing global column `col`.
    pub fn supernode_of(&self, col: usize) -> usize {
        match self.xsup.binary_search(&col) {
            Ok(k) => k,
            Err(k) => k - 1,
        }
    }

    /// Maximum supernode size (the `ldt` of all dense scratch blocks).
    pub fn max_size(&self) -> usize {
        (0..self.n_supernodes()).map(|k| self.size(k)).max().unwrap_or(0)
    }

    /// The raw first-column array, e.g. for mirroring to an accelerator.
    pub fn as_slice(&self) -> &[usize] {
        &self.xsup
    }
}
