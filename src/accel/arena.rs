//! Single-allocation arena for the accelerator mirror.
//!
//! All panel images and per-lane buffers are carved out of one owned region
//! by offset, so the mirror costs exactly one allocation regardless of panel
//! count. Sub-allocations are typed (`f64` values or `usize` indices) and
//! handed out as `ArenaSlice` handles.

use crate::error::SluError;

// Index sub-slices reinterpret the 8-byte backing words in place.
const _: () = assert!(size_of::<usize>() == size_of::<u64>());
const _: () = assert!(size_of::<f64>() == size_of::<u64>());

/// Handle to a typed sub-allocation, in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSlice {
    off: usize,
    len: usize,
}

impl ArenaSlice {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One contiguous 8-byte-aligned region with bump sub-allocation.
pub struct Arena {
    words: Box<[u64]>,
    top: usize,
}

impl Arena {
    /// Allocate the whole region up front. Fails rather than over-committing.
    pub fn new(bytes: usize) -> Result<Self, SluError> {
        let nwords = bytes.div_ceil(size_of::<u64>());
        let mut v = Vec::new();
        if v.try_reserve_exact(nwords).is_err() {
            return Err(SluError::Allocation(format!(
                "arena region of {bytes} bytes"
            )));
        }
        v.resize(nwords, 0u64);
        Ok(Arena {
            words: v.into_boxed_slice(),
            top: 0,
        })
    }

    fn alloc(&mut self, len: usize) -> Result<ArenaSlice, SluError> {
        if self.top + len > self.words.len() {
            return Err(SluError::Allocation(format!(
                "arena exhausted: requested {len} words, {} free",
                self.words.len() - self.top
            )));
        }
        let s = ArenaSlice { off: self.top, len };
        self.top += len;
        Ok(s)
    }

    /// Carve a value buffer of `len` scalars.
    pub fn alloc_f64(&mut self, len: usize) -> Result<ArenaSlice, SluError> {
        self.alloc(len)
    }

    /// Carve an index buffer of `len` entries.
    pub fn alloc_idx(&mut self, len: usize) -> Result<ArenaSlice, SluError> {
        self.alloc(len)
    }

    pub fn f64s(&self, s: ArenaSlice) -> &[f64] {
        let w = &self.words[s.off..s.off + s.len];
        // Safety: same size and alignment as u64, every bit pattern valid.
        unsafe { std::slice::from_raw_parts(w.as_ptr() as *const f64, w.len()) }
    }

    pub fn f64s_mut(&mut self, s: ArenaSlice) -> &mut [f64] {
        let w = &mut self.words[s.off..s.off + s.len];
        // Safety: as above, and the borrow is exclusive.
        unsafe { std::slice::from_raw_parts_mut(w.as_mut_ptr() as *mut f64, w.len()) }
    }

    pub fn idxs(&self, s: ArenaSlice) -> &[usize] {
        let w = &self.words[s.off..s.off + s.len];
        // Safety: usize is 8 bytes per the compile-time assert above.
        unsafe { std::slice::from_raw_parts(w.as_ptr() as *const usize, w.len()) }
    }

    pub fn idxs_mut(&mut self, s: ArenaSlice) -> &mut [usize] {
        let w = &mut self.words[s.off..s.off + s.len];
        // Safety: as above, and the borrow is exclusive.
        unsafe { std::slice::from_raw_parts_mut(w.as_mut_ptr() as *mut usize, w.len()) }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.words.len() * size_of::<u64>()
    }

    pub fn remaining_bytes(&self) -> usize {
        (self.words.len() - self.top) * size_of::<u64>()
    }
}
