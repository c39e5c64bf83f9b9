//! Helper functions that don't particularly belong to any concrete module of the allocator.

use std::mem;

/// Every block size handed out by the allocator is a multiple of this, which
/// keeps every header that follows a payload naturally aligned.
pub(crate) const WORD_SIZE: usize = mem::size_of::<usize>();

/// It aligns `to_be_aligned` using `aligment`, which must be a power of two.
///
/// This method is used to round block sizes up to a multiple of [`WORD_SIZE`]
/// because headers written after a payload have to be aligned.
pub fn align(to_be_aligned: usize, aligment: usize) -> usize {
    (to_be_aligned + aligment - 1) & !(aligment - 1)
}
