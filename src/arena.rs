use std::{mem, ptr::NonNull};

use crate::{
    block::BLOCK_HEADER_SIZE,
    error::ArenaError,
    kernel::PlatformMemory,
    list::{List, Node},
};

/// This is the overhead size introduced by the [`Arena`] header in bytes.
/// The header is represented as a [`Node`]. See [`List`] for more detail.
pub(crate) const ARENA_HEADER_SIZE: usize = mem::size_of::<Node<Arena>>();

/// Metadata of a memory region obtained from the kernel in one mapping call.
/// As every other header, it is stored as a [`Node<Arena>`] at the very start
/// of the region it describes, and the first block header follows it:
///
/// ```text
///   /--- arena metadata
///   |         /---- header of the first block
///   v         v
///   +---------+--------+-----------------------------+
///   | Arena   | Block  |.............................|
///   +---------+--------+-----------------------------+
///
///   |------------------- Arena.size -----------------|
/// ```
///
/// Arenas are never merged and never given back while the allocator lives.
/// We cannot assume two arenas are adjacent in the address space.
pub(crate) struct Arena {
    /// Total size of the mapping, metadata included.
    pub size: usize,
}

/// Smallest request `allocate_arena` accepts: one arena header plus one block header.
pub(crate) const MIN_ARENA_REQUEST: usize = ARENA_HEADER_SIZE + BLOCK_HEADER_SIZE;

/// Rounds `bytes` up to a multiple of `unit`, one `unit` at least.
///
/// Mapping calls are expensive, so arenas are always requested in big chunks.
pub(crate) fn page_align(bytes: usize, unit: usize) -> Option<usize> {
    bytes.max(unit).checked_next_multiple_of(unit)
}

/// Maps a brand new arena able to hold `bytes` (metadata included) and writes
/// its header. The arena is not linked anywhere yet, see [`append_arena`].
///
/// **SAFETY**: `unit` must be a multiple of the page size of `memory`.
pub(crate) unsafe fn allocate_arena<M: PlatformMemory>(
    memory: &mut M,
    bytes: usize,
    unit: usize,
) -> Result<NonNull<Node<Arena>>, ArenaError> {
    if bytes <= MIN_ARENA_REQUEST {
        return Err(ArenaError::TooSmall {
            requested: bytes,
            minimum: MIN_ARENA_REQUEST,
        });
    }

    let size = page_align(bytes, unit).ok_or(ArenaError::Overflow { requested: bytes })?;

    unsafe {
        let addr = memory
            .request_memory(size)
            .ok_or(ArenaError::MapFailed { len: size })?;

        log::trace!("mapped arena of {size} bytes at {addr:p}");

        Ok(Node::write(addr, Arena { size }))
    }
}

/// Adds `arena` at the end of the arena list. It becomes the head of the
/// list if it's the first one.
///
/// **SAFETY**: `arena` must come from [`allocate_arena`] and not be linked yet.
#[inline]
pub(crate) unsafe fn append_arena(arenas: &mut List<Arena>, arena: NonNull<Node<Arena>>) {
    unsafe { arenas.append(arena) }
}

/// Address of the first block header, right after the arena header.
#[inline]
pub(crate) fn first_block(arena: NonNull<Node<Arena>>) -> NonNull<u8> {
    unsafe { arena.cast::<u8>().add(ARENA_HEADER_SIZE) }
}

/// Usable space of the single free block carved out of a fresh arena.
#[inline]
pub(crate) unsafe fn initial_block_size(arena: NonNull<Node<Arena>>) -> usize {
    unsafe { arena.as_ref().data.size - ARENA_HEADER_SIZE - BLOCK_HEADER_SIZE }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ARENA_UNIT, kernel::testing::CountingMemory};

    #[test]
    fn page_align_rounds_up_to_the_unit() {
        assert_eq!(page_align(1, ARENA_UNIT), Some(ARENA_UNIT));
        assert_eq!(page_align(ARENA_UNIT, ARENA_UNIT), Some(ARENA_UNIT));
        assert_eq!(page_align(ARENA_UNIT + 1, ARENA_UNIT), Some(2 * ARENA_UNIT));
        assert_eq!(page_align(usize::MAX, ARENA_UNIT), None);
    }

    #[test]
    fn tiny_requests_are_rejected_without_mapping() {
        let mut memory = CountingMemory::default();

        let result = unsafe { allocate_arena(&mut memory, MIN_ARENA_REQUEST, ARENA_UNIT) };

        assert_eq!(
            result.err(),
            Some(ArenaError::TooSmall {
                requested: MIN_ARENA_REQUEST,
                minimum: MIN_ARENA_REQUEST,
            })
        );
        assert_eq!(memory.mapped, 0);
    }

    #[test]
    fn mapping_failure_is_reported() {
        let mut memory = CountingMemory {
            exhausted: true,
            ..Default::default()
        };

        let result = unsafe { allocate_arena(&mut memory, 4096, ARENA_UNIT) };

        assert_eq!(result.err(), Some(ArenaError::MapFailed { len: ARENA_UNIT }));
    }

    #[test]
    fn arenas_are_appended_in_order() {
        let mut memory = CountingMemory::default();
        let mut arenas = List::new();

        unsafe {
            let first = allocate_arena(&mut memory, 100, ARENA_UNIT).unwrap();
            let second = allocate_arena(&mut memory, ARENA_UNIT + 1, ARENA_UNIT).unwrap();
            append_arena(&mut arenas, first);
            append_arena(&mut arenas, second);

            assert_eq!(arenas.iter().next(), Some(first));
            assert_eq!(first.as_ref().next, Some(second));
            assert!(second.as_ref().next.is_none());
            assert_eq!(first.as_ref().data.size, ARENA_UNIT);
            assert_eq!(second.as_ref().data.size, 2 * ARENA_UNIT);
            assert_eq!(
                initial_block_size(first),
                ARENA_UNIT - ARENA_HEADER_SIZE - BLOCK_HEADER_SIZE
            );

            for arena in arenas.iter() {
                assert!(memory.return_memory(arena.cast(), arena.as_ref().data.size));
            }
        }

        assert_eq!(memory.mapped, 2);
        assert_eq!(arenas.len(), 2);
    }
}
