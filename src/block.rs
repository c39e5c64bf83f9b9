use std::{mem, ptr::NonNull};

use crate::{
    list::{Node, Ring},
    utils::{WORD_SIZE, align},
};

/// Header size of a block. We need to add the overhead introduced by our
/// [`Node`] structure since we always use our `Block` as a node of the ring.
pub(crate) const BLOCK_HEADER_SIZE: usize = mem::size_of::<Node<Block>>();

/// This is the structure of a block. The fields of the block are its metadata,
/// content is placed after this header.
///
/// The following diagram represents this structure ignoring that the block
/// will be wrapped inside a [`Node`]:
///
/// ```text
///   ---+--------+----------------------------+---
///      | Header |DDD occupied DDDD...free...|
///   ---+--------+-----------------+----------+---
///               |-- Block.used ---|
///               |-- Block.size --------------|
/// ```
///
/// `size` is always a multiple of [`WORD_SIZE`], so a header written right
/// after the payload of another block is aligned as well. `used` keeps the
/// exact byte count the user asked for.
pub(crate) struct Block {
    /// Usable bytes after the header.
    pub size: usize,
    /// Bytes handed out to the user. Zero means the block is free.
    pub used: usize,
}

impl Block {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.used == 0
    }
}

/// Pointer to the content of the block, right after its header.
#[inline]
pub(crate) fn payload(node: NonNull<Node<Block>>) -> NonNull<u8> {
    unsafe { node.cast::<u8>().add(BLOCK_HEADER_SIZE) }
}

/// Recovers the header that precedes a pointer returned by [`payload`].
///
/// **SAFETY**: `ptr` must have been obtained from [`payload`].
#[inline]
pub(crate) unsafe fn from_payload(ptr: NonNull<u8>) -> NonNull<Node<Block>> {
    unsafe { ptr.sub(BLOCK_HEADER_SIZE).cast() }
}

/// Writes the header of a free block with `size` usable bytes at `addr`.
/// The block is not part of the ring yet.
///
/// Returns `None` for a zero `size`, which would describe a block nobody
/// could ever use.
///
/// **SAFETY**: `addr` must be word aligned and valid for `BLOCK_HEADER_SIZE + size` bytes.
pub(crate) unsafe fn construct_free(addr: NonNull<u8>, size: usize) -> Option<NonNull<Node<Block>>> {
    if size == 0 {
        log::warn!("refusing to build an empty block at {addr:p}");
        return None;
    }

    unsafe { Some(Node::write(addr, Block { size, used: 0 })) }
}

/// Tells whether the free block `node` has room for `requested` bytes plus
/// another block (header and at least one word) after them.
pub(crate) unsafe fn should_split(node: NonNull<Node<Block>>, requested: usize) -> bool {
    let block = unsafe { &node.as_ref().data };

    if !block.is_free() || requested == 0 {
        return false;
    }

    block.size > align(requested, WORD_SIZE) + BLOCK_HEADER_SIZE
}

/// Splits one block in two, keeping `requested` bytes (rounded up to a word)
/// in `node` and turning the rest into a new free block right after it.
///
/// ```text
/// Before:        |---- size -----------------|
///
///    -----+------+---------------------------+----
///         |Header|...........................|
///    -----+------+---------------------------+----
///
/// After:         |- requested -|
///
///    -----+------+-------------+------+------+----
///     ... |Header|.............|Header|......|
///    -----+------+-------------+------+------+----
///             \---next---------^  \--next----^
/// ```
///
/// Returns the new (right) block.
///
/// **SAFETY**: `node` must belong to `ring` and [`should_split`] must hold.
pub(crate) unsafe fn split(
    ring: &mut Ring<Block>,
    mut node: NonNull<Node<Block>>,
    requested: usize,
) -> Option<NonNull<Node<Block>>> {
    let requested = align(requested, WORD_SIZE);

    unsafe {
        let size = node.as_ref().data.size;
        if size < requested + BLOCK_HEADER_SIZE {
            return None;
        }

        let rest = construct_free(payload(node).add(requested), size - requested - BLOCK_HEADER_SIZE)?;
        node.as_mut().data.size = requested;

        ring.insert_after(node, rest);

        Some(rest)
    }
}

/// Tells whether `left` can absorb `right`: both free, `right` follows
/// `left` in the ring and its header starts exactly where the payload of
/// `left` ends. Blocks of different arenas are never contiguous this way,
/// since every arena starts with its own header.
pub(crate) unsafe fn can_merge(
    ring: &Ring<Block>,
    left: NonNull<Node<Block>>,
    right: NonNull<Node<Block>>,
) -> bool {
    if left == right {
        return false;
    }

    unsafe {
        let (l, r) = (&left.as_ref().data, &right.as_ref().data);

        l.is_free()
            && r.is_free()
            && ring.successor(left) == right
            && payload(left).as_ptr().addr() + l.size == right.as_ptr().addr()
    }
}

/// Folds `right` into `left`, header included. `right` stops existing as a block.
///
/// **SAFETY**: [`can_merge`] must hold for `left` and `right`.
pub(crate) unsafe fn merge(
    ring: &mut Ring<Block>,
    mut left: NonNull<Node<Block>>,
    right: NonNull<Node<Block>>,
) {
    unsafe {
        left.as_mut().data.size += right.as_ref().data.size + BLOCK_HEADER_SIZE;
        ring.remove(right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Word aligned scratch space standing in for an arena.
    fn scratch(words: usize) -> Vec<usize> {
        vec![0; words]
    }

    fn base(buf: &mut [usize]) -> NonNull<u8> {
        NonNull::new(buf.as_mut_ptr()).unwrap().cast()
    }

    #[test]
    fn empty_blocks_are_not_built() {
        let mut buf = scratch(8);

        assert!(unsafe { construct_free(base(&mut buf), 0) }.is_none());
    }

    #[test]
    fn payload_round_trips_to_header() {
        let mut buf = scratch(16);

        unsafe {
            let node = construct_free(base(&mut buf), 64).unwrap();
            assert_eq!(from_payload(payload(node)), node);
            assert!(node.as_ref().data.is_free());
        }
    }

    #[test]
    fn split_needs_room_for_a_header() {
        let mut buf = scratch(64);
        let size = 8 * WORD_SIZE;

        unsafe {
            let mut node = construct_free(base(&mut buf), size).unwrap();

            assert!(should_split(node, size - BLOCK_HEADER_SIZE - WORD_SIZE));
            assert!(!should_split(node, size - BLOCK_HEADER_SIZE));
            assert!(!should_split(node, size));
            assert!(!should_split(node, 0));

            node.as_mut().data.used = 1;
            assert!(!should_split(node, 1));
        }
    }

    #[test]
    fn split_carves_the_rest_into_a_free_block() {
        let mut buf = scratch(64);
        let mut ring = Ring::new();
        let size = 32 * WORD_SIZE;

        unsafe {
            let node = construct_free(base(&mut buf), size).unwrap();
            ring.push_back(node);

            let rest = split(&mut ring, node, 13).unwrap();

            assert_eq!(node.as_ref().data.size, 16);
            assert_eq!(rest.as_ref().data.size, size - 16 - BLOCK_HEADER_SIZE);
            assert!(rest.as_ref().data.is_free());
            assert_eq!(ring.successor(node), rest);
            assert_eq!(ring.successor(rest), node);
            assert_eq!(payload(node).as_ptr().addr() + 16, rest.as_ptr().addr());
        }
    }

    #[test]
    fn merge_undoes_split() {
        let mut buf = scratch(64);
        let mut ring = Ring::new();
        let size = 32 * WORD_SIZE;

        unsafe {
            let node = construct_free(base(&mut buf), size).unwrap();
            ring.push_back(node);
            let rest = split(&mut ring, node, 24).unwrap();

            assert!(can_merge(&ring, node, rest));
            // Order matters: the right block never absorbs its left neighbour.
            assert!(!can_merge(&ring, rest, node));

            merge(&mut ring, node, rest);

            assert_eq!(node.as_ref().data.size, size);
            assert_eq!(ring.len(), 1);
            assert_eq!(ring.successor(node), node);
        }
    }

    #[test]
    fn used_or_distant_blocks_do_not_merge() {
        let mut first = scratch(32);
        let mut second = scratch(32);
        let mut ring = Ring::new();

        unsafe {
            let a = construct_free(base(&mut first), 16 * WORD_SIZE).unwrap();
            let b = construct_free(base(&mut second), 16 * WORD_SIZE).unwrap();
            ring.push_back(a);
            ring.push_back(b);

            // Ring neighbours living in different regions.
            assert!(!can_merge(&ring, a, b));
            assert!(!can_merge(&ring, a, a));

            let mut c = split(&mut ring, a, 8).unwrap();
            c.as_mut().data.used = 8;
            assert!(!can_merge(&ring, a, c));
        }
    }
}
