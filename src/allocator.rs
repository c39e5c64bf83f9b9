use std::{mem, ptr::NonNull};

use crate::{
    arena::{self, ARENA_HEADER_SIZE, Arena},
    block::{self, BLOCK_HEADER_SIZE, Block},
    config::Config,
    kernel::{PlatformMemory, SystemMemory},
    list::{List, Node, Ring},
};

/// Alignment of every pointer returned by the allocator. Arenas start on a
/// page boundary and every header and block size is a multiple of a word.
pub const MIN_ALIGN: usize = mem::align_of::<Node<Block>>();

/// Largest request we even try to serve. Anything above can't be described
/// by a [`std::alloc::Layout`] anyway, and it keeps the size arithmetic
/// below from overflowing.
const MAX_REQUEST: usize = isize::MAX as usize - ARENA_HEADER_SIZE - BLOCK_HEADER_SIZE;

/// The allocator. It owns every arena it ever mapped and a single ring of
/// blocks that spans all of them:
///
/// ```text
///        +---------------------------------------------------------------------+
///        v                                                                     |
/// +------|-----------------------------+      +--------------------------------|--+
/// |       | +-------+    +-------+     |      |       | +-------+    +-------+ |  |
/// | Arena | | Block | -> | Block | ->  | ---> | Arena | | Block | -> | Block | +  |
/// |       | +-------+    +-------+   \ |      |       | +-------+    +-------+    |
/// +----------------------------------|-+      +-----------------------^-----------+
///                                    +--------------------------------+
/// ```
///
/// The ring is anchored at the first block of the first arena. That block
/// can never be absorbed by a neighbour, since nothing sits before it.
///
/// Nothing is mapped until the first allocation. Dropping the allocator
/// unmaps every arena, so every pointer it handed out dangles afterwards.
///
/// There is no locking in here; see [`crate::LockedMmal`] for a version
/// that can be shared.
pub struct Mmal<M: PlatformMemory = SystemMemory> {
    /// Every arena, in mapping order.
    arenas: List<Arena>,
    /// Every block of every arena.
    blocks: Ring<Block>,
    /// Where arenas come from.
    memory: M,
    config: Config,
}

// The allocator exclusively owns all the memory its pointers reach.
unsafe impl<M: PlatformMemory + Send> Send for Mmal<M> {}

impl Mmal<SystemMemory> {
    /// Allocator with the default [`Config`] on top of [`SystemMemory`].
    pub const fn new() -> Self {
        Self::with_config(SystemMemory, Config::DEFAULT)
    }
}

impl Default for Mmal<SystemMemory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: PlatformMemory> Mmal<M> {
    pub const fn with_config(memory: M, config: Config) -> Self {
        Self {
            arenas: List::new(),
            blocks: Ring::new(),
            memory,
            config,
        }
    }

    pub fn with_memory(memory: M) -> Self {
        Self::with_config(memory, Config::DEFAULT)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocates at least `size` bytes.
    ///
    /// Free blocks are searched first-fit, from the first block of the first
    /// arena around the whole ring. Only when none fits is a new arena mapped.
    /// Returns `None` if `size` is zero or the kernel refuses more memory.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 || size > MAX_REQUEST {
            return None;
        }

        let node = match self.first_fit(size) {
            Some(node) => node,
            None => self.map_block(size)?,
        };

        unsafe {
            self.split_off_rest(node, size);
            (*node.as_ptr()).data.used = size;
        }

        log::trace!("allocated {size} bytes at {:p}", block::payload(node));

        Some(block::payload(node))
    }

    /// Gives back memory obtained from this allocator. A null `ptr` does nothing.
    ///
    /// The block is merged with its successor and then with its predecessor
    /// whenever they are free and contiguous, so a block freed between two
    /// free neighbours ends up as a single block.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by [`Mmal::allocate`] or
    /// [`Mmal::reallocate`] on this same allocator that hasn't been freed yet.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        unsafe {
            let node = block::from_payload(ptr);
            (*node.as_ptr()).data.used = 0;

            log::trace!("freed {} bytes at {ptr:p}", node.as_ref().data.size);

            self.coalesce(node);
        }
    }

    /// Resizes the allocation at `ptr` to `size` bytes, keeping its content
    /// up to the smaller of both sizes.
    ///
    /// Shrinking never moves the allocation. Growing first tries to absorb
    /// the following free block in place, and only then moves the content
    /// to a new allocation. If that fails, `None` is returned and `ptr` is
    /// still valid and untouched.
    ///
    /// A null `ptr` returns `None` without allocating. A zero `size` frees
    /// `ptr` and returns `None`.
    ///
    /// # Safety
    ///
    /// Same as [`Mmal::free`].
    pub unsafe fn reallocate(&mut self, ptr: *mut u8, size: usize) -> Option<NonNull<u8>> {
        let ptr = NonNull::new(ptr)?;

        if size == 0 {
            unsafe { self.free(ptr.as_ptr()) };
            return None;
        }

        if size > MAX_REQUEST {
            return None;
        }

        unsafe {
            let node = block::from_payload(ptr);
            let (usable, used) = {
                let block = &node.as_ref().data;
                (block.size, block.used)
            };

            if size <= usable {
                if size < usable {
                    (*node.as_ptr()).data.used = 0;
                    self.split_off_rest(node, size);
                }
                (*node.as_ptr()).data.used = size;

                return Some(ptr);
            }

            if self.grow_in_place(node, size) {
                log::trace!("grew {ptr:p} in place to {size} bytes");
                return Some(ptr);
            }

            let new = self.allocate(size)?;
            std::ptr::copy_nonoverlapping(ptr.as_ptr(), new.as_ptr(), used);
            self.free(ptr.as_ptr());

            log::trace!("moved {used} bytes from {ptr:p} to {new:p}");

            Some(new)
        }
    }

    /// First free block of the ring with at least `size` usable bytes.
    fn first_fit(&self, size: usize) -> Option<NonNull<Node<Block>>> {
        self.blocks.iter().find(|node| unsafe {
            let block = &node.as_ref().data;
            block.is_free() && block.size >= size
        })
    }

    /// Maps a new arena big enough for `size` bytes and links its only
    /// (free) block at the end of the ring.
    fn map_block(&mut self, size: usize) -> Option<NonNull<Node<Block>>> {
        let requested = size + ARENA_HEADER_SIZE + BLOCK_HEADER_SIZE;
        let unit = self.config.effective_unit(self.memory.page_size());

        unsafe {
            let arena = match arena::allocate_arena(&mut self.memory, requested, unit) {
                Ok(arena) => arena,
                Err(err) => {
                    log::warn!("arena allocation failed: {err}");
                    return None;
                }
            };

            arena::append_arena(&mut self.arenas, arena);

            let node = block::construct_free(arena::first_block(arena), arena::initial_block_size(arena))?;
            self.blocks.push_back(node);

            log::trace!(
                "{} arenas mapped, {} blocks in the ring",
                self.arenas.len(),
                self.blocks.len()
            );

            Some(node)
        }
    }

    /// Leaves `node` with just enough room for `size` bytes when the rest is
    /// big enough to be a block of its own. The rest is merged with whatever
    /// free block follows it.
    unsafe fn split_off_rest(&mut self, node: NonNull<Node<Block>>, size: usize) {
        unsafe {
            if !block::should_split(node, size) {
                return;
            }

            if let Some(rest) = block::split(&mut self.blocks, node, size) {
                let next = self.blocks.successor(rest);
                if block::can_merge(&self.blocks, rest, next) {
                    block::merge(&mut self.blocks, rest, next);
                }
            }
        }
    }

    /// Merges a freshly freed `node` with its free neighbours. Returns the
    /// block that now contains it.
    unsafe fn coalesce(&mut self, node: NonNull<Node<Block>>) -> NonNull<Node<Block>> {
        unsafe {
            let next = self.blocks.successor(node);
            if block::can_merge(&self.blocks, node, next) {
                block::merge(&mut self.blocks, node, next);
            }

            let prev = self.blocks.predecessor(node);
            if block::can_merge(&self.blocks, prev, node) {
                block::merge(&mut self.blocks, prev, node);
                return prev;
            }

            node
        }
    }

    /// Grows the in-use `node` to `size` bytes by absorbing the free block
    /// right after it, if there is one and it is big enough.
    unsafe fn grow_in_place(&mut self, node: NonNull<Node<Block>>, size: usize) -> bool {
        unsafe {
            let used = node.as_ref().data.used;
            let next = self.blocks.successor(node);
            let available = node.as_ref().data.size + BLOCK_HEADER_SIZE + next.as_ref().data.size;

            // `can_merge` only looks at free blocks.
            (*node.as_ptr()).data.used = 0;

            if available < size || !block::can_merge(&self.blocks, node, next) {
                (*node.as_ptr()).data.used = used;
                return false;
            }

            block::merge(&mut self.blocks, node, next);
            self.split_off_rest(node, size);
            (*node.as_ptr()).data.used = size;

            true
        }
    }
}

impl<M: PlatformMemory> Drop for Mmal<M> {
    fn drop(&mut self) {
        // The iterator reads the next link before handing out an arena,
        // so unmapping it right away is fine.
        for arena in self.arenas.iter() {
            unsafe {
                let size = arena.as_ref().data.size;
                if !self.memory.return_memory(arena.cast(), size) {
                    log::warn!("failed to unmap arena of {size} bytes at {arena:p}");
                }
            }
        }
    }
}
