use std::alloc::{GlobalAlloc, Layout};
use std::ptr;

use spin::Mutex;

use crate::{allocator::MIN_ALIGN, config::Config, kernel::SystemMemory, Mmal};

/// [`Mmal`] behind a spin lock, so it can serve a whole process:
///
/// ```no_run
/// use mmal::LockedMmal;
///
/// #[global_allocator]
/// static ALLOCATOR: LockedMmal = LockedMmal::new();
///
/// fn main() {
///     let numbers: Vec<u64> = (0..1000).collect();
///     assert_eq!(numbers.len(), 1000);
/// }
/// ```
///
/// Layouts asking for more than [`MIN_ALIGN`] alignment are refused with a
/// null pointer.
///
/// The lock is not reentrant: as the global allocator, nothing running under
/// it may allocate. That includes a `log` backend that formats into the heap.
pub struct LockedMmal {
    inner: Mutex<Mmal<SystemMemory>>,
}

impl LockedMmal {
    pub const fn new() -> Self {
        Self::with_config(Config::DEFAULT)
    }

    pub const fn with_config(config: Config) -> Self {
        Self {
            inner: Mutex::new(Mmal::with_config(SystemMemory, config)),
        }
    }
}

impl Default for LockedMmal {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for LockedMmal {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MIN_ALIGN {
            return ptr::null_mut();
        }

        self.inner
            .lock()
            .allocate(layout.size())
            .map_or(ptr::null_mut(), |ptr| ptr.as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.inner.lock().free(ptr) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > MIN_ALIGN {
            return ptr::null_mut();
        }

        unsafe {
            self.inner
                .lock()
                .reallocate(ptr, new_size)
                .map_or(ptr::null_mut(), |ptr| ptr.as_ptr())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_word_aligned_layouts() {
        let allocator = LockedMmal::new();
        let layout = Layout::new::<[u64; 4]>();

        unsafe {
            let ptr = allocator.alloc(layout);
            assert!(!ptr.is_null());
            assert_eq!(ptr.addr() % layout.align(), 0);

            ptr.cast::<[u64; 4]>().write([1, 2, 3, 4]);

            let grown = allocator.realloc(ptr, layout, 256);
            assert!(!grown.is_null());
            assert_eq!(grown.cast::<[u64; 4]>().read(), [1, 2, 3, 4]);

            allocator.dealloc(grown, Layout::from_size_align(256, 8).unwrap());
        }
    }

    #[test]
    fn zeroed_allocations_are_zeroed() {
        let allocator = LockedMmal::new();
        let layout = Layout::new::<[u8; 64]>();

        unsafe {
            let dirty = allocator.alloc(layout);
            dirty.write_bytes(0xFF, 64);
            allocator.dealloc(dirty, layout);

            let clean = allocator.alloc_zeroed(layout);
            assert!(!clean.is_null());
            assert!((0..64).all(|i| *clean.add(i) == 0));
            allocator.dealloc(clean, layout);
        }
    }

    #[test]
    fn realloc_absorbs_freed_neighbour() {
        let allocator = LockedMmal::new();
        let small = Layout::array::<u64>(4).unwrap();
        let spacer = Layout::array::<u8>(512).unwrap();

        unsafe {
            let ptr = allocator.alloc(small);
            let next = allocator.alloc(spacer);
            ptr.cast::<[u64; 4]>().write([1, 2, 3, 4]);
            allocator.dealloc(next, spacer);

            let grown = allocator.realloc(ptr, small, 512);
            assert_eq!(grown, ptr);
            assert_eq!(grown.cast::<[u64; 4]>().read(), [1, 2, 3, 4]);

            allocator.dealloc(grown, Layout::array::<u8>(512).unwrap());
        }
    }

    #[test]
    fn over_aligned_layouts_are_refused() {
        let allocator = LockedMmal::new();
        let layout = Layout::from_size_align(64, 4096).unwrap();

        assert!(unsafe { allocator.alloc(layout) }.is_null());
    }

    #[test]
    fn shared_between_threads() {
        static ALLOCATOR: LockedMmal = LockedMmal::new();

        let handles: Vec<_> = (0..4u8)
            .map(|seed| {
                std::thread::spawn(move || unsafe {
                    let layout = Layout::array::<u8>(128).unwrap();
                    for _ in 0..100 {
                        let ptr = ALLOCATOR.alloc(layout);
                        assert!(!ptr.is_null());
                        ptr.write_bytes(seed, 128);
                        assert!((0..128).all(|i| *ptr.add(i) == seed));
                        ALLOCATOR.dealloc(ptr, layout);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
