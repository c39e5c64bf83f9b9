use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Virtual memory page size of the computer. This is usually 4096.
/// It would be a constant, but we don't know the value at compile time,
/// so it is queried once and cached here (0 means not queried yet).
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. The allocator, our top level view of this, has nothing
/// to do with the concrete implementations / APIs offered by each kernel.
///
/// # Safety
///
/// Implementors must hand out memory that is zero-filled, readable, writable,
/// private to the process, aligned to [`PlatformMemory::page_size`] and not
/// in use by anything else until it is given back through
/// [`PlatformMemory::return_memory`].
pub unsafe trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a pointer to the
    /// given location or `None` if the underlying syscall fails.
    unsafe fn request_memory(&mut self, len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    /// Returns `false` if the kernel refused to unmap it.
    unsafe fn return_memory(&mut self, addr: NonNull<u8>, len: usize) -> bool;

    /// Returns the virtual memory page size of the computer in bytes.
    fn page_size(&self) -> usize;
}

/// Anonymous mappings straight from the operating system: `mmap` on unix,
/// `VirtualAlloc` on windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

/// Wrapper to calculate the computer's page size only once.
#[inline]
pub(crate) fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = unsafe { query_page_size() };
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

#[cfg(unix)]
mod unix {
    use super::{PlatformMemory, SystemMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    unsafe impl PlatformMemory for SystemMemory {
        unsafe fn request_memory(&mut self, len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => NonNull::new(addr.cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(&mut self, addr: NonNull<u8>, len: usize) -> bool {
            unsafe { munmap(addr.as_ptr().cast::<c_void>(), len as size_t) == 0 }
        }

        fn page_size(&self) -> usize {
            super::page_size()
        }
    }

    pub(super) unsafe fn query_page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::{PlatformMemory, SystemMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    unsafe impl PlatformMemory for SystemMemory {
        unsafe fn request_memory(&mut self, len: usize) -> Option<NonNull<u8>> {
            // Read-Write only. Committed pages are zero-filled by the kernel.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(&mut self, addr: NonNull<u8>, _len: usize) -> bool {
            unsafe { Memory::VirtualFree(addr.as_ptr() as *mut c_void, 0, Memory::MEM_RELEASE).is_ok() }
        }

        fn page_size(&self) -> usize {
            super::page_size()
        }
    }

    pub(super) unsafe fn query_page_size() -> usize {
        unsafe {
            let mut system_info = MaybeUninit::uninit();
            SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

            system_info.assume_init().dwPageSize as usize
        }
    }
}

#[cfg(unix)]
use self::unix::query_page_size;
#[cfg(windows)]
use self::windows::query_page_size;

#[cfg(test)]
pub(crate) mod testing {
    use super::{PlatformMemory, SystemMemory};
    use std::{cell::Cell, ptr::NonNull, rc::Rc};

    /// [`SystemMemory`] that keeps count of what goes through it and can be
    /// told to refuse new mappings or to refuse unmapping.
    #[derive(Debug, Default)]
    pub(crate) struct CountingMemory {
        pub mapped: usize,
        pub returned: Rc<Cell<usize>>,
        pub mapped_bytes: Vec<usize>,
        pub exhausted: bool,
        pub pinned: bool,
    }

    unsafe impl PlatformMemory for CountingMemory {
        unsafe fn request_memory(&mut self, len: usize) -> Option<NonNull<u8>> {
            if self.exhausted {
                return None;
            }

            let addr = unsafe { SystemMemory.request_memory(len)? };
            self.mapped += 1;
            self.mapped_bytes.push(len);
            Some(addr)
        }

        unsafe fn return_memory(&mut self, addr: NonNull<u8>, len: usize) -> bool {
            self.returned.set(self.returned.get() + 1);
            if self.pinned {
                return false;
            }

            unsafe { SystemMemory.return_memory(addr, len) }
        }

        fn page_size(&self) -> usize {
            SystemMemory.page_size()
        }
    }
}
