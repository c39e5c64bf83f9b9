//! A first-fit memory allocator built directly on top of pages obtained
//! from the kernel.
//!
//! Memory is requested in big arenas (128 KiB by default) with
//! `mmap` / `VirtualAlloc`, and carved into variable size blocks. Every
//! block of every arena is threaded into one cyclic list, which is walked
//! first-fit on allocation. Blocks are split when they are bigger than
//! needed and coalesced with their neighbours when freed.
//!
//! ```
//! use mmal::Mmal;
//!
//! let mut allocator = Mmal::new();
//!
//! let ptr = allocator.allocate(64).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(7, 64);
//!
//!     let ptr = allocator.reallocate(ptr.as_ptr(), 256).unwrap();
//!     assert_eq!(*ptr.as_ptr().add(63), 7);
//!
//!     allocator.free(ptr.as_ptr());
//! }
//! ```
//!
//! [`Mmal`] itself does no locking. Use [`LockedMmal`] to share it between
//! threads or install it as the `#[global_allocator]`.

mod allocator;
mod arena;
mod block;
mod config;
mod error;
mod global;
mod kernel;
mod list;
mod utils;

pub use allocator::{MIN_ALIGN, Mmal};
pub use config::{ARENA_UNIT, Config};
pub use global::LockedMmal;
pub use kernel::{PlatformMemory, SystemMemory};
