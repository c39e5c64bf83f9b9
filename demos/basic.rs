//! Walks through allocate / reallocate / free on an explicit allocator.
//! Run with `RUST_LOG=trace` to see what the allocator does underneath.

use mmal::Mmal;

fn log_alloc(what: &str, size: usize, addr: *mut u8) {
    println!("{what}: {size} bytes at {addr:?}");
}

fn main() {
    env_logger::init();

    let mut allocator = Mmal::new();

    let (Some(first), Some(second)) = (allocator.allocate(8), allocator.allocate(16)) else {
        eprintln!("out of memory");
        return;
    };
    log_alloc("allocate", 8, first.as_ptr());
    log_alloc("allocate", 16, second.as_ptr());

    unsafe {
        first.as_ptr().write_bytes(0x2A, 8);

        // `second` sits right after `first`, so this one has to move.
        let Some(grown) = allocator.reallocate(first.as_ptr(), 64) else {
            eprintln!("out of memory, {:p} is still valid", first);
            allocator.free(first.as_ptr());
            allocator.free(second.as_ptr());
            return;
        };
        log_alloc("reallocate", 64, grown.as_ptr());
        println!("first byte survived the move: {:#x}", *grown.as_ptr());

        allocator.free(second.as_ptr());

        // The gap left by the first two blocks is reused.
        if let Some(reused) = allocator.allocate(8) {
            log_alloc("allocate", 8, reused.as_ptr());
            println!("reused first block: {}", reused == first);
            allocator.free(reused.as_ptr());
        }

        allocator.free(grown.as_ptr());
    }
}
