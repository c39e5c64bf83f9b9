//! Installs [`LockedMmal`] as the process allocator and shows three things
//! it does differently from the system one.
//!
//! No logger is installed here: the allocator's lock is not reentrant.

use mmal::{LockedMmal, MIN_ALIGN};
use std::alloc::{GlobalAlloc, Layout};
use std::thread;

#[global_allocator]
static ALLOCATOR: LockedMmal = LockedMmal::new();

/// A vector whose next block is free grows without moving: `realloc`
/// absorbs the free block instead of copying.
fn grow_in_place() {
    let mut numbers: Vec<u64> = Vec::with_capacity(4);
    let spacer = Box::new([0u8; 512]);
    numbers.extend([1, 2, 3, 4]);
    let before = numbers.as_ptr();

    // The spacer leaves a free block right behind the vector.
    drop(spacer);
    numbers.reserve_exact(60);
    let after = numbers.as_ptr();

    println!(
        "vector of {} grew to capacity {}: {before:p} -> {after:p}, moved: {}",
        numbers.len(),
        numbers.capacity(),
        before != after,
    );
}

/// Payloads are only word aligned. Stricter layouts get a null pointer
/// rather than a misaligned block.
fn refuse_page_alignment() {
    let Ok(layout) = Layout::from_size_align(64, 4096) else {
        return;
    };

    let ptr = unsafe { ALLOCATOR.alloc(layout) };
    println!(
        "align {} (max {MIN_ALIGN}) gives null: {}",
        layout.align(),
        ptr.is_null()
    );
}

/// Every thread goes through the same spin lock, so their blocks share one
/// ring without stepping on each other.
fn share_between_threads() {
    let workers: Vec<_> = (0..4u64)
        .map(|id| {
            thread::spawn(move || {
                let mut words = Vec::new();
                for round in 0..1000 {
                    words.push(format!("{id}:{round}"));
                    if round % 3 == 0 {
                        words.swap_remove(0);
                    }
                }
                words.len()
            })
        })
        .collect();

    for (id, worker) in workers.into_iter().enumerate() {
        match worker.join() {
            Ok(kept) => println!("thread {id} kept {kept} strings"),
            Err(_) => eprintln!("thread {id} panicked"),
        }
    }
}

fn main() {
    grow_in_place();
    refuse_page_alignment();
    share_between_threads();
}
