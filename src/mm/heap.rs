//! Kernel Heap Allocator
//!
//! Uses `linked_list_allocator` for heap management. Enabled by the
//! `kernel-heap` feature so host builds keep the system allocator.
//!
//! # Memory Layout
//! The heap is a static array of [`KERNEL_HEAP_SIZE`] bytes in `.bss`.

use linked_list_allocator::LockedHeap;

use crate::config::KERNEL_HEAP_SIZE;

/// Global heap allocator instance
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Static heap memory region
static mut HEAP_MEMORY: [u8; KERNEL_HEAP_SIZE] = [0; KERNEL_HEAP_SIZE];

/// Initialize the kernel heap
///
/// # Safety
/// Must be called exactly once during kernel initialization, before any
/// heap allocation (page table walks, frame pool bitmaps) is made.
pub unsafe fn init_heap() {
    // SAFETY:
    // - HEAP_MEMORY is a valid static array no other code touches
    // - The caller guarantees this runs once
    unsafe {
        let heap_start = (&raw mut HEAP_MEMORY).cast::<u8>();
        ALLOCATOR.lock().init(heap_start, KERNEL_HEAP_SIZE);
    }
}

/// Get the size of the kernel heap
pub fn heap_size() -> usize {
    KERNEL_HEAP_SIZE
}

/// Bytes still free in the kernel heap
pub fn heap_free() -> usize {
    ALLOCATOR.lock().free()
}
