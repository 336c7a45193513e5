//! Memory management
//!
//! Provides:
//! - Address and page table types (`address`, `paging`)
//! - Physical frame allocation (`frame`)
//! - Per-process page tables (`page_table`)
//! - Copies across the user/kernel boundary (`uaccess`)
//! - Anonymous user mappings (`mmap`)
//! - The optional global kernel heap (`heap`, feature `kernel-heap`)

pub mod address;
pub mod frame;
#[cfg(all(feature = "kernel-heap", not(test)))]
pub mod heap;
pub mod mmap;
pub mod page_table;
pub mod paging;
pub mod uaccess;

pub use address::{PhysAddr, VirtAddr};
pub use frame::{Frame, FrameAllocator, FramePool, PhysMapper, PhysMemory};
pub use mmap::{map_region, unmap_region, MapProt, MapRequest, MmapError, Region};
pub use page_table::UserPageTable;
pub use paging::{MappingError, PteFlags};
