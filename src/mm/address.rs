//! Physical and Virtual Address Types
//!
//! Type-safe wrappers for memory addresses that prevent mixing
//! physical and virtual addresses at compile time.
//!
//! # Sv39 Layout
//! - 39-bit virtual addresses, three 9-bit table indices plus a 12-bit offset
//! - 56-bit physical addresses
//! - User space is the lower half below [`USER_SPACE_END`]

use core::fmt;

pub use crate::config::{PAGE_SHIFT, PAGE_SIZE, USER_SPACE_END};

/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Number of entries per page table (512 for 4KB pages)
pub const ENTRIES_PER_TABLE: usize = 512;

/// Number of translation levels in Sv39
pub const PAGE_LEVELS: usize = 3;

/// Highest physical address Sv39 can express (56 bits).
const PHYS_ADDR_MAX: usize = (1 << 56) - 1;

/// Round `len` up to the next page multiple, `None` on overflow.
#[inline]
pub const fn page_round_up(len: usize) -> Option<usize> {
    match len.checked_add(PAGE_MASK) {
        Some(v) => Some(v & !PAGE_MASK),
        None => None,
    }
}

/// Round `addr` down to its page boundary.
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !PAGE_MASK
}

/// A physical memory address.
///
/// Physical addresses cannot be dereferenced directly; the kernel reaches
/// the frame behind one through a [`PhysMapper`](super::frame::PhysMapper).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// Create a new physical address.
    ///
    /// # Panics
    /// Panics in debug mode if the address uses more than 56 bits.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        debug_assert!(addr <= PHYS_ADDR_MAX);
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Get the raw address as u64 (for page table entries).
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the physical page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Create from a physical page number.
    #[inline]
    pub const fn from_page_number(ppn: usize) -> Self {
        Self(ppn << PAGE_SHIFT)
    }

    /// Get the offset within the page.
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Add an offset to this address.
    #[inline]
    pub const fn add(self, offset: usize) -> Self {
        Self(self.0 + offset)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A virtual memory address in some process's address space.
///
/// Values coming from user registers are wrapped as-is; range checks
/// happen where the address is used, not at construction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Wrap a raw virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page table indices for this address.
    ///
    /// Returns (L2, L1, L0) indices, root level first.
    #[inline]
    pub const fn page_table_indices(self) -> [usize; PAGE_LEVELS] {
        let addr = self.0;
        [
            (addr >> 30) & 0x1FF,
            (addr >> 21) & 0x1FF,
            (addr >> 12) & 0x1FF,
        ]
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Add an offset, `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Check if this is a user address (below [`USER_SPACE_END`]).
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < USER_SPACE_END
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
