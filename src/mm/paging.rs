//! Sv39 Page Table Types
//!
//! # Page Table Structure (4KB pages)
//! - L2 (root): 512 entries, each covers 1GB
//! - L1: 512 entries, each covers 2MB
//! - L0: 512 entries, each covers 4KB
//!
//! Only 4KB leaves are created by this crate; a valid entry with none of
//! R/W/X set points at the next-level table.

use core::ops::{Index, IndexMut};

use bitflags::bitflags;

use super::address::{PhysAddr, VirtAddr, ENTRIES_PER_TABLE, PAGE_SHIFT};

bitflags! {
    /// Page table entry flags, in Sv39 bit positions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PteFlags: u64 {
        /// Entry is valid.
        const V = 1 << 0;
        /// Readable.
        const R = 1 << 1;
        /// Writable.
        const W = 1 << 2;
        /// Executable.
        const X = 1 << 3;
        /// Accessible from U-mode.
        const U = 1 << 4;
        /// Global mapping.
        const G = 1 << 5;
        /// Accessed.
        const A = 1 << 6;
        /// Dirty.
        const D = 1 << 7;
    }
}

impl PteFlags {
    /// Any of these makes an entry a leaf.
    pub const LEAF_MASK: Self = Self::R.union(Self::W).union(Self::X);
}

/// A single page table entry.
///
/// Either points to a next-level table or maps one 4KB physical page.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// PPN field starts at bit 10.
    const PPN_SHIFT: u32 = 10;
    /// PPN field is 44 bits wide.
    const PPN_MASK: u64 = (1 << 44) - 1;
    /// Flag bits live in the low byte.
    const FLAGS_MASK: u64 = 0xFF;

    /// Create an invalid (empty) entry.
    #[inline]
    pub const fn invalid() -> Self {
        Self(0)
    }

    /// Create a table entry pointing to the next level page table.
    #[inline]
    pub const fn table(next_table: PhysAddr) -> Self {
        Self(Self::encode_ppn(next_table) | PteFlags::V.bits())
    }

    /// Create a leaf entry mapping a physical page.
    #[inline]
    pub const fn page(phys: PhysAddr, flags: PteFlags) -> Self {
        Self(Self::encode_ppn(phys) | flags.bits() | PteFlags::V.bits())
    }

    #[inline]
    const fn encode_ppn(phys: PhysAddr) -> u64 {
        ((phys.as_u64() >> PAGE_SHIFT) & Self::PPN_MASK) << Self::PPN_SHIFT
    }

    /// Check if the entry is valid.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 & PteFlags::V.bits() != 0
    }

    /// Check if this is a valid leaf (maps memory).
    #[inline]
    pub const fn is_leaf(self) -> bool {
        self.is_valid() && self.0 & PteFlags::LEAF_MASK.bits() != 0
    }

    /// Check if this is a valid pointer to a next-level table.
    #[inline]
    pub const fn is_table(self) -> bool {
        self.is_valid() && !self.is_leaf()
    }

    /// Get the physical address from this entry.
    #[inline]
    pub const fn addr(self) -> PhysAddr {
        PhysAddr::from_page_number(((self.0 >> Self::PPN_SHIFT) & Self::PPN_MASK) as usize)
    }

    /// Get the flags from this entry.
    #[inline]
    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & Self::FLAGS_MASK)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Clear the entry (make invalid).
    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_valid() {
            write!(f, "PTE(addr={}, flags={:?})", self.addr(), self.flags())
        } else {
            write!(f, "PTE(invalid)")
        }
    }
}

/// One level of the page table hierarchy.
///
/// Each table is exactly one 4KB-aligned physical frame.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES_PER_TABLE],
}

impl PageTable {
    /// Create a new empty page table (all entries invalid).
    pub const fn new() -> Self {
        Self {
            entries: [PageTableEntry::invalid(); ENTRIES_PER_TABLE],
        }
    }

    /// Iterate over all valid entries with their indices.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, &PageTableEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.is_valid())
    }
}

impl Index<usize> for PageTable {
    type Output = PageTableEntry;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IndexMut<usize> for PageTable {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for single-page table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// The virtual page already has a valid leaf.
    #[error("virtual address {0} already mapped")]
    AlreadyMapped(VirtAddr),
    /// The virtual page has no valid leaf.
    #[error("virtual address {0} not mapped")]
    NotMapped(VirtAddr),
    /// No physical frames available for page tables.
    #[error("out of memory for page tables")]
    OutOfMemory,
    /// The address is not page-aligned.
    #[error("address {0} not page-aligned")]
    Misaligned(VirtAddr),
    /// The address lies outside user space.
    #[error("address {0} outside user space")]
    OutOfRange(VirtAddr),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_entry_round_trips_address_and_flags() {
        let pa = PhysAddr::new(0x8040_3000);
        let pte = PageTableEntry::page(pa, PteFlags::R | PteFlags::W | PteFlags::U);
        assert!(pte.is_leaf());
        assert!(!pte.is_table());
        assert_eq!(pte.addr(), pa);
        assert_eq!(pte.flags(), PteFlags::V | PteFlags::R | PteFlags::W | PteFlags::U);
    }

    #[test]
    fn table_entry_is_not_a_leaf() {
        let pte = PageTableEntry::table(PhysAddr::new(0x8020_0000));
        assert!(pte.is_valid());
        assert!(pte.is_table());
        assert!(!pte.is_leaf());
    }

    #[test]
    fn table_fills_one_frame() {
        assert_eq!(core::mem::size_of::<PageTable>(), 4096);
        assert_eq!(core::mem::align_of::<PageTable>(), 4096);
        let mut table = PageTable::new();
        assert_eq!(table.iter_valid().count(), 0);
        table[7] = PageTableEntry::table(PhysAddr::new(0x8020_0000));
        assert_eq!(table.iter_valid().map(|(i, _)| i).collect::<Vec<_>>(), vec![7]);
        table[7].clear();
        assert!(!table[7].is_valid());
    }
}
