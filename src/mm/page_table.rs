//! Per-process page table
//!
//! Walks and edits a three-level Sv39 table living in frames handed out
//! by a [`PhysMemory`]. Intermediate tables are created on demand and
//! only reclaimed by [`UserPageTable::destroy`].

use log::trace;

use super::address::{PhysAddr, VirtAddr, PAGE_LEVELS, PAGE_SIZE};
use super::frame::{PhysMapper, PhysMemory};
use super::paging::{MappingError, PageTableEntry, PteFlags};

/// `satp` mode field for Sv39.
const SATP_MODE_SV39: usize = 8 << 60;

/// Handle to the root of one process's page table.
#[derive(Debug, PartialEq, Eq)]
pub struct UserPageTable {
    root: PhysAddr,
}

impl UserPageTable {
    /// Allocate an empty root table.
    pub fn new<M: PhysMemory + ?Sized>(mem: &mut M) -> Result<Self, MappingError> {
        let root = mem.alloc_frame().ok_or(MappingError::OutOfMemory)?;
        Ok(Self { root })
    }

    /// Physical address of the root table.
    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Value to load into `satp` to activate this table.
    pub fn satp(&self) -> usize {
        SATP_MODE_SV39 | self.root.page_number()
    }

    /// Find the entry that translates `va` without creating anything,
    /// together with the size of the region it covers.
    ///
    /// A leaf above the last level (a superpage) ends the walk early.
    /// Returns `None` when an intermediate table is missing.
    fn walk<M: PhysMapper + ?Sized>(
        &self,
        mem: &M,
        va: VirtAddr,
    ) -> Option<(PageTableEntry, usize)> {
        if !va.is_user() {
            return None;
        }
        let indices = va.page_table_indices();
        let mut table = self.root;
        for (depth, &idx) in indices[..PAGE_LEVELS - 1].iter().enumerate() {
            let entry = mem.frame(table).as_page_table()[idx];
            if entry.is_leaf() {
                return Some((entry, leaf_span(PAGE_LEVELS - 1 - depth)));
            }
            if !entry.is_table() {
                return None;
            }
            table = entry.addr();
        }
        Some((mem.frame(table).as_page_table()[indices[PAGE_LEVELS - 1]], PAGE_SIZE))
    }

    /// Find (creating as needed) the last-level table covering `va`.
    fn walk_create<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        va: VirtAddr,
    ) -> Result<PhysAddr, MappingError> {
        let indices = va.page_table_indices();
        let mut table = self.root;
        for &idx in &indices[..PAGE_LEVELS - 1] {
            let entry = mem.frame(table).as_page_table()[idx];
            if entry.is_leaf() {
                // A superpage covers this address; we never split those.
                return Err(MappingError::AlreadyMapped(va));
            }
            if entry.is_table() {
                table = entry.addr();
                continue;
            }
            let next = mem.alloc_frame().ok_or(MappingError::OutOfMemory)?;
            mem.frame_mut(table).as_page_table_mut()[idx] = PageTableEntry::table(next);
            table = next;
        }
        Ok(table)
    }

    /// The valid leaf mapping `va`, if any.
    ///
    /// This may be a superpage leaf covering more than one page.
    pub fn leaf<M: PhysMapper + ?Sized>(&self, mem: &M, va: VirtAddr) -> Option<PageTableEntry> {
        self.walk(mem, va).map(|(e, _)| e).filter(|e| e.is_leaf())
    }

    /// The valid, user-accessible leaf mapping `va`, if any.
    pub fn user_leaf<M: PhysMapper + ?Sized>(
        &self,
        mem: &M,
        va: VirtAddr,
    ) -> Option<PageTableEntry> {
        self.leaf(mem, va)
            .filter(|e| e.flags().contains(PteFlags::U))
    }

    /// Whether any valid leaf covers `va`.
    pub fn is_mapped<M: PhysMapper + ?Sized>(&self, mem: &M, va: VirtAddr) -> bool {
        self.leaf(mem, va).is_some()
    }

    /// Translate `va` to the physical address it maps to.
    pub fn translate<M: PhysMapper + ?Sized>(&self, mem: &M, va: VirtAddr) -> Option<PhysAddr> {
        let (entry, span) = self.walk(mem, va).filter(|(e, _)| e.is_leaf())?;
        Some(entry.addr().add(va.as_usize() & (span - 1)))
    }

    /// Insert a 4KB leaf `va -> pa` with `flags` (V is added).
    pub fn map_page<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        va: VirtAddr,
        pa: PhysAddr,
        flags: PteFlags,
    ) -> Result<(), MappingError> {
        if !va.is_aligned() {
            return Err(MappingError::Misaligned(va));
        }
        if !va.is_user() {
            return Err(MappingError::OutOfRange(va));
        }
        let table = self.walk_create(mem, va)?;
        let idx = va.page_table_indices()[PAGE_LEVELS - 1];
        let slot = &mut mem.frame_mut(table).as_page_table_mut()[idx];
        if slot.is_valid() {
            return Err(MappingError::AlreadyMapped(va));
        }
        *slot = PageTableEntry::page(pa, flags);
        trace!("map {} -> {} {:?}", va, pa, flags);
        Ok(())
    }

    /// Remove the leaf for `va` and hand back the frame it pointed at.
    ///
    /// The frame is not freed; that is the caller's call.
    pub fn unmap_page<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        va: VirtAddr,
    ) -> Result<PhysAddr, MappingError> {
        if !va.is_aligned() {
            return Err(MappingError::Misaligned(va));
        }
        if !va.is_user() {
            return Err(MappingError::OutOfRange(va));
        }
        let indices = va.page_table_indices();
        let mut table = self.root;
        for &idx in &indices[..PAGE_LEVELS - 1] {
            let entry = mem.frame(table).as_page_table()[idx];
            if !entry.is_table() {
                return Err(MappingError::NotMapped(va));
            }
            table = entry.addr();
        }
        let slot = &mut mem.frame_mut(table).as_page_table_mut()[indices[PAGE_LEVELS - 1]];
        if !slot.is_leaf() {
            return Err(MappingError::NotMapped(va));
        }
        let pa = slot.addr();
        slot.clear();
        flush_tlb(va);
        trace!("unmap {} (was {})", va, pa);
        Ok(pa)
    }

    /// Tear the whole table down.
    ///
    /// Frames behind user-accessible leaves go back to the allocator along
    /// with every table frame. Leaves without `U` belong to the kernel and
    /// are left alone.
    pub fn destroy<M: PhysMemory + ?Sized>(self, mem: &mut M) {
        free_level(mem, self.root, PAGE_LEVELS - 1);
    }
}

/// Bytes mapped by a leaf at `level` (0 is the last level).
const fn leaf_span(level: usize) -> usize {
    PAGE_SIZE << (9 * level)
}

fn free_level<M: PhysMemory + ?Sized>(mem: &mut M, table: PhysAddr, level: usize) {
    let children: alloc::vec::Vec<PageTableEntry> = mem
        .frame(table)
        .as_page_table()
        .iter_valid()
        .map(|(_, e)| *e)
        .collect();
    for entry in children {
        if entry.is_leaf() {
            if entry.flags().contains(PteFlags::U) {
                mem.free_frame(entry.addr());
            }
        } else if level > 0 {
            free_level(mem, entry.addr(), level - 1);
        }
    }
    mem.free_frame(table);
}

#[cfg(target_arch = "riscv64")]
#[inline]
fn flush_tlb(va: VirtAddr) {
    // SAFETY: sfence.vma only orders address-translation caches
    unsafe {
        core::arch::asm!("sfence.vma {0}, zero", in(reg) va.as_usize(), options(nostack));
    }
}

#[cfg(not(target_arch = "riscv64"))]
#[inline]
fn flush_tlb(_va: VirtAddr) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::frame::FrameAllocator;
    use crate::testing::TestRam;

    const RW_USER: PteFlags = PteFlags::R.union(PteFlags::W).union(PteFlags::U);

    #[test]
    fn map_translate_unmap() {
        let mut ram = TestRam::new(16);
        let mut mem = ram.pool();
        let mut pt = UserPageTable::new(&mut mem).unwrap();
        let va = VirtAddr::new(0x1000);
        let pa = mem.alloc_frame().unwrap();

        assert!(!pt.is_mapped(&mem, va));
        pt.map_page(&mut mem, va, pa, RW_USER).unwrap();
        assert!(pt.is_mapped(&mem, va));
        assert_eq!(pt.translate(&mem, VirtAddr::new(0x1234)), Some(pa.add(0x234)));
        assert_eq!(pt.user_leaf(&mem, va).unwrap().flags(), RW_USER | PteFlags::V);

        assert_eq!(pt.unmap_page(&mut mem, va), Ok(pa));
        assert!(!pt.is_mapped(&mem, va));
        assert_eq!(pt.unmap_page(&mut mem, va), Err(MappingError::NotMapped(va)));
    }

    #[test]
    fn refuses_to_overwrite_a_leaf() {
        let mut ram = TestRam::new(16);
        let mut mem = ram.pool();
        let mut pt = UserPageTable::new(&mut mem).unwrap();
        let va = VirtAddr::new(0x2000);
        let pa = mem.alloc_frame().unwrap();
        pt.map_page(&mut mem, va, pa, RW_USER).unwrap();
        assert_eq!(
            pt.map_page(&mut mem, va, pa, RW_USER),
            Err(MappingError::AlreadyMapped(va))
        );
    }

    #[test]
    fn kernel_leaf_is_mapped_but_not_user() {
        let mut ram = TestRam::new(16);
        let mut mem = ram.pool();
        let mut pt = UserPageTable::new(&mut mem).unwrap();
        let va = VirtAddr::new(0x3000);
        let pa = mem.alloc_frame().unwrap();
        pt.map_page(&mut mem, va, pa, PteFlags::R | PteFlags::X).unwrap();
        assert!(pt.is_mapped(&mem, va));
        assert!(pt.user_leaf(&mem, va).is_none());
    }

    #[test]
    fn superpage_leaf_is_seen_by_lookups_and_inserts() {
        let mut ram = TestRam::new(16);
        let mut mem = ram.pool();
        let mut pt = UserPageTable::new(&mut mem).unwrap();
        let pa = mem.alloc_frame().unwrap();
        // 1 GiB leaf straight in the root
        mem.frame_mut(pt.root()).as_page_table_mut()[0] = PageTableEntry::page(pa, RW_USER);

        let va = VirtAddr::new(0x1000);
        assert!(pt.is_mapped(&mem, va));
        assert!(pt.user_leaf(&mem, VirtAddr::new(0x20_0000)).is_some());
        assert_eq!(pt.translate(&mem, VirtAddr::new(0x20_1234)), Some(pa.add(0x20_1234)));
        let other = mem.alloc_frame().unwrap();
        assert_eq!(
            pt.map_page(&mut mem, va, other, RW_USER),
            Err(MappingError::AlreadyMapped(va))
        );
    }

    #[test]
    fn rejects_addresses_outside_user_space() {
        let mut ram = TestRam::new(4);
        let mut mem = ram.pool();
        let mut pt = UserPageTable::new(&mut mem).unwrap();
        let va = VirtAddr::new(crate::config::USER_SPACE_END);
        let pa = mem.alloc_frame().unwrap();
        assert_eq!(
            pt.map_page(&mut mem, va, pa, RW_USER),
            Err(MappingError::OutOfRange(va))
        );
        assert!(!pt.is_mapped(&mem, va));
    }

    #[test]
    fn runs_out_of_table_frames() {
        // Root only: no frame left for the L1 table.
        let mut ram = TestRam::new(2);
        let mut mem = ram.pool();
        let mut pt = UserPageTable::new(&mut mem).unwrap();
        let pa = mem.alloc_frame().unwrap();
        assert_eq!(
            pt.map_page(&mut mem, VirtAddr::new(0x1000), pa, RW_USER),
            Err(MappingError::OutOfMemory)
        );
    }

    #[test]
    fn destroy_returns_every_frame() {
        let mut ram = TestRam::new(32);
        let mut mem = ram.pool();
        let before = mem.free_frames();
        let mut pt = UserPageTable::new(&mut mem).unwrap();
        for i in 0..3 {
            let pa = mem.alloc_frame().unwrap();
            let va = VirtAddr::new(0x1000 + i * 0x4000_0000);
            pt.map_page(&mut mem, va, pa, RW_USER).unwrap();
        }
        assert!(mem.free_frames() < before);
        pt.destroy(&mut mem);
        assert_eq!(mem.free_frames(), before);
    }

    #[test]
    fn satp_encodes_root() {
        let mut ram = TestRam::new(1);
        let mut mem = ram.pool();
        let pt = UserPageTable::new(&mut mem).unwrap();
        assert_eq!(pt.satp() & ((1 << 44) - 1), pt.root().page_number());
        assert_eq!(pt.satp() >> 60, 8);
    }
}
