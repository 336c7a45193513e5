//! Anonymous user mappings (`mmap` / `munmap`)
//!
//! Three steps, leaf first:
//! - [`MapProt::to_pte_flags`] turns the caller's 3-bit protection mask
//!   into leaf flags.
//! - [`MapRequest::validate`] rejects malformed requests before any frame
//!   is touched.
//! - [`map_region`] / [`unmap_region`] walk the region one page at a time
//!   in ascending order.
//!
//! # Partial failure
//! Neither direction rolls back. When `map_region` fails on page N, pages
//! before N stay mapped; when `unmap_region` fails on page N, pages before
//! N stay unmapped and their frames are already freed.

use bitflags::bitflags;
use log::trace;

use super::address::{page_round_up, VirtAddr, PAGE_SIZE, USER_SPACE_END};
use super::frame::PhysMemory;
use super::page_table::UserPageTable;
use super::paging::PteFlags;

bitflags! {
    /// Protection mask as passed to `mmap`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapProt: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

impl MapProt {
    /// Leaf flags for a user page with this protection.
    ///
    /// Always user-accessible and valid; R/W/X follow the mask exactly.
    pub fn to_pte_flags(self) -> PteFlags {
        let mut flags = PteFlags::U | PteFlags::V;
        if self.contains(Self::READ) {
            flags |= PteFlags::R;
        }
        if self.contains(Self::WRITE) {
            flags |= PteFlags::W;
        }
        if self.contains(Self::EXEC) {
            flags |= PteFlags::X;
        }
        flags
    }
}

/// Why a mapping request was refused or failed part way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MmapError {
    #[error("start {0} not page-aligned")]
    Misaligned(VirtAddr),
    #[error("protection {0:#x} has bits outside READ|WRITE|EXEC")]
    InvalidProtection(u32),
    #[error("protection grants no access")]
    NoAccess,
    #[error("region {start}+{len:#x} leaves user space")]
    OutOfUserSpace { start: VirtAddr, len: usize },
    #[error("page {0} already mapped")]
    AlreadyMapped(VirtAddr),
    #[error("out of memory at page {0}")]
    OutOfMemory(VirtAddr),
    #[error("page {0} not mapped")]
    NotMapped(VirtAddr),
}

/// Raw `mmap` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRequest {
    pub start: VirtAddr,
    pub len: usize,
    /// Protection mask; see [`MapProt`].
    pub prot: u32,
    /// Reserved.
    pub flags: u32,
    /// Ignored: only anonymous mappings exist.
    pub fd: i32,
}

/// A request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    start: VirtAddr,
    /// Page multiple, never zero.
    len: usize,
    flags: PteFlags,
}

impl Region {
    pub fn start(&self) -> VirtAddr {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn pages(&self) -> usize {
        self.len / PAGE_SIZE
    }

    pub fn pte_flags(&self) -> PteFlags {
        self.flags
    }

    fn page(&self, index: usize) -> VirtAddr {
        VirtAddr::new(self.start.as_usize() + index * PAGE_SIZE)
    }
}

/// Page-rounded length of `[start, start + len)`, if it stays in user space.
fn user_span(start: VirtAddr, len: usize) -> Result<usize, MmapError> {
    let out = MmapError::OutOfUserSpace { start, len };
    let rounded = page_round_up(len).ok_or(out)?;
    match start.checked_add(rounded) {
        Some(end) if end.as_usize() <= USER_SPACE_END => Ok(rounded),
        _ => Err(out),
    }
}

impl MapRequest {
    /// Check the request and round its length up to whole pages.
    ///
    /// `Ok(None)` means zero length: nothing to do, and not an error.
    pub fn validate(&self) -> Result<Option<Region>, MmapError> {
        if self.len == 0 {
            return Ok(None);
        }
        let prot = MapProt::from_bits(self.prot).ok_or(MmapError::InvalidProtection(self.prot))?;
        if prot.is_empty() {
            return Err(MmapError::NoAccess);
        }
        if !self.start.is_aligned() {
            return Err(MmapError::Misaligned(self.start));
        }
        let len = user_span(self.start, self.len)?;
        Ok(Some(Region {
            start: self.start,
            len,
            flags: prot.to_pte_flags(),
        }))
    }
}

/// Back every page of `region` with a fresh frame.
///
/// # Panics
/// Panics if the page table cannot take an entry after the overlap check
/// passed: that means no frame was left for an intermediate table, which
/// this kernel treats as fatal.
pub fn map_region<M: PhysMemory + ?Sized>(
    pt: &mut UserPageTable,
    mem: &mut M,
    region: &Region,
) -> Result<(), MmapError> {
    for i in 0..region.pages() {
        let va = region.page(i);
        if pt.is_mapped(&*mem, va) {
            return Err(MmapError::AlreadyMapped(va));
        }
        let pa = mem.alloc_frame().ok_or(MmapError::OutOfMemory(va))?;
        if let Err(e) = pt.map_page(mem, va, pa, region.flags) {
            panic!("map_region: page table insertion failed at {}: {}", va, e);
        }
    }
    trace!(
        "mapped {} pages at {} {:?}",
        region.pages(),
        region.start,
        region.flags
    );
    Ok(())
}

/// Unmap `[start, start + len)` and free the frames behind it.
///
/// Every page must currently be a user mapping. Zero length is a no-op.
pub fn unmap_region<M: PhysMemory + ?Sized>(
    pt: &mut UserPageTable,
    mem: &mut M,
    start: VirtAddr,
    len: usize,
) -> Result<(), MmapError> {
    if !start.is_aligned() {
        return Err(MmapError::Misaligned(start));
    }
    if len == 0 {
        return Ok(());
    }
    let rounded = page_round_up(len).ok_or(MmapError::OutOfUserSpace { start, len })?;
    start
        .checked_add(rounded)
        .ok_or(MmapError::OutOfUserSpace { start, len })?;

    for offset in (0..rounded).step_by(PAGE_SIZE) {
        let va = VirtAddr::new(start.as_usize() + offset);
        if pt.user_leaf(&*mem, va).is_none() {
            return Err(MmapError::NotMapped(va));
        }
        let pa = pt
            .unmap_page(mem, va)
            .map_err(|_| MmapError::NotMapped(va))?;
        mem.free_frame(pa);
    }
    trace!("unmapped {} pages at {}", rounded / PAGE_SIZE, start);
    Ok(())
}
