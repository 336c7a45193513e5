//! Copying between the kernel and a process's address space
//!
//! The kernel never dereferences user pointers. Every user address is
//! translated through the process's page table, page by page, and the
//! bytes are moved through the physical frame behind it.
//!
//! # Checks
//! - Each touched page must be a valid, user-accessible leaf
//! - Reads need `R`, writes need `W`
//! - Range arithmetic never wraps

use core::cmp::min;

use super::address::{PhysAddr, VirtAddr, PAGE_SIZE};
use super::frame::PhysMapper;
use super::page_table::UserPageTable;
use super::paging::PteFlags;

/// Why a user copy failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UserAccessError {
    /// No user mapping covers the address.
    #[error("user address {0} not mapped")]
    Unmapped(VirtAddr),
    /// The mapping exists but lacks the needed permission.
    #[error("user address {0} lacks {1:?}")]
    PermissionDenied(VirtAddr, PteFlags),
    /// Start plus length wraps around the address space.
    #[error("user range overflows")]
    Overflow,
}

/// Frame behind the user page holding `va`, checked for `need`.
fn user_frame<M: PhysMapper + ?Sized>(
    pt: &UserPageTable,
    mem: &M,
    va: VirtAddr,
    need: PteFlags,
) -> Result<PhysAddr, UserAccessError> {
    let leaf = pt
        .user_leaf(mem, va.align_down())
        .ok_or(UserAccessError::Unmapped(va))?;
    if !leaf.flags().contains(need) {
        return Err(UserAccessError::PermissionDenied(va, need));
    }
    Ok(leaf.addr())
}

/// Copy `src` to user address `dst`.
///
/// Pages before a failing page have already been written when an error
/// comes back.
pub fn copy_out<M: PhysMapper + ?Sized>(
    pt: &UserPageTable,
    mem: &mut M,
    dst: VirtAddr,
    src: &[u8],
) -> Result<(), UserAccessError> {
    dst.checked_add(src.len()).ok_or(UserAccessError::Overflow)?;

    let mut va = dst;
    let mut rest = src;
    while !rest.is_empty() {
        let pa = user_frame(pt, &*mem, va, PteFlags::W)?;
        let off = va.page_offset();
        let n = min(PAGE_SIZE - off, rest.len());
        mem.frame_mut(pa).as_bytes_mut()[off..off + n].copy_from_slice(&rest[..n]);
        rest = &rest[n..];
        va = VirtAddr::new(va.as_usize() + n);
    }
    Ok(())
}

/// Fill `dst` from user address `src`.
pub fn copy_in<M: PhysMapper + ?Sized>(
    pt: &UserPageTable,
    mem: &M,
    dst: &mut [u8],
    src: VirtAddr,
) -> Result<(), UserAccessError> {
    src.checked_add(dst.len()).ok_or(UserAccessError::Overflow)?;

    let mut va = src;
    let mut done = 0;
    while done < dst.len() {
        let pa = user_frame(pt, mem, va, PteFlags::R)?;
        let off = va.page_offset();
        let n = min(PAGE_SIZE - off, dst.len() - done);
        dst[done..done + n].copy_from_slice(&mem.frame(pa).as_bytes()[off..off + n]);
        done += n;
        va = VirtAddr::new(va.as_usize() + n);
    }
    Ok(())
}

/// Copy a NUL-terminated string from user address `src` into `dst`.
///
/// Stops at the first NUL or when `dst` is full, whichever comes first,
/// and returns the number of bytes copied (the NUL is not counted or
/// stored). Pages past the terminator are never touched.
pub fn copy_in_str<M: PhysMapper + ?Sized>(
    pt: &UserPageTable,
    mem: &M,
    dst: &mut [u8],
    src: VirtAddr,
) -> Result<usize, UserAccessError> {
    let mut va = src;
    let mut len = 0;
    while len < dst.len() {
        let pa = user_frame(pt, mem, va, PteFlags::R)?;
        let off = va.page_offset();
        let n = min(PAGE_SIZE - off, dst.len() - len);
        let bytes = &mem.frame(pa).as_bytes()[off..off + n];
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            dst[len..len + nul].copy_from_slice(&bytes[..nul]);
            return Ok(len + nul);
        }
        dst[len..len + n].copy_from_slice(bytes);
        len += n;
        va = va.checked_add(n).ok_or(UserAccessError::Overflow)?;
    }
    Ok(len)
}
