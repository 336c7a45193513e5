//! Physical Frame Allocator
//!
//! Manages physical memory pages (frames) using a bitmap allocator.
//!
//! # Design
//! - Each bit in the bitmap represents one 4KB frame
//! - Bit = 0: frame is free
//! - Bit = 1: frame is allocated
//!
//! # Safety Properties
//! - All allocated frames are zeroed before returning
//! - Double-free is detected and causes a panic
//! - Frames outside the pool are rejected with a panic

use alloc::vec;
use alloc::vec::Vec;

use super::address::{PhysAddr, PAGE_SHIFT, PAGE_SIZE};
use super::paging::PageTable;

/// One 4KB physical page as the kernel sees it.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct Frame(pub [u8; PAGE_SIZE]);

impl Frame {
    /// A frame full of zeroes.
    pub const fn zeroed() -> Self {
        Self([0; PAGE_SIZE])
    }

    /// Contents as bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.0
    }

    /// Contents as mutable bytes.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.0
    }

    /// View this frame as a page table.
    #[inline]
    pub fn as_page_table(&self) -> &PageTable {
        // SAFETY:
        // - Frame and PageTable are both 4096 bytes with 4096 alignment
        // - PageTable is 512 transparent u64 entries; every bit pattern is valid
        unsafe { &*(self as *const Frame).cast::<PageTable>() }
    }

    /// View this frame as a mutable page table.
    #[inline]
    pub fn as_page_table_mut(&mut self) -> &mut PageTable {
        // SAFETY: Same as as_page_table, and we hold the only reference
        unsafe { &mut *(self as *mut Frame).cast::<PageTable>() }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Source of physical frames, one page at a time.
pub trait FrameAllocator {
    /// Allocate a single zeroed frame, `None` when exhausted.
    fn alloc_frame(&mut self) -> Option<PhysAddr>;

    /// Return a frame obtained from [`alloc_frame`](Self::alloc_frame).
    fn free_frame(&mut self, addr: PhysAddr);

    /// Number of frames still available.
    fn free_frames(&self) -> usize;
}

/// The kernel's direct view of physical memory.
pub trait PhysMapper {
    /// Borrow the frame at `addr` (must be page-aligned).
    fn frame(&self, addr: PhysAddr) -> &Frame;

    /// Mutably borrow the frame at `addr` (must be page-aligned).
    fn frame_mut(&mut self, addr: PhysAddr) -> &mut Frame;
}

/// Everything the mapping code needs from physical memory.
pub trait PhysMemory: FrameAllocator + PhysMapper {}

impl<T: FrameAllocator + PhysMapper + ?Sized> PhysMemory for T {}

/// Bitmap allocator over a contiguous run of frames.
///
/// The frames themselves are borrowed: in the kernel they are the RAM
/// after the image, in tests a heap vector.
pub struct FramePool<'m> {
    /// First physical address under management.
    base: PhysAddr,
    /// Backing memory, one entry per frame.
    frames: &'m mut [Frame],
    /// Bitmap tracking allocated frames (1 = allocated, 0 = free).
    bitmap: Vec<u8>,
    /// Number of free frames remaining.
    free_count: usize,
}

impl<'m> FramePool<'m> {
    /// Manage `frames`, the first of which lives at physical `base`.
    ///
    /// # Panics
    /// Panics if `base` is not page-aligned.
    pub fn new(base: PhysAddr, frames: &'m mut [Frame]) -> Self {
        assert!(base.is_aligned(), "frame pool base {base} not page-aligned");
        let total = frames.len();
        Self {
            base,
            frames,
            bitmap: vec![0; total.div_ceil(8)],
            free_count: total,
        }
    }

    /// Total frames under management.
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// Set a bit in the bitmap.
    #[inline]
    fn set_bit(&mut self, frame: usize, allocated: bool) {
        let byte_idx = frame / 8;
        let bit_idx = frame % 8;

        if allocated {
            self.bitmap[byte_idx] |= 1 << bit_idx;
        } else {
            self.bitmap[byte_idx] &= !(1 << bit_idx);
        }
    }

    /// Check if a frame is allocated.
    #[inline]
    fn is_allocated(&self, frame: usize) -> bool {
        (self.bitmap[frame / 8] >> (frame % 8)) & 1 == 1
    }

    /// Index of the frame at `addr`.
    ///
    /// # Panics
    /// Panics on an unaligned address or one outside the pool; both mean
    /// a page table or caller handed us memory we never gave out.
    fn index_of(&self, addr: PhysAddr) -> usize {
        if !addr.is_aligned() {
            panic!("unaligned frame address: {:?}", addr);
        }
        let frame = addr
            .as_usize()
            .checked_sub(self.base.as_usize())
            .map(|off| off >> PAGE_SHIFT)
            .filter(|&idx| idx < self.frames.len());
        match frame {
            Some(idx) => idx,
            None => panic!("frame outside managed range: {:?}", addr),
        }
    }
}

impl FrameAllocator for FramePool<'_> {
    fn alloc_frame(&mut self) -> Option<PhysAddr> {
        if self.free_count == 0 {
            return None;
        }

        // Linear search for a free frame
        let total = self.frames.len();
        for byte_idx in 0..self.bitmap.len() {
            if self.bitmap[byte_idx] == 0xFF {
                continue;
            }
            for bit_idx in 0..8 {
                let frame = byte_idx * 8 + bit_idx;
                if frame >= total {
                    break;
                }
                if !self.is_allocated(frame) {
                    self.set_bit(frame, true);
                    self.free_count -= 1;
                    self.frames[frame] = Frame::zeroed();
                    return Some(self.base.add(frame << PAGE_SHIFT));
                }
            }
        }

        None
    }

    fn free_frame(&mut self, addr: PhysAddr) {
        let frame = self.index_of(addr);
        if !self.is_allocated(frame) {
            panic!("double free detected for frame: {:?}", addr);
        }
        self.set_bit(frame, false);
        self.free_count += 1;
    }

    fn free_frames(&self) -> usize {
        self.free_count
    }
}

impl PhysMapper for FramePool<'_> {
    fn frame(&self, addr: PhysAddr) -> &Frame {
        let idx = self.index_of(addr);
        &self.frames[idx]
    }

    fn frame_mut(&mut self, addr: PhysAddr) -> &mut Frame {
        let idx = self.index_of(addr);
        &mut self.frames[idx]
    }
}
