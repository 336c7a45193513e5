//! Process state touched by the syscall layer
//!
//! The scheduler and loader own process lifetimes; this module holds the
//! slice of a process the memory and accounting code works on: its page
//! table, heap bounds, run status and counters.

use log::{debug, warn};

use crate::accounting::Accounting;
use crate::config::{PAGE_SIZE, USER_SPACE_END};
use crate::mm::address::{page_round_up, VirtAddr};
use crate::mm::frame::PhysMemory;
use crate::mm::page_table::UserPageTable;
use crate::mm::paging::{MappingError, PteFlags};

/// Run status reported by `task_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TaskStatus {
    UnInit = 0,
    Ready = 1,
    Running = 2,
    Exited = 3,
}

/// Errors from moving the program break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// The new break would drop below the start of the heap.
    #[error("break would move below heap bottom {0:#x}")]
    BelowHeapBottom(usize),
    /// The new break would leave user space.
    #[error("break would leave user space")]
    OutOfUserSpace,
    /// A page the heap needs is already mapped.
    #[error("heap growth hits existing mapping at {0}")]
    Overlap(VirtAddr),
    /// No frame (or page table frame) left to back the heap.
    #[error("out of memory growing heap")]
    OutOfMemory,
}

/// Heap pages are private read/write user memory.
const HEAP_FLAGS: PteFlags = PteFlags::R.union(PteFlags::W).union(PteFlags::U);

/// A user process as seen by the syscall layer.
#[derive(Debug)]
pub struct Process {
    /// Process id.
    pub pid: usize,
    /// Root of the address space.
    page_table: UserPageTable,
    /// Lowest address the break may take (end of the loaded image).
    heap_bottom: usize,
    /// Current end of the heap.
    program_brk: usize,
    /// Run status.
    pub status: TaskStatus,
    /// Set once the process has exited.
    pub exit_code: Option<i32>,
    /// Time and syscall counters.
    pub accounting: Accounting,
}

impl Process {
    /// Create a process with an empty address space and an empty heap
    /// starting at `heap_bottom`.
    pub fn new<M: PhysMemory + ?Sized>(
        pid: usize,
        mem: &mut M,
        heap_bottom: VirtAddr,
        now_cycles: u64,
    ) -> Result<Self, MappingError> {
        Ok(Self {
            pid,
            page_table: UserPageTable::new(mem)?,
            heap_bottom: heap_bottom.as_usize(),
            program_brk: heap_bottom.as_usize(),
            status: TaskStatus::Ready,
            exit_code: None,
            accounting: Accounting::new(now_cycles),
        })
    }

    /// The process's page table.
    pub fn page_table(&self) -> &UserPageTable {
        &self.page_table
    }

    /// The process's page table, for mapping changes.
    pub fn page_table_mut(&mut self) -> &mut UserPageTable {
        &mut self.page_table
    }

    /// Current program break.
    pub fn program_brk(&self) -> usize {
        self.program_brk
    }

    /// Lowest legal program break.
    pub fn heap_bottom(&self) -> usize {
        self.heap_bottom
    }

    /// Move the program break by `delta` bytes, returning the old break.
    ///
    /// Growing backs every newly covered page; if any page cannot be
    /// backed, the pages mapped by this call are released and the break
    /// stays put. Shrinking releases every page wholly above the new break.
    pub fn grow_heap<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        delta: isize,
    ) -> Result<usize, HeapError> {
        let old = self.program_brk;
        let new = match old.checked_add_signed(delta) {
            Some(new) => new,
            None if delta < 0 => return Err(HeapError::BelowHeapBottom(self.heap_bottom)),
            None => return Err(HeapError::OutOfUserSpace),
        };
        if new < self.heap_bottom {
            return Err(HeapError::BelowHeapBottom(self.heap_bottom));
        }
        if new > USER_SPACE_END {
            return Err(HeapError::OutOfUserSpace);
        }

        let old_top = page_round_up(old).ok_or(HeapError::OutOfUserSpace)?;
        let new_top = page_round_up(new).ok_or(HeapError::OutOfUserSpace)?;
        if new_top > old_top {
            self.back_pages(mem, old_top, new_top)?;
        } else if new_top < old_top {
            self.release_pages(mem, new_top, old_top);
        }

        debug!("pid {}: brk {:#x} -> {:#x}", self.pid, old, new);
        self.program_brk = new;
        Ok(old)
    }

    /// Map fresh frames over `[from, to)`, all or nothing.
    fn back_pages<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        from: usize,
        to: usize,
    ) -> Result<(), HeapError> {
        for addr in (from..to).step_by(PAGE_SIZE) {
            let va = VirtAddr::new(addr);
            let result = match mem.alloc_frame() {
                None => Err(HeapError::OutOfMemory),
                Some(pa) => self
                    .page_table
                    .map_page(mem, va, pa, HEAP_FLAGS)
                    .map_err(|e| {
                        mem.free_frame(pa);
                        match e {
                            MappingError::AlreadyMapped(at) => HeapError::Overlap(at),
                            _ => HeapError::OutOfMemory,
                        }
                    }),
            };
            if let Err(e) = result {
                self.release_pages(mem, from, addr);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Unmap and free whatever is mapped in `[from, to)`.
    fn release_pages<M: PhysMemory + ?Sized>(&mut self, mem: &mut M, from: usize, to: usize) {
        for addr in (from..to).step_by(PAGE_SIZE) {
            match self.page_table.unmap_page(mem, VirtAddr::new(addr)) {
                Ok(pa) => mem.free_frame(pa),
                Err(e) => warn!("pid {}: heap page {:#x} already gone: {}", self.pid, addr, e),
            }
        }
    }

    /// Tear down the address space, returning every frame it owned.
    pub fn release<M: PhysMemory + ?Sized>(self, mem: &mut M) {
        self.page_table.destroy(mem);
    }
}
