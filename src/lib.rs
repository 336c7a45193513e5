//! PantherOS user virtual-memory core
//!
//! The part of the kernel that user processes talk to when they trap:
//! syscall decoding and dispatch, anonymous page-granular mappings
//! (`mmap`/`munmap`), the program break, and per-process accounting.
//!
//! # Architecture
//! - Target: RISC-V 64, Sv39 paging, S-mode kernel / U-mode processes
//! - Syscall ABI: id in `a7`, arguments in `a0..a5`, result in `a0`
//!
//! # Collaborators
//! Physical memory, the scheduler, the console and the cycle counter are
//! reached through the traits in [`mm::frame`], [`sched`], [`drivers`] and
//! [`time`]. Every operation receives the acting [`process::Process`] and a
//! [`syscall::Kernel`] bundle explicitly; nothing here reads a "current
//! process" global.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod accounting;
pub mod config;
pub mod drivers;
pub mod logger;
pub mod mm;
pub mod process;
pub mod sched;
pub mod syscall;
pub mod time;
pub mod trap;

#[cfg(test)]
pub(crate) mod testing;

pub use process::{Process, TaskStatus};
pub use syscall::{dispatch, Completion, Kernel};
pub use trap::{handle_user_trap, TrapContext};
