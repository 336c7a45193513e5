//! System Call Interface
//!
//! Entry point for `ecall` from user mode.
//!
//! # Model
//! - Whitelist: only the numbers in [`decode::numbers`] are accepted
//! - Arguments are decoded once into a [`Syscall`] and validated by the
//!   handler that uses them
//! - Invalid inputs return `-1`, never panic
//!
//! # Current Syscalls
//! - 64: write(fd, buf, len)
//! - 93: exit(code)
//! - 124: sched_yield()
//! - 169: gettimeofday(tv, tz)
//! - 214: sbrk(delta)
//! - 215: munmap(start, len)
//! - 222: mmap(start, len, prot, flags, fd)
//! - 410: task_info(info)

pub mod decode;
mod handler;

pub use decode::{numbers, Syscall};
pub use handler::{dispatch, SyscallError, SYSCALL_FAILURE};
pub(crate) use handler::terminate;

use crate::drivers::CharDevice;
use crate::mm::frame::PhysMemory;
use crate::sched::Scheduler;
use crate::time::Clock;

/// Kernel services a syscall may use, borrowed for one dispatch.
pub struct Kernel<'k> {
    /// Frame allocator and physical memory access.
    pub mem: &'k mut dyn PhysMemory,
    /// Destination for `write(1, ..)`.
    pub console: &'k mut dyn CharDevice,
    pub clock: &'k dyn Clock,
    pub scheduler: &'k mut dyn Scheduler,
}

/// What the trap path does after a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Result is in `a0`; return to the process.
    Resume,
    /// The process exited with this code and must not be resumed.
    Exited(i32),
}
