//! Syscall numbers and argument decoding
//!
//! Raw register values are turned into a typed [`Syscall`] once, here;
//! handlers never reinterpret registers themselves.

use super::handler::SyscallError;
use crate::mm::address::VirtAddr;
use crate::mm::mmap::MapRequest;

/// System call numbers
pub mod numbers {
    pub const SYS_WRITE: usize = 64;
    pub const SYS_EXIT: usize = 93;
    pub const SYS_SCHED_YIELD: usize = 124;
    pub const SYS_GETTIMEOFDAY: usize = 169;
    pub const SYS_SBRK: usize = 214;
    pub const SYS_MUNMAP: usize = 215;
    pub const SYS_MMAP: usize = 222;
    pub const SYS_TASK_INFO: usize = 410;
}

use numbers::*;

/// A decoded system call with its typed arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    /// `write(fd, buf, len)`
    Write { fd: i32, buf: VirtAddr, len: usize },
    /// `exit(code)`
    Exit { code: i32 },
    /// `sched_yield()`
    SchedYield,
    /// `gettimeofday(tv, tz)`; `tz` is ignored.
    GetTimeOfDay { tv: VirtAddr, tz: usize },
    /// `sbrk(delta)`
    Sbrk { delta: isize },
    /// `task_info(info)`
    TaskInfo { info: VirtAddr },
    /// `mmap(start, len, prot, flags, fd)`
    Mmap(MapRequest),
    /// `munmap(start, len)`
    Munmap { start: VirtAddr, len: usize },
}

impl Syscall {
    /// Decode call number `id` and argument registers `a0..a5`.
    ///
    /// # Errors
    /// [`SyscallError::Unsupported`] for an id outside the table.
    pub fn decode(id: usize, args: [usize; 6]) -> Result<Self, SyscallError> {
        let call = match id {
            // C `int`/`uint` arguments only see the low 32 bits
            SYS_WRITE => Self::Write {
                fd: args[0] as i32,
                buf: VirtAddr::new(args[1]),
                len: args[2] as u32 as usize,
            },
            SYS_EXIT => Self::Exit {
                code: args[0] as i32,
            },
            SYS_SCHED_YIELD => Self::SchedYield,
            SYS_GETTIMEOFDAY => Self::GetTimeOfDay {
                tv: VirtAddr::new(args[0]),
                tz: args[1],
            },
            SYS_SBRK => Self::Sbrk {
                delta: args[0] as i32 as isize,
            },
            SYS_TASK_INFO => Self::TaskInfo {
                info: VirtAddr::new(args[0]),
            },
            SYS_MMAP => Self::Mmap(MapRequest {
                start: VirtAddr::new(args[0]),
                len: args[1],
                prot: args[2] as u32,
                flags: args[3] as u32,
                fd: args[4] as i32,
            }),
            SYS_MUNMAP => Self::Munmap {
                start: VirtAddr::new(args[0]),
                len: args[1],
            },
            _ => return Err(SyscallError::Unsupported(id)),
        };
        Ok(call)
    }

    /// The call number this variant decodes from.
    pub const fn id(&self) -> usize {
        match self {
            Self::Write { .. } => SYS_WRITE,
            Self::Exit { .. } => SYS_EXIT,
            Self::SchedYield => SYS_SCHED_YIELD,
            Self::GetTimeOfDay { .. } => SYS_GETTIMEOFDAY,
            Self::Sbrk { .. } => SYS_SBRK,
            Self::TaskInfo { .. } => SYS_TASK_INFO,
            Self::Mmap(_) => SYS_MMAP,
            Self::Munmap { .. } => SYS_MUNMAP,
        }
    }

    /// Name for log lines.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Exit { .. } => "exit",
            Self::SchedYield => "sched_yield",
            Self::GetTimeOfDay { .. } => "gettimeofday",
            Self::Sbrk { .. } => "sbrk",
            Self::TaskInfo { .. } => "task_info",
            Self::Mmap(_) => "mmap",
            Self::Munmap { .. } => "munmap",
        }
    }
}
