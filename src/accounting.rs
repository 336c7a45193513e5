//! Per-process accounting
//!
//! Start time and per-syscall invocation counts, plus the `TaskInfo`
//! record handed to user space.

use crate::config::MAX_SYSCALL_NUM;
use crate::process::TaskStatus;
use crate::time::cycles_to_ms;

/// Counters owned by one process.
#[derive(Debug, Clone)]
pub struct Accounting {
    /// Cycle count when the process was created.
    start_cycles: u64,
    /// Invocation count per syscall id. Only ever incremented.
    syscall_times: [u32; MAX_SYSCALL_NUM],
}

impl Accounting {
    /// Fresh counters for a process created at `start_cycles`.
    pub const fn new(start_cycles: u64) -> Self {
        Self {
            start_cycles,
            syscall_times: [0; MAX_SYSCALL_NUM],
        }
    }

    /// Count one invocation of syscall `id`.
    ///
    /// # Panics
    /// Panics if `id` is not below [`MAX_SYSCALL_NUM`]; the syscall id table
    /// guarantees it is.
    pub fn record(&mut self, id: usize) {
        let slot = &mut self.syscall_times[id];
        *slot = slot.saturating_add(1);
    }

    /// Invocations of `id` so far (0 for ids outside the table).
    pub fn count(&self, id: usize) -> u32 {
        self.syscall_times.get(id).copied().unwrap_or(0)
    }

    /// Snapshot of every counter.
    pub fn syscall_times(&self) -> [u32; MAX_SYSCALL_NUM] {
        self.syscall_times
    }

    /// Cycle count at creation.
    pub fn start_cycles(&self) -> u64 {
        self.start_cycles
    }

    /// Milliseconds between creation and `now_cycles`.
    pub fn elapsed_ms(&self, now_cycles: u64) -> u64 {
        cycles_to_ms(now_cycles).saturating_sub(cycles_to_ms(self.start_cycles))
    }
}

/// What `task_info` copies out to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct TaskInfo {
    pub status: TaskStatus,
    pub syscall_times: [u32; MAX_SYSCALL_NUM],
    /// Milliseconds since the process started.
    pub time: i32,
}

impl TaskInfo {
    /// Size of the user-visible image in bytes.
    pub const SIZE: usize = 4 + 4 * MAX_SYSCALL_NUM + 4;

    /// Package a process's counters as of `now_cycles`.
    pub fn collect(status: TaskStatus, accounting: &Accounting, now_cycles: u64) -> Self {
        let elapsed = accounting.elapsed_ms(now_cycles);
        Self {
            status,
            syscall_times: accounting.syscall_times(),
            time: i32::try_from(elapsed).unwrap_or(i32::MAX),
        }
    }

    /// Little-endian `repr(C)` image.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&(self.status as u32).to_le_bytes());
        for (chunk, count) in out[4..Self::SIZE - 4]
            .chunks_exact_mut(4)
            .zip(self.syscall_times.iter())
        {
            chunk.copy_from_slice(&count.to_le_bytes());
        }
        out[Self::SIZE - 4..].copy_from_slice(&self.time.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CPU_FREQ;

    #[test]
    fn counts_only_grow() {
        let mut acct = Accounting::new(0);
        acct.record(64);
        acct.record(64);
        acct.record(222);
        assert_eq!(acct.count(64), 2);
        assert_eq!(acct.count(222), 1);
        assert_eq!(acct.count(93), 0);
        assert_eq!(acct.count(MAX_SYSCALL_NUM + 1), 0);
        assert_eq!(acct.syscall_times().iter().sum::<u32>(), 3);
    }

    #[test]
    fn elapsed_is_relative_to_start() {
        let acct = Accounting::new(CPU_FREQ);
        assert_eq!(acct.elapsed_ms(CPU_FREQ), 0);
        assert_eq!(acct.elapsed_ms(CPU_FREQ * 3), 2000);
        // A clock read before start never underflows.
        assert_eq!(acct.elapsed_ms(0), 0);
    }

    #[test]
    fn task_info_image_layout() {
        let mut acct = Accounting::new(0);
        acct.record(1);
        acct.record(499);
        let info = TaskInfo::collect(TaskStatus::Running, &acct, CPU_FREQ / 2);
        assert_eq!(info.time, 500);

        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), 2008);
        assert_eq!(&bytes[..4], &2u32.to_le_bytes());
        assert_eq!(&bytes[4 + 4..4 + 8], &1u32.to_le_bytes());
        assert_eq!(&bytes[4 + 4 * 499..4 + 4 * 500], &1u32.to_le_bytes());
        assert_eq!(&bytes[2004..], &500i32.to_le_bytes());
    }
}
