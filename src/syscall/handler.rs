//! System Call Handler
//!
//! Dispatches system calls and implements individual syscall handlers.
//!
//! # Conventions
//! - Handlers return `Result<i64, SyscallError>`; [`dispatch`] is the only
//!   place an error becomes the `-1` the ABI carries
//! - Each handler validates its own arguments
//! - Recognized calls are counted before they run, failures included

use core::cmp::min;

use log::{debug, error, trace};

use super::decode::Syscall;
use super::{Completion, Kernel};
use crate::accounting::TaskInfo;
use crate::config::{MAX_STR_LEN, STDOUT};
use crate::mm::address::VirtAddr;
use crate::mm::mmap::{self, MapRequest, MmapError};
use crate::mm::uaccess::{self, UserAccessError};
use crate::process::{HeapError, Process, TaskStatus};
use crate::time::TimeVal;
use crate::trap::TrapContext;

/// Value written to `a0` for every failed or unsupported call.
pub const SYSCALL_FAILURE: i64 = -1;

/// Why a system call failed.
///
/// The ABI has no error channel; this is for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyscallError {
    /// No handler for this call number.
    #[error("unsupported syscall {0}")]
    Unsupported(usize),
    /// `write` to something other than stdout.
    #[error("bad file descriptor {0}")]
    BadDescriptor(i32),
    #[error(transparent)]
    Mmap(#[from] MmapError),
    #[error(transparent)]
    UserCopy(#[from] UserAccessError),
    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl SyscallError {
    /// The value user space sees.
    pub const fn sentinel(&self) -> i64 {
        SYSCALL_FAILURE
    }
}

type SyscallResult = Result<i64, SyscallError>;

/// Dispatch the system call described by `ctx` on behalf of `proc`.
///
/// Reads the call number and arguments, counts the call, runs its handler
/// and writes the result to `a0`. Unknown call numbers are logged, not
/// counted, and answered with [`SYSCALL_FAILURE`]. `exit` never writes a
/// result; the caller must not resume the process after
/// [`Completion::Exited`].
pub fn dispatch(ctx: &mut TrapContext, proc: &mut Process, kernel: &mut Kernel<'_>) -> Completion {
    let id = ctx.syscall_id();
    let args = ctx.syscall_args();
    trace!("syscall {} args = {:x?}", id, args);

    let call = match Syscall::decode(id, args) {
        Ok(call) => call,
        Err(e) => {
            error!("pid {}: {}", proc.pid, e);
            ctx.set_return(e.sentinel());
            return Completion::Resume;
        }
    };

    // Whoever traps is the process on the CPU.
    proc.status = TaskStatus::Running;
    proc.accounting.record(call.id());

    let result = match call {
        Syscall::Exit { code } => {
            terminate(proc, kernel, code);
            return Completion::Exited(code);
        }
        Syscall::Write { fd, buf, len } => sys_write(proc, kernel, fd, buf, len),
        Syscall::SchedYield => sys_sched_yield(proc, kernel),
        Syscall::GetTimeOfDay { tv, tz } => sys_gettimeofday(proc, kernel, tv, tz),
        Syscall::Sbrk { delta } => sys_sbrk(proc, kernel, delta),
        Syscall::TaskInfo { info } => sys_task_info(proc, kernel, info),
        Syscall::Mmap(req) => sys_mmap(proc, kernel, &req),
        Syscall::Munmap { start, len } => sys_munmap(proc, kernel, start, len),
    };

    let ret = match result {
        Ok(value) => value,
        Err(e) => {
            debug!("pid {}: {} failed: {}", proc.pid, call.name(), e);
            e.sentinel()
        }
    };
    ctx.set_return(ret);
    trace!("syscall ret {}", ret);
    Completion::Resume
}

/// Mark `proc` exited and hand it to the scheduler.
pub(crate) fn terminate(proc: &mut Process, kernel: &mut Kernel<'_>, code: i32) {
    debug!("pid {}: exit({})", proc.pid, code);
    proc.status = TaskStatus::Exited;
    proc.exit_code = Some(code);
    kernel.scheduler.exit(proc, code);
}

/// Write system call
///
/// Copies at most [`MAX_STR_LEN`] bytes (stopping at a NUL) from `buf`
/// and emits them on the console.
///
/// # Returns
/// Number of bytes emitted
fn sys_write(
    proc: &mut Process,
    kernel: &mut Kernel<'_>,
    fd: i32,
    buf: VirtAddr,
    len: usize,
) -> SyscallResult {
    debug!("sys_write fd = {} va = {} len = {}", fd, buf, len);
    if fd != STDOUT {
        return Err(SyscallError::BadDescriptor(fd));
    }

    let mut staging = [0u8; MAX_STR_LEN];
    let want = min(len, MAX_STR_LEN);
    let size = uaccess::copy_in_str(proc.page_table(), &*kernel.mem, &mut staging[..want], buf)?;

    for &byte in &staging[..size] {
        kernel.console.put_byte(byte);
    }
    Ok(size as i64)
}

fn sys_sched_yield(proc: &mut Process, kernel: &mut Kernel<'_>) -> SyscallResult {
    kernel.scheduler.yield_now(proc);
    Ok(0)
}

/// Copy the current time, as a [`TimeVal`], to `tv`.
fn sys_gettimeofday(
    proc: &mut Process,
    kernel: &mut Kernel<'_>,
    tv: VirtAddr,
    _tz: usize,
) -> SyscallResult {
    let now = TimeVal::from_cycles(kernel.clock.cycles());
    uaccess::copy_out(proc.page_table(), &mut *kernel.mem, tv, &now.to_bytes())?;
    Ok(0)
}

/// Move the program break; returns the previous break.
fn sys_sbrk(proc: &mut Process, kernel: &mut Kernel<'_>, delta: isize) -> SyscallResult {
    debug!("sys_sbrk delta = {}", delta);
    let old = proc.grow_heap(&mut *kernel.mem, delta)?;
    Ok(old as i64)
}

/// Copy status, syscall counts and run time to `info`.
fn sys_task_info(proc: &mut Process, kernel: &mut Kernel<'_>, info: VirtAddr) -> SyscallResult {
    let snapshot = TaskInfo::collect(proc.status, &proc.accounting, kernel.clock.cycles());
    uaccess::copy_out(proc.page_table(), &mut *kernel.mem, info, &snapshot.to_bytes())?;
    Ok(0)
}

fn sys_mmap(proc: &mut Process, kernel: &mut Kernel<'_>, req: &MapRequest) -> SyscallResult {
    debug!(
        "sys_mmap start = {} len = {:#x} prot = {:#x}",
        req.start, req.len, req.prot
    );
    if let Some(region) = req.validate()? {
        mmap::map_region(proc.page_table_mut(), &mut *kernel.mem, &region)?;
    }
    Ok(0)
}

fn sys_munmap(
    proc: &mut Process,
    kernel: &mut Kernel<'_>,
    start: VirtAddr,
    len: usize,
) -> SyscallResult {
    debug!("sys_munmap start = {} len = {:#x}", start, len);
    mmap::unmap_region(proc.page_table_mut(), &mut *kernel.mem, start, len)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::super::decode::numbers::*;
    use super::*;
    use crate::config::{CPU_FREQ, PAGE_SIZE};
    use crate::mm::frame::FramePool;
    use crate::testing::{ManualClock, RecordingConsole, RecordingScheduler, TestRam};

    const HEAP: usize = 0x40_0000;
    const OUT: usize = STDOUT as usize;

    struct Rig<'m> {
        mem: FramePool<'m>,
        console: RecordingConsole,
        clock: ManualClock,
        sched: RecordingScheduler,
        proc: Process,
    }

    impl<'m> Rig<'m> {
        fn new(ram: &'m mut TestRam) -> Self {
            let mut mem = ram.pool();
            let proc = Process::new(7, &mut mem, VirtAddr::new(HEAP), 0).unwrap();
            Self {
                mem,
                console: RecordingConsole::default(),
                clock: ManualClock::at(0),
                sched: RecordingScheduler::default(),
                proc,
            }
        }

        fn call(&mut self, id: usize, args: [usize; 6]) -> (Completion, i64) {
            let mut ctx = TrapContext::syscall(id, args);
            ctx.set_return(0x5a5a);
            let mut kernel = Kernel {
                mem: &mut self.mem,
                console: &mut self.console,
                clock: &self.clock,
                scheduler: &mut self.sched,
            };
            let done = dispatch(&mut ctx, &mut self.proc, &mut kernel);
            (done, ctx.x[10] as i64)
        }

        fn ret(&mut self, id: usize, args: [usize; 6]) -> i64 {
            let (done, ret) = self.call(id, args);
            assert_eq!(done, Completion::Resume);
            ret
        }

        fn read_user(&self, va: usize, out: &mut [u8]) {
            uaccess::copy_in(self.proc.page_table(), &self.mem, out, VirtAddr::new(va)).unwrap();
        }

        fn write_user(&mut self, va: usize, bytes: &[u8]) {
            uaccess::copy_out(self.proc.page_table(), &mut self.mem, VirtAddr::new(va), bytes)
                .unwrap();
        }
    }

    #[test]
    fn unknown_call_fails_without_counting() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.ret(42, [0; 6]), SYSCALL_FAILURE);
        assert_eq!(rig.proc.accounting.syscall_times().iter().sum::<u32>(), 0);
    }

    #[test]
    fn failed_calls_are_still_counted() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.ret(SYS_MMAP, [0x1001, 4096, 1, 0, 0, 0]), SYSCALL_FAILURE);
        assert_eq!(rig.ret(SYS_WRITE, [2, 0, 0, 0, 0, 0]), SYSCALL_FAILURE);
        assert_eq!(rig.proc.accounting.count(SYS_MMAP), 1);
        assert_eq!(rig.proc.accounting.count(SYS_WRITE), 1);
    }

    #[test]
    fn write_emits_bytes_up_to_nul() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.ret(SYS_MMAP, [0x1000, PAGE_SIZE, 3, 0, 0, 0]), 0);
        rig.write_user(0x1000, b"hi there\0junk");

        assert_eq!(rig.ret(SYS_WRITE, [OUT, 0x1000, 100, 0, 0, 0]), 8);
        assert_eq!(rig.console.out, b"hi there");
        assert_eq!(rig.ret(SYS_WRITE, [OUT, 0x1000, 2, 0, 0, 0]), 2);
        assert_eq!(rig.console.out, b"hi therehi");
    }

    #[test]
    fn only_low_register_halves_reach_write_and_mmap() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        let high = 1usize << 32;
        assert_eq!(rig.ret(SYS_MMAP, [0x2000, PAGE_SIZE, high | 3, 0, 0, 0]), 0);
        rig.write_user(0x2000, b"ok");
        assert_eq!(rig.ret(SYS_WRITE, [high | OUT, 0x2000, high | 1, 0, 0, 0]), 1);
        assert_eq!(rig.console.out, b"o");
    }

    #[test]
    fn write_is_capped_at_max_str_len() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.ret(SYS_MMAP, [0x1000, PAGE_SIZE, 3, 0, 0, 0]), 0);
        rig.write_user(0x1000, &[b'a'; 300]);
        assert_eq!(rig.ret(SYS_WRITE, [OUT, 0x1000, 300, 0, 0, 0]), MAX_STR_LEN as i64);
        assert_eq!(rig.console.out.len(), MAX_STR_LEN);
    }

    #[test]
    fn write_from_unmapped_buffer_fails() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.ret(SYS_WRITE, [OUT, 0x7000, 5, 0, 0, 0]), SYSCALL_FAILURE);
        assert!(rig.console.out.is_empty());
    }

    #[test]
    fn exit_skips_write_back() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        let (done, a0) = rig.call(SYS_EXIT, [3, 0, 0, 0, 0, 0]);
        assert_eq!(done, Completion::Exited(3));
        assert_eq!(a0, 0x5a5a);
        assert_eq!(rig.sched.exits, vec![(7, 3)]);
        assert_eq!(rig.proc.status, TaskStatus::Exited);
        assert_eq!(rig.proc.exit_code, Some(3));
        assert_eq!(rig.proc.accounting.count(SYS_EXIT), 1);
    }

    #[test]
    fn yield_goes_to_scheduler() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.ret(SYS_SCHED_YIELD, [0; 6]), 0);
        assert_eq!(rig.sched.yields, 1);
    }

    #[test]
    fn gettimeofday_copies_timeval() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.ret(SYS_MMAP, [0x1000, PAGE_SIZE, 3, 0, 0, 0]), 0);
        rig.clock.advance(CPU_FREQ * 2 + CPU_FREQ / 2);

        assert_eq!(rig.ret(SYS_GETTIMEOFDAY, [0x1000, 0, 0, 0, 0, 0]), 0);
        let mut raw = [0u8; TimeVal::SIZE];
        rig.read_user(0x1000, &mut raw);
        assert_eq!(raw, TimeVal { sec: 2, usec: 500_000 }.to_bytes());

        // read-only destination
        assert_eq!(rig.ret(SYS_MMAP, [0x2000, PAGE_SIZE, 1, 0, 0, 0]), 0);
        assert_eq!(rig.ret(SYS_GETTIMEOFDAY, [0x2000, 0, 0, 0, 0, 0]), SYSCALL_FAILURE);
    }

    #[test]
    fn sbrk_returns_previous_break() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.ret(SYS_SBRK, [PAGE_SIZE, 0, 0, 0, 0, 0]), HEAP as i64);
        assert_eq!(rig.ret(SYS_SBRK, [0, 0, 0, 0, 0, 0]), (HEAP + PAGE_SIZE) as i64);
        rig.write_user(HEAP, b"heap");
        let shrink = (-(PAGE_SIZE as i32)) as u32 as usize;
        assert_eq!(rig.ret(SYS_SBRK, [shrink, 0, 0, 0, 0, 0]), (HEAP + PAGE_SIZE) as i64);
        assert_eq!(rig.proc.program_brk(), HEAP);
        assert_eq!(rig.ret(SYS_SBRK, [u32::MAX as usize, 0, 0, 0, 0, 0]), SYSCALL_FAILURE);
    }

    #[test]
    fn caller_is_reported_running() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.proc.status, TaskStatus::Ready);
        assert_eq!(rig.ret(SYS_MMAP, [0x1000, PAGE_SIZE, 3, 0, 0, 0]), 0);
        assert_eq!(rig.proc.status, TaskStatus::Running);

        assert_eq!(rig.ret(SYS_TASK_INFO, [0x1000, 0, 0, 0, 0, 0]), 0);
        let mut status = [0u8; 4];
        rig.read_user(0x1000, &mut status);
        assert_eq!(u32::from_le_bytes(status), TaskStatus::Running as u32);
    }

    #[test]
    fn task_info_reports_counts_and_time() {
        let mut ram = TestRam::new(32);
        let mut rig = Rig::new(&mut ram);
        assert_eq!(rig.ret(SYS_MMAP, [0x1000, TaskInfo::SIZE, 3, 0, 0, 0]), 0);
        rig.ret(SYS_SCHED_YIELD, [0; 6]);
        rig.ret(SYS_SCHED_YIELD, [0; 6]);
        rig.clock.advance(CPU_FREQ / 10);

        assert_eq!(rig.ret(SYS_TASK_INFO, [0x1000, 0, 0, 0, 0, 0]), 0);
        let mut raw = [0u8; TaskInfo::SIZE];
        rig.read_user(0x1000, &mut raw);

        let mut expected = [0u32; crate::config::MAX_SYSCALL_NUM];
        expected[SYS_MMAP] = 1;
        expected[SYS_SCHED_YIELD] = 2;
        expected[SYS_TASK_INFO] = 1;
        let want = TaskInfo {
            status: TaskStatus::Running,
            syscall_times: expected,
            time: 100,
        };
        assert_eq!(raw, want.to_bytes());
    }
}
