//! RISC-V trap handling for user mode
//!
//! The assembly entry stub (not part of this crate) saves the user
//! registers into a [`TrapContext`] and calls [`handle_user_trap`]. On
//! [`Completion::Resume`] it restores the context and executes `sret`;
//! on [`Completion::Exited`] it switches away for good.
//!
//! # Trap Causes
//! - `ecall` from U-mode: system call
//! - Page and access faults: the process is killed
//! - Illegal instruction: the process is killed
//! - Interrupts: logged, the process resumes

use log::{error, warn};

use crate::config::{EXIT_CODE_FAULT, EXIT_CODE_ILLEGAL};
use crate::process::Process;
use crate::syscall::{self, Completion, Kernel};

/// Register file saved on trap entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapContext {
    /// General purpose registers x0-x31
    pub x: [usize; 32],
    /// Supervisor status
    pub sstatus: usize,
    /// Exception program counter
    pub sepc: usize,
    /// Trap cause
    pub scause: usize,
    /// Faulting address or instruction bits
    pub stval: usize,
}

/// `a0`
const REG_A0: usize = 10;
/// `a7`
const REG_A7: usize = 17;

/// Length of the `ecall` instruction.
const ECALL_LEN: usize = 4;

impl TrapContext {
    /// Context of an `ecall` with call number `id` and arguments `args`.
    pub fn syscall(id: usize, args: [usize; 6]) -> Self {
        let mut ctx = Self {
            scause: scause::USER_ECALL,
            ..Self::default()
        };
        ctx.x[REG_A7] = id;
        ctx.x[REG_A0..REG_A0 + 6].copy_from_slice(&args);
        ctx
    }

    /// Call number from `a7`.
    pub fn syscall_id(&self) -> usize {
        self.x[REG_A7]
    }

    /// Arguments from `a0..a5`.
    pub fn syscall_args(&self) -> [usize; 6] {
        let mut args = [0; 6];
        args.copy_from_slice(&self.x[REG_A0..REG_A0 + 6]);
        args
    }

    /// Store a syscall result in `a0`.
    pub fn set_return(&mut self, value: i64) {
        self.x[REG_A0] = value as usize;
    }
}

/// `scause` exception codes
mod scause {
    pub const INTERRUPT: usize = 1 << (usize::BITS - 1);

    pub const INSTRUCTION_ACCESS_FAULT: usize = 1;
    pub const ILLEGAL_INSTRUCTION: usize = 2;
    pub const LOAD_ACCESS_FAULT: usize = 5;
    pub const STORE_ACCESS_FAULT: usize = 7;
    pub const USER_ECALL: usize = 8;
    pub const INSTRUCTION_PAGE_FAULT: usize = 12;
    pub const LOAD_PAGE_FAULT: usize = 13;
    pub const STORE_PAGE_FAULT: usize = 15;
}

/// Trap cause decoded from `scause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    Interrupt(usize),
    UserEcall,
    /// Page or access fault on fetch, load or store.
    MemoryFault(usize),
    IllegalInstruction,
    Other(usize),
}

impl From<usize> for TrapCause {
    fn from(raw: usize) -> Self {
        if raw & scause::INTERRUPT != 0 {
            return TrapCause::Interrupt(raw & !scause::INTERRUPT);
        }
        match raw {
            scause::USER_ECALL => TrapCause::UserEcall,
            scause::INSTRUCTION_ACCESS_FAULT
            | scause::LOAD_ACCESS_FAULT
            | scause::STORE_ACCESS_FAULT
            | scause::INSTRUCTION_PAGE_FAULT
            | scause::LOAD_PAGE_FAULT
            | scause::STORE_PAGE_FAULT => TrapCause::MemoryFault(raw),
            scause::ILLEGAL_INSTRUCTION => TrapCause::IllegalInstruction,
            other => TrapCause::Other(other),
        }
    }
}

/// Handle a trap taken from user mode.
///
/// # Panics
/// Panics on an exception cause the kernel has no handler for.
pub fn handle_user_trap(
    ctx: &mut TrapContext,
    proc: &mut Process,
    kernel: &mut Kernel<'_>,
) -> Completion {
    match TrapCause::from(ctx.scause) {
        TrapCause::UserEcall => {
            ctx.sepc += ECALL_LEN;
            syscall::dispatch(ctx, proc, kernel)
        }
        TrapCause::MemoryFault(code) => {
            error!(
                "pid {}: memory fault (scause {}) at {:#x}, sepc {:#x}; killed",
                proc.pid, code, ctx.stval, ctx.sepc
            );
            syscall::terminate(proc, kernel, EXIT_CODE_FAULT);
            Completion::Exited(EXIT_CODE_FAULT)
        }
        TrapCause::IllegalInstruction => {
            error!(
                "pid {}: illegal instruction {:#x} at {:#x}; killed",
                proc.pid, ctx.stval, ctx.sepc
            );
            syscall::terminate(proc, kernel, EXIT_CODE_ILLEGAL);
            Completion::Exited(EXIT_CODE_ILLEGAL)
        }
        TrapCause::Interrupt(code) => {
            warn!("pid {}: unhandled interrupt {}", proc.pid, code);
            Completion::Resume
        }
        TrapCause::Other(code) => {
            panic!(
                "unsupported trap from user mode: scause {:#x}, stval {:#x}",
                code, ctx.stval
            );
        }
    }
}
