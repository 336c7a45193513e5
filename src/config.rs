//! Kernel configuration constants
//!
//! Everything tunable at build time lives here so the rest of the crate
//! never hard-codes a size or an address.

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Number of syscall ids tracked per process.
///
/// Every recognized id must be below this bound.
pub const MAX_SYSCALL_NUM: usize = 500;

/// Upper bound on the bytes one `write` call copies in from user space.
pub const MAX_STR_LEN: usize = 200;

/// Frequency of the `time` counter on QEMU `virt` (ticks per second).
pub const CPU_FREQ: u64 = 12_500_000;

/// First virtual address user mappings may not reach.
///
/// One bit less than the Sv39 maximum so user addresses never need
/// sign extension.
pub const USER_SPACE_END: usize = 1 << (9 + 9 + 9 + 12 - 1);

/// The only descriptor `write` accepts.
pub const STDOUT: i32 = 1;

/// Default physical base of the frame pool (right after the kernel image).
pub const FRAME_BASE: usize = 0x8020_0000;

/// NS16550A UART base on QEMU `virt`.
pub const UART_BASE: usize = 0x1000_0000;

/// Size of the static kernel heap installed by the `kernel-heap` feature.
pub const KERNEL_HEAP_SIZE: usize = 64 * 1024;

/// Exit code given to a process killed by a memory fault.
pub const EXIT_CODE_FAULT: i32 = -2;
/// Exit code given to a process killed by an illegal instruction.
pub const EXIT_CODE_ILLEGAL: i32 = -3;
