//! Cycle counter and wall-clock conversions
//!
//! The kernel's only time source is the free-running `time` counter
//! ticking at [`CPU_FREQ`].

use crate::config::CPU_FREQ;

/// Source of the current cycle count. Must never go backwards.
pub trait Clock {
    /// Current value of the cycle counter.
    fn cycles(&self) -> u64;
}

/// Reads the `time` CSR.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchClock;

#[cfg(target_arch = "riscv64")]
impl Clock for ArchClock {
    fn cycles(&self) -> u64 {
        let t: u64;
        // SAFETY: rdtime has no side effects
        unsafe {
            core::arch::asm!("rdtime {0}", out(reg) t, options(nomem, nostack));
        }
        t
    }
}

#[cfg(not(target_arch = "riscv64"))]
impl Clock for ArchClock {
    fn cycles(&self) -> u64 {
        0
    }
}

/// Convert cycles to whole milliseconds.
pub fn cycles_to_ms(cycles: u64) -> u64 {
    (u128::from(cycles) * 1000 / u128::from(CPU_FREQ)) as u64
}

/// `struct timeval` as user space sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct TimeVal {
    pub sec: u64,
    pub usec: u64,
}

impl TimeVal {
    /// Size of the user-visible image in bytes.
    pub const SIZE: usize = 16;

    /// Split a cycle count into seconds and microseconds.
    pub fn from_cycles(cycles: u64) -> Self {
        Self {
            sec: cycles / CPU_FREQ,
            usec: (cycles % CPU_FREQ) * 1_000_000 / CPU_FREQ,
        }
    }

    /// Little-endian `repr(C)` image.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..8].copy_from_slice(&self.sec.to_le_bytes());
        out[8..].copy_from_slice(&self.usec.to_le_bytes());
        out
    }
}
