//! NS16550A UART Driver for QEMU virt machine
//!
//! Serial console output for the kernel log and for user `write` calls.
//!
//! # Memory Map (QEMU virt)
//! - Base address: 0x1000_0000
//! - Byte-wide registers
//!
//! # Safety Considerations
//! - Output only
//! - Nothing touches MMIO until [`Uart::init`] has run
//! - Uses spinlock for shared access

use core::fmt::{self, Write};
use spin::Mutex;

use super::CharDevice;
use crate::config::UART_BASE;

/// 16550 register offsets
mod regs {
    /// Transmit Holding Register (write)
    pub const THR: usize = 0x00;
    /// Line Status Register
    pub const LSR: usize = 0x05;
}

/// Line Status Register bits
mod lsr {
    /// Transmit holding register empty
    pub const THRE: u8 = 1 << 5;
}

/// NS16550A UART driver
pub struct Uart {
    base: usize,
    initialized: bool,
}

impl Uart {
    /// Create a new UART instance (not yet initialized)
    pub const fn new(base: usize) -> Self {
        Self {
            base,
            initialized: false,
        }
    }

    /// Initialize the UART
    ///
    /// # Safety
    /// - `base` must be the MMIO address of a 16550-compatible UART
    /// - The register page must be mapped in the kernel's address space
    pub unsafe fn init(&mut self) {
        // QEMU leaves the line configured (8N1); just mark as ready
        self.initialized = true;
    }

    /// Write a single byte to the UART
    fn write_byte(&self, byte: u8) {
        if !self.initialized {
            return;
        }

        // SAFETY: init() was called, so base points at the UART registers.
        // Volatile access is required for MMIO.
        unsafe {
            let status = (self.base + regs::LSR) as *const u8;
            let thr = (self.base + regs::THR) as *mut u8;

            // Wait for the transmit holding register to drain
            while core::ptr::read_volatile(status) & lsr::THRE == 0 {
                core::hint::spin_loop();
            }

            core::ptr::write_volatile(thr, byte);
        }
    }

    /// Write a string, translating `\n` to `\r\n`
    pub fn write_str(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Uart::write_str(self, s);
        Ok(())
    }
}

impl CharDevice for Uart {
    fn put_byte(&mut self, byte: u8) {
        self.write_byte(byte);
    }
}

/// Console device for `write`, backed by the global [`UART`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UartConsole;

impl CharDevice for UartConsole {
    fn put_byte(&mut self, byte: u8) {
        UART.lock().put_byte(byte);
    }
}

/// Global UART instance protected by spinlock
pub static UART: Mutex<Uart> = Mutex::new(Uart::new(UART_BASE));

/// Print macro for kernel output
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut uart = $crate::drivers::uart::UART.lock();
        let _ = write!(uart, $($arg)*);
    }};
}

/// Println macro for kernel output
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint!("\n")
    };
    ($($arg:tt)*) => {{
        $crate::kprint!($($arg)*);
        $crate::kprint!("\n");
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_uart_swallows_output() {
        // Never touches MMIO before init.
        let mut uart = Uart::new(UART_BASE);
        uart.put_byte(b'x');
        Uart::write_str(&uart, "hello\n");
    }
}
