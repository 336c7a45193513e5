//! Device drivers
//!
//! Only the console matters to the syscall layer: `write` pushes bytes
//! at a [`CharDevice`] one at a time.

pub mod uart;

/// Raw character output device.
pub trait CharDevice {
    /// Emit one byte.
    fn put_byte(&mut self, byte: u8);
}
