//! `log` backend writing to the serial console
//!
//! Format: `[LEVEL] target: message`

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::kprintln;

/// Logger that prints every enabled record on the UART.
pub struct KernelLogger {
    max_level: LevelFilter,
}

impl KernelLogger {
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        kprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: spin::Once<KernelLogger> = spin::Once::new();

/// Install the console logger. Call once during early init, after the
/// UART is up.
///
/// # Errors
/// Fails if some other logger was installed first.
pub fn init(max_level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| KernelLogger::new(max_level));
    log::set_logger(logger)?;
    log::set_max_level(max_level);
    Ok(())
}
