//! `log::Log` sink backed by the UART console, modeled on
//! `tandasat-Hypervisor-101-in-Rust`'s `UartLogger`.

use crate::console;
use log::{LevelFilter, Metadata, Record};

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= LevelFilter::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        console::puts(record.level().as_str());
        console::puts(": ");
        crate::println!("{}", record.args());
    }

    fn flush(&self) {}
}

/// Installs the UART-backed logger. Call once, after `console::init`.
pub fn init() {
    // `set_logger` only fails if a logger was already installed; `el2_main`
    // calls this exactly once, so the failure case is unreachable in
    // practice and not worth propagating.
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info));
}
