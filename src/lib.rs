//! Schism: a minimal Type-1 hypervisor for ARMv8-A EL2.
//!
//! The crate builds for any host target so the table builders, VCPU
//! model, scheduler, trap dispatch and timer emulation can run under
//! `cargo test`; only [`arch::aarch64::regs::Hw`] (the real `mrs`/`msr`
//! wrapper) and the `schism` binary (`src/main.rs`) require an `aarch64`
//! target and `link.ld`.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod console;
pub mod error;
pub mod guest_api;
pub mod logger;
pub mod platform;
pub mod vmm;
