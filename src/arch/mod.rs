//! Architecture support. The module tree itself builds on any host target
//! so the table builders, VCPU model, scheduler and timer emulation can be
//! exercised by `cargo test`; only the `SysOps` hardware implementation in
//! `aarch64::regs` is gated to real aarch64 targets.
pub mod aarch64;
