//! Crate-wide error type.
//!
//! Fatal conditions called out by the design (table-pool exhaustion, an
//! unrecognized exception class) are not represented here: those are
//! unconditionally terminal and handled by halting, not by propagating a
//! `Result`. This type covers the call sites that have a meaningful
//! non-fatal outcome.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No free slot in an L2/L3 table pool.
    TablePoolExhausted,
    /// A requested IPA/VA does not fall inside any configured window.
    AddressOutOfRange,
    /// The VMID bitmap has no free id.
    VmidPoolExhausted,
    /// The scheduler run queue is already at capacity.
    SchedulerFull,
    /// No VCPU is registered under the given id.
    UnknownVcpu,
    /// A sysreg encoding did not match any case this crate emulates.
    UnhandledSysReg(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TablePoolExhausted => write!(f, "table pool exhausted"),
            Error::AddressOutOfRange => write!(f, "address out of range"),
            Error::VmidPoolExhausted => write!(f, "vmid pool exhausted"),
            Error::SchedulerFull => write!(f, "scheduler run queue full"),
            Error::UnknownVcpu => write!(f, "unknown vcpu id"),
            Error::UnhandledSysReg(enc) => write!(f, "unhandled sysreg {enc:#x}"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
