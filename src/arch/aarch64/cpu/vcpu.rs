//! VCPU state and construction.
//!
//! Field-for-field port of `vcpu_arch_t`/`vcpu_t` in
//! `original_source/include/vcpu.h`, with one deliberate change: EL1
//! register capture. `spec.md` §9 flags the original's choice (snapshot
//! the hypervisor's own, currently-unused EL1 view) as not meaningful for
//! a Type-1 guest; this crate takes an explicit [`VcpuBootManifest`]
//! instead (see `SPEC_FULL.md` §C.2).

use super::trapframe::Trapframe;
use crate::config::MAX_VGIC_LIST_REGS;

#[derive(Debug, Clone, Copy, Default)]
pub struct FpState {
    pub used: bool,
    pub fpcr: u64,
    pub fpsr: u64,
    pub vregs: [[u64; 2]; 32],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SveState {
    pub used: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PauthState {
    pub used: bool,
    pub apia: u64,
    pub apib: u64,
    pub apda: u64,
    pub apdb: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct VgicState {
    pub lrs: [u64; MAX_VGIC_LIST_REGS],
    pub vmcr: u64,
    pub apr: u64,
    /// Number of list registers this core actually implements
    /// (`ICH_VTR_EL2.ListRegs + 1`), cached the first time it is read.
    pub lr_count: Option<u8>,
}

impl Default for VgicState {
    fn default() -> Self {
        VgicState { lrs: [0; MAX_VGIC_LIST_REGS], vmcr: 0, apr: 0, lr_count: None }
    }
}

/// What `vcpu_init_slot` would otherwise have read out of the
/// hypervisor's own (unused) EL1 register file. A Type-1 guest's initial
/// EL1 state should come from a boot-time contract, not from whatever the
/// hypervisor's own EL1 registers happen to hold; see `SPEC_FULL.md` §C.2.
#[derive(Debug, Clone, Copy, Default)]
pub struct VcpuBootManifest {
    pub ttbr0_el1: u64,
    pub ttbr1_el1: u64,
    pub tcr_el1: u64,
    pub sctlr_el1: u64,
    pub tpidr_el1: u64,
    pub cntkctl_el1: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct VcpuArch {
    pub vttbr_el2: u64,
    pub cntvoff_el2: u64,
    pub cntvct_el0: u64,
    pub fp: FpState,
    pub sve: SveState,
    pub pauth: PauthState,
    pub vgic: VgicState,
    pub tf: Trapframe,
}

pub struct Vcpu {
    pub arch: VcpuArch,
    pub vcpu_id: u32,
    pub request_yield: bool,
}

impl Vcpu {
    /// Builds a VCPU ready to enter EL1 at `entry` with `sp_el1 = stack`
    /// and `x0 = vcpu_id`, matching `vcpu_init_slot`'s register layout
    /// (`SPSR_EL1h | DAIF`, `regs[0] = id`).
    pub fn new(
        vcpu_id: u32,
        entry: u64,
        stack: u64,
        vttbr_el2: u64,
        cntvct_el0: u64,
        manifest: VcpuBootManifest,
    ) -> Self {
        const SPSR_EL1H_MASKED: u64 = 0x5 | (0xf << 6);
        let mut tf = Trapframe {
            sp_el1: stack,
            elr_el1: entry,
            spsr_el1: SPSR_EL1H_MASKED,
            ttbr0_el1: manifest.ttbr0_el1,
            ttbr1_el1: manifest.ttbr1_el1,
            tcr_el1: manifest.tcr_el1,
            sctlr_el1: manifest.sctlr_el1,
            tpidr_el1: manifest.tpidr_el1,
            cntkctl_el1: manifest.cntkctl_el1,
            ..Default::default()
        };
        tf.regs[0] = vcpu_id as u64;

        Vcpu {
            arch: VcpuArch {
                vttbr_el2,
                cntvoff_el2: 0,
                cntvct_el0,
                fp: FpState::default(),
                sve: SveState::default(),
                pauth: PauthState::default(),
                vgic: VgicState::default(),
                tf,
            },
            vcpu_id,
            request_yield: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_programs_entry_stack_and_id() {
        let v = Vcpu::new(3, 0x4000_1000, 0x4008_0000, 0x1234, 99, VcpuBootManifest::default());
        assert_eq!(v.arch.tf.elr_el1, 0x4000_1000);
        assert_eq!(v.arch.tf.sp_el1, 0x4008_0000);
        assert_eq!(v.arch.tf.regs[0], 3);
        assert_eq!(v.arch.tf.spsr_el1, 0x5 | (0xf << 6));
        assert_eq!(v.arch.vttbr_el2, 0x1234);
        assert_eq!(v.arch.cntvct_el0, 99);
        assert_eq!(v.arch.cntvoff_el2, 0);
        assert!(!v.request_yield);
    }
}
