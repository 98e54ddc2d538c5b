//! World switch: the ordered save/restore protocol between two VCPUs.
//!
//! Transcribed from `world_switch` in `original_source/core/vcpu.c`. The
//! ordering is load-bearing (irqs masked first, `VTTBR_EL2` committed
//! before `CNTVOFF_EL2`, restore happens in the mirror order of save) and
//! is preserved exactly; only the per-step save/restore calls are broken
//! out into named functions.

use super::vcpu::{PauthState, Vcpu, VgicState};
use crate::arch::aarch64::regs::{SysOps, SysReg};
use crate::config::MAX_VGIC_LIST_REGS;

fn save_fp(ops: &impl SysOps, vcpu: &mut Vcpu) {
    ops.save_fp_regs(&mut vcpu.arch.fp.vregs);
    vcpu.arch.fp.used = true;
}

fn restore_fp(ops: &impl SysOps, vcpu: &Vcpu) {
    ops.restore_fp_regs(&vcpu.arch.fp.vregs);
}

fn save_sve(_ops: &impl SysOps, vcpu: &mut Vcpu) {
    // SVE save is not implemented; matches `original_source`, which
    // leaves `sve.used` false and never touches Z/P register state.
    vcpu.arch.sve.used = false;
}

fn restore_sve(_ops: &impl SysOps, _vcpu: &mut Vcpu) {
    // Mirrors `save_sve`: `original_source`'s `restore_sve` is likewise a
    // no-op, since SVE state is never saved in the first place.
}

fn save_pauth(ops: &impl SysOps, vcpu: &mut Vcpu) {
    let _ = (ops, &mut vcpu.arch.pauth);
    // Pointer authentication key save/restore is gated on
    // `__ARM_FEATURE_PAUTH` in `original_source` and this platform does not
    // enable it; `pauth.used` stays false and the keys are left alone.
}

fn restore_pauth(_ops: &impl SysOps, _pauth: &PauthState) {}

fn vgic_lr_count(ops: &impl SysOps, vgic: &mut VgicState) -> u8 {
    if let Some(n) = vgic.lr_count {
        return n;
    }
    let vtr = ops.read(SysReg::IchVtrEl2);
    let n = (((vtr & 0xf) + 1) as u8).min(MAX_VGIC_LIST_REGS as u8);
    vgic.lr_count = Some(n);
    n
}

fn save_vgic(ops: &impl SysOps, vcpu: &mut Vcpu) {
    let n = vgic_lr_count(ops, &mut vcpu.arch.vgic);
    for i in 0..n {
        vcpu.arch.vgic.lrs[i as usize] = ops.read(SysReg::IchLrEl2(i));
    }
    vcpu.arch.vgic.vmcr = ops.read(SysReg::IchVmcrEl2);
    vcpu.arch.vgic.apr = ops.read(SysReg::IchAp0r0El2);
}

fn restore_vgic(ops: &impl SysOps, vcpu: &mut Vcpu) {
    let n = vgic_lr_count(ops, &mut vcpu.arch.vgic);
    for i in 0..n {
        ops.write(SysReg::IchLrEl2(i), vcpu.arch.vgic.lrs[i as usize]);
    }
    ops.write(SysReg::IchVmcrEl2, vcpu.arch.vgic.vmcr);
    ops.write(SysReg::IchAp0r0El2, vcpu.arch.vgic.apr);
}

/// Address of the guest EL1 exception vector table. Provided by the boot
/// assembly (out of scope for this crate, per `spec.md` §1); referenced
/// here only for its address, exactly as `original_source` references
/// `guest_el1_vectors` from C. `link.ld` places the real symbol; a host
/// `cargo test` binary has no such script, so tests link against a local
/// stand-in instead.
#[cfg(not(test))]
extern "C" {
    static guest_el1_vectors: u8;
}

#[cfg(test)]
static guest_el1_vectors: u8 = 0;

/// Switches from `from` (if any, i.e. not the very first entry) to `to`,
/// in the exact order `world_switch` uses: mask interrupts, save the
/// outgoing VCPU's extended state, commit `VTTBR_EL2` then `CNTVOFF_EL2`,
/// restore the incoming VCPU's extended state in mirror order, point
/// `VBAR_EL1` at the guest vector table, then resume it. Does not return:
/// see [`SysOps::resume_vcpu`].
pub fn world_switch(ops: &impl SysOps, from: Option<&mut Vcpu>, to: &mut Vcpu) {
    ops.irq_mask();

    if let Some(from) = from {
        save_fp(ops, from);
        save_sve(ops, from);
        save_pauth(ops, from);
        save_vgic(ops, from);
    }

    ops.write(SysReg::VttbrEl2, to.arch.vttbr_el2);
    ops.isb();
    ops.write(SysReg::CntvoffEl2, to.arch.cntvoff_el2);

    restore_vgic(ops, to);
    restore_pauth(ops, &to.arch.pauth);
    restore_sve(ops, to);
    restore_fp(ops, to);

    // Safety: `guest_el1_vectors` is provided by the boot assembly and
    // never accessed through, only its address is taken.
    let vbar = unsafe { &guest_el1_vectors as *const u8 as u64 };
    ops.write(SysReg::VbarEl1, vbar);

    ops.irq_unmask();
    ops.resume_vcpu(&to.arch.tf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::cpu::vcpu::VcpuBootManifest;
    use crate::arch::aarch64::regs::mock::MockOps;

    #[test]
    fn switch_commits_vttbr_before_cntvoff_and_programs_vbar() {
        let ops = MockOps::new();
        let mut a = Vcpu::new(0, 0x1000, 0x2000, 0xaaaa, 0, VcpuBootManifest::default());
        let mut b = Vcpu::new(1, 0x3000, 0x4000, 0xbbbb, 0, VcpuBootManifest::default());
        b.arch.cntvoff_el2 = 42;

        world_switch(&ops, Some(&mut a), &mut b);

        assert_eq!(ops.vttbr_el2.get(), 0xbbbb);
        assert_eq!(ops.cntvoff_el2.get(), 42);
        assert!(a.arch.fp.used);
        assert_eq!(ops.resumed.borrow().unwrap().elr_el1, 0x3000);
        assert!(!ops.irq_masked.get());
    }

    #[test]
    fn first_switch_has_no_outgoing_vcpu_to_save() {
        let ops = MockOps::new();
        let mut b = Vcpu::new(0, 0x1000, 0x2000, 0x1, 0, VcpuBootManifest::default());
        world_switch(&ops, None, &mut b);
        assert_eq!(ops.vttbr_el2.get(), 0x1);
    }

    #[test]
    fn vgic_lr_count_is_cached_after_first_read() {
        let ops = MockOps::new();
        ops.ich_vtr_el2.set(3); // ListRegs field = 3 -> 4 list registers
        let mut v = Vcpu::new(0, 0, 0, 0, 0, VcpuBootManifest::default());
        let n = vgic_lr_count(&ops, &mut v.arch.vgic);
        assert_eq!(n, 4);
        ops.ich_vtr_el2.set(15);
        assert_eq!(vgic_lr_count(&ops, &mut v.arch.vgic), 4);
    }
}
