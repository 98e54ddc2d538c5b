//! HVC dispatch (EC=0x16). Ported from `handle_guest_hvc` and its three
//! callees in `original_source/core/trap.c`.

use crate::arch::aarch64::cpu::vcpu::Vcpu;
use crate::arch::aarch64::regs::{SysOps, SysReg};
use crate::arch::aarch64::timer;
use crate::console;
use crate::guest_api::{GuestTaskResult, HVC_FATAL, HVC_SET_VIRTUAL_TIME, HVC_TASK_REPORT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HypercallOutcome {
    /// Handled; the guest resumes at the instruction after the `hvc`.
    Handled,
    /// HVC #0x63: diagnostic has been printed, the caller must halt.
    Fatal,
}

/// Returns `None` for an immediate this crate does not dispatch on, so the
/// caller can fall through to the generic diagnostic dump.
pub fn dispatch(ops: &impl SysOps, vcpu: &mut Vcpu, imm16: u16) -> Option<HypercallOutcome> {
    match imm16 {
        HVC_TASK_REPORT => {
            task_report(vcpu);
            Some(HypercallOutcome::Handled)
        }
        HVC_SET_VIRTUAL_TIME => {
            set_virtual_time(ops, vcpu);
            Some(HypercallOutcome::Handled)
        }
        HVC_FATAL => {
            fatal(vcpu);
            Some(HypercallOutcome::Fatal)
        }
        _ => None,
    }
}

/// HVC #0x60: x1 holds a guest pointer to a [`GuestTaskResult`]. A null
/// pointer is "handled, ignore" (`handle_guest_task_report`).
fn task_report(vcpu: &Vcpu) {
    let ptr = vcpu.arch.tf.regs[1];
    if ptr == 0 {
        return;
    }
    // Safety: `ptr` is guest-supplied and trusted at this boundary, exactly
    // as `original_source` casts it without validation. The guest's own
    // Stage-2 mapping is what makes this dereference safe in practice.
    let res = unsafe { &*(ptr as *const GuestTaskResult) };

    console::puts("[guest");
    let digit = [b'0' + (vcpu.vcpu_id as u8 % 10)];
    console::puts(core::str::from_utf8(&digit).unwrap());
    console::puts("] ");
    console::puts(res.desc_str());
    console::puts(" data0=");
    console::hex64(res.data0);
    console::puts(" data1=");
    console::hex64(res.data1);
    console::puts("\n");

    if res.has_timer_telemetry() {
        console::puts("  timers: before=");
        console::hex64(res.time_before);
        console::puts(" after=");
        console::hex64(res.time_after);
        console::puts(" target=");
        console::hex64(res.time_target);
        console::puts(" memwalk_time=");
        console::hex64(res.memwalk_time);
        console::puts("\n");
    }
}

/// HVC #0x61: delegates to the timer model, then mirrors the result back
/// into the VCPU's cached `cntvoff_el2`/`cntvct_el0`.
fn set_virtual_time(ops: &impl SysOps, vcpu: &mut Vcpu) {
    timer::handle_guest_time_override(ops, &mut vcpu.arch.tf);
    vcpu.arch.cntvoff_el2 = ops.read(SysReg::CntvoffEl2);
    vcpu.arch.cntvct_el0 = vcpu.arch.tf.regs[0];
}

/// HVC #0x63: x0/x1 carry the guest's own ESR_EL1/ELR_EL1. Caller halts
/// after this returns.
fn fatal(vcpu: &Vcpu) {
    console::puts("EL2: guest synchronous exception report\n");
    console::puts("  guest ESR_EL1: ");
    console::hex64(vcpu.arch.tf.regs[0]);
    console::puts("\n");
    console::puts("  guest ELR_EL1: ");
    console::hex64(vcpu.arch.tf.regs[1]);
    console::puts("\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::cpu::vcpu::VcpuBootManifest;
    use crate::arch::aarch64::regs::mock::MockOps;

    fn vcpu() -> Vcpu {
        Vcpu::new(2, 0x1000, 0x2000, 0x3000, 0, VcpuBootManifest::default())
    }

    #[test]
    fn null_task_report_pointer_is_handled_and_ignored() {
        let ops = MockOps::new();
        let mut v = vcpu();
        v.arch.tf.regs[1] = 0;
        assert_eq!(dispatch(&ops, &mut v, HVC_TASK_REPORT), Some(HypercallOutcome::Handled));
    }

    #[test]
    fn task_report_reads_struct_through_guest_pointer() {
        let ops = MockOps::new();
        let mut v = vcpu();
        let mut desc = [0u8; 32];
        desc[..3].copy_from_slice(b"ctr");
        let res = GuestTaskResult {
            id: 1,
            desc,
            data0: 0xaa,
            data1: 0xbb,
            time_before: 0,
            time_after: 0,
            time_target: 0,
            memwalk_time: 0,
        };
        v.arch.tf.regs[1] = &res as *const GuestTaskResult as u64;
        assert_eq!(dispatch(&ops, &mut v, HVC_TASK_REPORT), Some(HypercallOutcome::Handled));
    }

    #[test]
    fn set_virtual_time_updates_cached_vcpu_fields() {
        let ops = MockOps::new();
        ops.cntpct_el0.set(1_000);
        let mut v = vcpu();
        v.arch.tf.regs[0] = 9_000;
        dispatch(&ops, &mut v, HVC_SET_VIRTUAL_TIME);
        assert_eq!(v.arch.cntvoff_el2, 8_000);
        assert_eq!(v.arch.cntvct_el0, 9_000);
        assert_eq!(v.arch.tf.regs[0], 9_000);
    }

    #[test]
    fn fatal_reports_outcome_fatal() {
        let ops = MockOps::new();
        let mut v = vcpu();
        v.arch.tf.regs[0] = 0xdead;
        v.arch.tf.regs[1] = 0xbeef;
        assert_eq!(dispatch(&ops, &mut v, HVC_FATAL), Some(HypercallOutcome::Fatal));
    }

    #[test]
    fn unknown_immediate_falls_through() {
        let ops = MockOps::new();
        let mut v = vcpu();
        assert_eq!(dispatch(&ops, &mut v, 0x1234), None);
    }
}
