//! Virtual-timer sysreg emulation and the HVC #0x61 virtual-time override.
//!
//! Ported from `handle_timer_sysreg`/`handle_guest_time_override` in
//! `original_source/core/trap.c`. Every trapped access to one of these
//! encodings resolves to exactly the read/write semantics below; see
//! `spec.md` §4.6 for the round-trip laws this implements.

use super::cpu::trapframe::Trapframe;
use crate::arch::aarch64::regs::{SysOps, SysReg};
use crate::error::{Error, Result};

const fn sys_reg_encode(op0: u32, op1: u32, crn: u32, crm: u32, op2: u32) -> u32 {
    (op0 << 14) | (op1 << 10) | (crn << 6) | (crm << 2) | op2
}

pub const SYS_CNTPCT_EL0: u32 = sys_reg_encode(3, 3, 14, 0, 1);
pub const SYS_CNTVCT_EL0: u32 = sys_reg_encode(3, 3, 14, 0, 2);
pub const SYS_CNTP_TVAL_EL0: u32 = sys_reg_encode(3, 3, 14, 2, 0);
pub const SYS_CNTP_CTL_EL0: u32 = sys_reg_encode(3, 3, 14, 2, 1);
pub const SYS_CNTP_CVAL_EL0: u32 = sys_reg_encode(3, 3, 14, 2, 2);
pub const SYS_CNTV_TVAL_EL0: u32 = sys_reg_encode(3, 3, 14, 3, 0);
pub const SYS_CNTV_CTL_EL0: u32 = sys_reg_encode(3, 3, 14, 3, 1);
pub const SYS_CNTV_CVAL_EL0: u32 = sys_reg_encode(3, 3, 14, 3, 2);

/// Extracts the `op0:op1:CRn:CRm:op2` system-register encoding out of an
/// `ESR_EL2.ISS` for a `Sys64` trap (`esr_sys64_sysreg`).
pub fn esr_sys64_sysreg(esr: u64) -> u32 {
    let iss = (esr & 0x1ff_ffff) as u32;
    let op0 = (iss >> 20) & 0x3;
    let op1 = (iss >> 16) & 0xf;
    let crn = (iss >> 12) & 0xf;
    let crm = (iss >> 8) & 0xf;
    let op2 = (iss >> 5) & 0x7;
    sys_reg_encode(op0, op1, crn, crm, op2)
}

pub fn esr_sys64_rt(esr: u64) -> usize {
    (esr & 0x1f) as usize
}

pub fn esr_sys64_is_read(esr: u64) -> bool {
    (esr >> 21) & 1 != 0
}

pub fn virtual_counter_now(ops: &impl SysOps) -> u64 {
    ops.read(SysReg::CntvctEl0)
}

/// Sign-extends the low 32 bits of `raw` (a `TVAL` write value) to 64
/// bits, matching the `(int32_t)raw` cast in `original_source`.
fn sext32(raw: u64) -> i64 {
    raw as u32 as i32 as i64
}

/// `Rt` is architecturally XZR when the field is 31; a write then reads
/// as zero and a read is discarded.
fn get_rt(tf: &Trapframe, rt: usize) -> u64 {
    if rt < 31 {
        tf.regs[rt]
    } else {
        0
    }
}

fn set_rt(tf: &mut Trapframe, rt: usize, value: u64) {
    if rt < 31 {
        tf.regs[rt] = value;
    }
}

/// Emulates one trapped timer sysreg access (EC=0x18), caching the
/// emulated register's value into `tf` exactly as `original_source`
/// caches it in the trapframe. Caller advances `ELR_EL2`/`tf.elr_el1` by
/// 4 and issues an `isb` on `Ok`, per `spec.md` §4.6.
pub fn handle_timer_sysreg(ops: &impl SysOps, tf: &mut Trapframe, esr: u64) -> Result<()> {
    let reg = esr_sys64_sysreg(esr);
    let rt = esr_sys64_rt(esr);
    let is_read = esr_sys64_is_read(esr);
    let virt_now = virtual_counter_now(ops);
    let offset = ops.read(SysReg::CntvoffEl2);

    match reg {
        SYS_CNTPCT_EL0 | SYS_CNTVCT_EL0 => {
            if is_read {
                set_rt(tf, rt, virt_now);
            }
            Ok(())
        }

        SYS_CNTP_CVAL_EL0 => {
            if is_read {
                let virt_val = ops.read(SysReg::CntpCvalEl0).wrapping_add(offset);
                tf.cntp_cval_el0 = virt_val;
                set_rt(tf, rt, virt_val);
            } else {
                let virt_val = get_rt(tf, rt);
                tf.cntp_cval_el0 = virt_val;
                ops.write(SysReg::CntpCvalEl0, virt_val.wrapping_sub(offset));
            }
            Ok(())
        }

        SYS_CNTP_CTL_EL0 => {
            if is_read {
                let ctl = ops.read(SysReg::CntpCtlEl0);
                tf.cntp_ctl_el0 = ctl;
                set_rt(tf, rt, ctl);
            } else {
                let ctl = get_rt(tf, rt) & 0x3;
                tf.cntp_ctl_el0 = ctl;
                ops.write(SysReg::CntpCtlEl0, ctl);
            }
            Ok(())
        }

        SYS_CNTP_TVAL_EL0 => {
            if is_read {
                let delta = (tf.cntp_cval_el0 as i64).wrapping_sub(virt_now as i64);
                set_rt(tf, rt, delta as u64);
            } else {
                let raw = get_rt(tf, rt);
                let target = (virt_now as i64).wrapping_add(sext32(raw)) as u64;
                tf.cntp_cval_el0 = target;
                ops.write(SysReg::CntpCvalEl0, target.wrapping_sub(offset));
            }
            Ok(())
        }

        SYS_CNTV_CVAL_EL0 => {
            if is_read {
                let val = ops.read(SysReg::CntvCvalEl0);
                tf.cntv_cval_el0 = val;
                set_rt(tf, rt, val);
            } else {
                let val = get_rt(tf, rt);
                tf.cntv_cval_el0 = val;
                ops.write(SysReg::CntvCvalEl0, val);
            }
            Ok(())
        }

        SYS_CNTV_CTL_EL0 => {
            if is_read {
                let ctl = ops.read(SysReg::CntvCtlEl0);
                tf.cntv_ctl_el0 = ctl;
                set_rt(tf, rt, ctl);
            } else {
                let ctl = get_rt(tf, rt) & 0x3;
                tf.cntv_ctl_el0 = ctl;
                ops.write(SysReg::CntvCtlEl0, ctl);
            }
            Ok(())
        }

        SYS_CNTV_TVAL_EL0 => {
            if is_read {
                let val = ops.read(SysReg::CntvCvalEl0);
                tf.cntv_cval_el0 = val;
                let delta = (val as i64).wrapping_sub(virt_now as i64);
                set_rt(tf, rt, delta as u64);
            } else {
                let raw = get_rt(tf, rt);
                let target = (virt_now as i64).wrapping_add(sext32(raw)) as u64;
                tf.cntv_cval_el0 = target;
                ops.write(SysReg::CntvCvalEl0, target);
            }
            Ok(())
        }

        other => Err(Error::UnhandledSysReg(other)),
    }
}

/// Implements HVC #0x61: rebinds virtual time so the guest's next read of
/// the virtual counter returns `desired` (`x0` on entry), matching
/// `handle_guest_time_override`. Leaves the applied value in `tf.regs[0]`.
pub fn handle_guest_time_override(ops: &impl SysOps, tf: &mut Trapframe) {
    let desired = tf.regs[0];
    let phys_counter = ops.read(SysReg::CntpctEl0);
    let offset = desired.wrapping_sub(phys_counter);

    ops.write(SysReg::CntvoffEl2, offset);

    let phys_cval = tf.cntp_cval_el0.wrapping_sub(offset);
    ops.write(SysReg::CntpCvalEl0, phys_cval);
    ops.write(SysReg::CntpCtlEl0, tf.cntp_ctl_el0);
    ops.write(SysReg::CntvCvalEl0, tf.cntv_cval_el0);
    ops.write(SysReg::CntvCtlEl0, tf.cntv_ctl_el0);
    ops.isb();

    tf.regs[0] = desired;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::regs::mock::MockOps;
    use test_case::test_case;

    #[test_case(SYS_CNTPCT_EL0, 3, 3, 14, 0, 1; "cntpct_el0")]
    #[test_case(SYS_CNTVCT_EL0, 3, 3, 14, 0, 2; "cntvct_el0")]
    #[test_case(SYS_CNTP_TVAL_EL0, 3, 3, 14, 2, 0; "cntp_tval_el0")]
    #[test_case(SYS_CNTP_CTL_EL0, 3, 3, 14, 2, 1; "cntp_ctl_el0")]
    #[test_case(SYS_CNTP_CVAL_EL0, 3, 3, 14, 2, 2; "cntp_cval_el0")]
    #[test_case(SYS_CNTV_TVAL_EL0, 3, 3, 14, 3, 0; "cntv_tval_el0")]
    #[test_case(SYS_CNTV_CTL_EL0, 3, 3, 14, 3, 1; "cntv_ctl_el0")]
    #[test_case(SYS_CNTV_CVAL_EL0, 3, 3, 14, 3, 2; "cntv_cval_el0")]
    fn timer_tag_matches_its_op_field_encoding(tag: u32, op0: u32, op1: u32, crn: u32, crm: u32, op2: u32) {
        assert_eq!(tag, sys_reg_encode(op0, op1, crn, crm, op2));
    }

    /// Builds a realistic `ESR_EL2` for a `Sys64` trap targeting `reg`
    /// (one of the `SYS_*` tag constants above). The tags are packed with
    /// `sys_reg_encode`'s shifts, not the ISS's; unpack back to op fields
    /// and repack at the ISS's actual bit positions
    /// (`op0[20:19] op1[19:16] CRn[15:12] CRm[11:8] op2[7:5]`).
    fn esr_for(reg: u32, is_read: bool, rt: u32) -> u64 {
        let op2 = reg & 0x7;
        let crm = (reg >> 2) & 0xf;
        let crn = (reg >> 6) & 0xf;
        let op1 = (reg >> 10) & 0xf;
        let op0 = (reg >> 14) & 0x3;
        let iss = (op0 << 20) | (op1 << 16) | (crn << 12) | (crm << 8) | (op2 << 5) | rt;
        (iss as u64) | ((is_read as u64) << 21)
    }

    #[test]
    fn cntpct_and_cntvct_reads_return_virtual_now() {
        let ops = MockOps::new();
        ops.cntvct_el0.set(0x1000);
        let mut tf = Trapframe::default();

        let esr = esr_for(SYS_CNTPCT_EL0, true, 2);
        handle_timer_sysreg(&ops, &mut tf, esr).unwrap();
        assert_eq!(tf.regs[2], 0x1000);

        let esr = esr_for(SYS_CNTVCT_EL0, true, 3);
        handle_timer_sysreg(&ops, &mut tf, esr).unwrap();
        assert_eq!(tf.regs[3], 0x1000);
    }

    #[test]
    fn cntp_cval_round_trips_through_offset_and_caches_in_trapframe() {
        let ops = MockOps::new();
        ops.cntvoff_el2.set(100);
        let mut tf = Trapframe::default();

        tf.regs[0] = 5000;
        let write_esr = esr_for(SYS_CNTP_CVAL_EL0, false, 0);
        handle_timer_sysreg(&ops, &mut tf, write_esr).unwrap();
        assert_eq!(ops.cntp_cval_el0.get(), 4900);
        assert_eq!(tf.cntp_cval_el0, 5000);

        let read_esr = esr_for(SYS_CNTP_CVAL_EL0, true, 1);
        handle_timer_sysreg(&ops, &mut tf, read_esr).unwrap();
        assert_eq!(tf.regs[1], 5000);
    }

    #[test]
    fn cntp_ctl_write_masks_to_en_and_imask() {
        let ops = MockOps::new();
        let mut tf = Trapframe::default();
        tf.regs[0] = 0b1111;
        let write_esr = esr_for(SYS_CNTP_CTL_EL0, false, 0);
        handle_timer_sysreg(&ops, &mut tf, write_esr).unwrap();
        assert_eq!(ops.cntp_ctl_el0.get(), 0b11);
        assert_eq!(tf.cntp_ctl_el0, 0b11);
    }

    #[test]
    fn cntv_tval_write_computes_target_without_offset() {
        let ops = MockOps::new();
        ops.cntvct_el0.set(1_000);
        let mut tf = Trapframe::default();
        tf.regs[0] = 500;
        let write_esr = esr_for(SYS_CNTV_TVAL_EL0, false, 0);
        handle_timer_sysreg(&ops, &mut tf, write_esr).unwrap();
        assert_eq!(ops.cntv_cval_el0.get(), 1_500);
        assert_eq!(tf.cntv_cval_el0, 1_500);
    }

    #[test]
    fn cntv_tval_read_is_signed_difference() {
        let ops = MockOps::new();
        ops.cntvct_el0.set(1_000);
        ops.cntv_cval_el0.set(900);
        let mut tf = Trapframe::default();
        let read_esr = esr_for(SYS_CNTV_TVAL_EL0, true, 0);
        handle_timer_sysreg(&ops, &mut tf, read_esr).unwrap();
        assert_eq!(tf.regs[0] as u32 as i32, -100);
    }

    #[test]
    fn writing_to_xzr_rt_field_is_discarded() {
        let ops = MockOps::new();
        ops.cntvct_el0.set(0x2000);
        let mut tf = Trapframe::default();
        let esr = esr_for(SYS_CNTVCT_EL0, true, 31);
        handle_timer_sysreg(&ops, &mut tf, esr).unwrap();
        assert_eq!(tf.regs, [0u64; 31]);
    }

    #[test]
    fn time_override_rebinds_virtual_clock_and_returns_in_x0() {
        let ops = MockOps::new();
        ops.cntpct_el0.set(10_000);
        let mut tf = Trapframe::default();
        tf.regs[0] = 50_000;
        tf.cntp_cval_el0 = 60_000;

        handle_guest_time_override(&ops, &mut tf);

        assert_eq!(tf.regs[0], 50_000);
        assert_eq!(ops.cntvoff_el2.get(), 40_000);
        assert_eq!(ops.cntp_cval_el0.get(), 20_000);
    }

    #[test]
    fn unknown_encoding_is_reported_not_silently_ignored() {
        let ops = MockOps::new();
        let mut tf = Trapframe::default();
        let tag = sys_reg_encode(3, 3, 14, 5, 5);
        let esr = esr_for(tag, true, 0);
        assert_eq!(handle_timer_sysreg(&ops, &mut tf, esr), Err(Error::UnhandledSysReg(tag)));
    }
}
