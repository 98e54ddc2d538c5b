//! Typed access to the EL2 system registers and barrier instructions this
//! hypervisor touches.
//!
//! Per `spec.md` §9's rewrite guidance, every raw `mrs`/`msr`/barrier
//! instruction in the crate lives behind the [`SysOps`] trait. The
//! hardware implementation ([`Hw`]) is a thin `asm!` wrapper; everything
//! above this line (table builders, VCPU construction, world switch, trap
//! dispatch, timer emulation) is generic over `SysOps` and is exercised in
//! `cargo test` against [`MockOps`] instead.

/// A named system register this hypervisor reads or writes. Kept as a flat
/// enum rather than one method per register — the set is large and every
/// access already goes through a single decode/dispatch point in the trap
/// handler and the MMU builders, so a tag type costs nothing and keeps
/// [`SysOps`] a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysReg {
    TtbrElx,
    TcrEl2,
    MairEl2,
    SctlrEl2,
    VttbrEl2,
    VtcrEl2,
    CntvoffEl2,
    HcrEl2,
    EsrEl2,
    ElrEl2,
    SpsrEl2,
    FarEl2,
    HpfarEl2,
    VbarEl1,
    IdAa64Mmfr1El1,
    CntpctEl0,
    CntvctEl0,
    CntpCtlEl0,
    CntpCvalEl0,
    CntvCtlEl0,
    CntvCvalEl0,
    IchVtrEl2,
    IchVmcrEl2,
    IchAp0r0El2,
    /// `ICH_LR<n>_EL2`, `n` in `0..MAX_VGIC_LIST_REGS`.
    IchLrEl2(u8),
}

/// Everything this crate needs from the CPU beyond named register
/// get/set: barriers, interrupt masking and the halt instruction.
pub trait SysOps {
    fn read(&self, reg: SysReg) -> u64;
    fn write(&self, reg: SysReg, value: u64);

    /// `msr sp_el1, {x}`. Not a readable register from EL2, hence not
    /// folded into [`SysReg`].
    fn write_sp_el1(&self, value: u64);

    fn dsb_ishst(&self);
    fn dsb_ish(&self);
    fn isb(&self);
    fn tlbi_vmalls12e1is(&self);

    /// `msr daifset, #2` + `isb`.
    fn irq_mask(&self);
    /// `msr daifclr, #2` + `isb`.
    fn irq_unmask(&self);

    fn wfi(&self);

    /// Saves the 32 SIMD/FP registers into `out` (two `u64` lanes each).
    fn save_fp_regs(&self, out: &mut [[u64; 2]; 32]);
    fn restore_fp_regs(&self, input: &[[u64; 2]; 32]);

    /// Branches to EL1 at `pc` with `sp_el1` already programmed. Does not
    /// return to the caller in the same sense a normal function does: the
    /// next thing that happens on the hardware path is an `eret`, and
    /// control resumes in this module only via a subsequent trap.
    fn enter_el1_at(&self, pc: u64, sp: u64);

    /// Restores a VCPU's full GPR/`ELR_EL1`/`SPSR_EL1`/`SP_EL1` state and
    /// erets (`vcpu_switch_asm` in `original_source`). Like
    /// [`enter_el1_at`](SysOps::enter_el1_at), this is the non-returning
    /// tail of `world_switch`: control resumes in EL2 only via the next
    /// trap, not by this call returning.
    fn resume_vcpu(&self, tf: &crate::arch::aarch64::cpu::trapframe::Trapframe);
}

#[cfg(all(target_arch = "aarch64", not(test)))]
mod hw {
    use super::{SysOps, SysReg};
    use core::arch::asm;

    pub struct Hw;

    macro_rules! mrs {
        ($name:literal) => {{
            let v: u64;
            unsafe { asm!(concat!("mrs {}, ", $name), out(reg) v, options(nomem, nostack)) };
            v
        }};
    }

    macro_rules! msr {
        ($name:literal, $v:expr) => {
            unsafe { asm!(concat!("msr ", $name, ", {}"), in(reg) $v, options(nomem, nostack)) }
        };
    }

    impl SysOps for Hw {
        fn read(&self, reg: SysReg) -> u64 {
            match reg {
                SysReg::TtbrElx => mrs!("ttbr0_el2"),
                SysReg::TcrEl2 => mrs!("tcr_el2"),
                SysReg::MairEl2 => mrs!("mair_el2"),
                SysReg::SctlrEl2 => mrs!("sctlr_el2"),
                SysReg::VttbrEl2 => mrs!("vttbr_el2"),
                SysReg::VtcrEl2 => mrs!("vtcr_el2"),
                SysReg::CntvoffEl2 => mrs!("cntvoff_el2"),
                SysReg::HcrEl2 => mrs!("hcr_el2"),
                SysReg::EsrEl2 => mrs!("esr_el2"),
                SysReg::ElrEl2 => mrs!("elr_el2"),
                SysReg::SpsrEl2 => mrs!("spsr_el2"),
                SysReg::FarEl2 => mrs!("far_el2"),
                SysReg::HpfarEl2 => mrs!("hpfar_el2"),
                SysReg::VbarEl1 => mrs!("vbar_el1"),
                SysReg::IdAa64Mmfr1El1 => mrs!("id_aa64mmfr1_el1"),
                SysReg::CntpctEl0 => mrs!("cntpct_el0"),
                SysReg::CntvctEl0 => mrs!("cntvct_el0"),
                SysReg::CntpCtlEl0 => mrs!("cntp_ctl_el0"),
                SysReg::CntpCvalEl0 => mrs!("cntp_cval_el0"),
                SysReg::CntvCtlEl0 => mrs!("cntv_ctl_el0"),
                SysReg::CntvCvalEl0 => mrs!("cntv_cval_el0"),
                // ICH_* are op0=3,op1=4,CRn=12 system instructions with no
                // assembler mnemonic; encode as `S3_4_C12_C<crm>_<op2>`.
                SysReg::IchVtrEl2 => mrs!("S3_4_C12_C11_1"),
                SysReg::IchVmcrEl2 => mrs!("S3_4_C12_C11_7"),
                SysReg::IchAp0r0El2 => mrs!("S3_4_C12_C8_0"),
                SysReg::IchLrEl2(n) => read_lr(n),
            }
        }

        fn write(&self, reg: SysReg, value: u64) {
            match reg {
                SysReg::TtbrElx => msr!("ttbr0_el2", value),
                SysReg::TcrEl2 => msr!("tcr_el2", value),
                SysReg::MairEl2 => msr!("mair_el2", value),
                SysReg::SctlrEl2 => msr!("sctlr_el2", value),
                SysReg::VttbrEl2 => msr!("vttbr_el2", value),
                SysReg::VtcrEl2 => msr!("vtcr_el2", value),
                SysReg::CntvoffEl2 => msr!("cntvoff_el2", value),
                SysReg::HcrEl2 => msr!("hcr_el2", value),
                SysReg::ElrEl2 => msr!("elr_el2", value),
                SysReg::SpsrEl2 => msr!("spsr_el2", value),
                SysReg::VbarEl1 => msr!("vbar_el1", value),
                SysReg::CntpCtlEl0 => msr!("cntp_ctl_el0", value),
                SysReg::CntpCvalEl0 => msr!("cntp_cval_el0", value),
                SysReg::CntvCtlEl0 => msr!("cntv_ctl_el0", value),
                SysReg::CntvCvalEl0 => msr!("cntv_cval_el0", value),
                SysReg::IchVmcrEl2 => msr!("S3_4_C12_C11_7", value),
                SysReg::IchAp0r0El2 => msr!("S3_4_C12_C8_0", value),
                SysReg::IchLrEl2(n) => write_lr(n, value),
                SysReg::EsrEl2
                | SysReg::FarEl2
                | SysReg::HpfarEl2
                | SysReg::IdAa64Mmfr1El1
                | SysReg::CntpctEl0
                | SysReg::CntvctEl0
                | SysReg::IchVtrEl2 => {
                    debug_assert!(false, "{reg:?} is not writable");
                }
            }
        }

        fn write_sp_el1(&self, value: u64) {
            msr!("sp_el1", value);
        }

        fn dsb_ishst(&self) {
            unsafe { asm!("dsb ishst", options(nostack)) };
        }

        fn dsb_ish(&self) {
            unsafe { asm!("dsb ish", options(nostack)) };
        }

        fn isb(&self) {
            unsafe { asm!("isb", options(nostack)) };
        }

        fn tlbi_vmalls12e1is(&self) {
            unsafe { asm!("tlbi vmalls12e1is", options(nostack)) };
        }

        fn irq_mask(&self) {
            unsafe { asm!("msr daifset, #2", "isb", options(nostack)) };
        }

        fn irq_unmask(&self) {
            unsafe { asm!("msr daifclr, #2", "isb", options(nostack)) };
        }

        fn wfi(&self) {
            unsafe { asm!("wfi", options(nomem, nostack)) };
        }

        fn save_fp_regs(&self, out: &mut [[u64; 2]; 32]) {
            let p = out.as_mut_ptr();
            unsafe {
                asm!(
                    "stp q0,  q1,  [{p}, #0x000]", "stp q2,  q3,  [{p}, #0x020]",
                    "stp q4,  q5,  [{p}, #0x040]", "stp q6,  q7,  [{p}, #0x060]",
                    "stp q8,  q9,  [{p}, #0x080]", "stp q10, q11, [{p}, #0x0a0]",
                    "stp q12, q13, [{p}, #0x0c0]", "stp q14, q15, [{p}, #0x0e0]",
                    "stp q16, q17, [{p}, #0x100]", "stp q18, q19, [{p}, #0x120]",
                    "stp q20, q21, [{p}, #0x140]", "stp q22, q23, [{p}, #0x160]",
                    "stp q24, q25, [{p}, #0x180]", "stp q26, q27, [{p}, #0x1a0]",
                    "stp q28, q29, [{p}, #0x1c0]", "stp q30, q31, [{p}, #0x1e0]",
                    p = in(reg) p,
                    options(nostack),
                );
            }
        }

        fn restore_fp_regs(&self, input: &[[u64; 2]; 32]) {
            let p = input.as_ptr();
            unsafe {
                asm!(
                    "ldp q0,  q1,  [{p}, #0x000]", "ldp q2,  q3,  [{p}, #0x020]",
                    "ldp q4,  q5,  [{p}, #0x040]", "ldp q6,  q7,  [{p}, #0x060]",
                    "ldp q8,  q9,  [{p}, #0x080]", "ldp q10, q11, [{p}, #0x0a0]",
                    "ldp q12, q13, [{p}, #0x0c0]", "ldp q14, q15, [{p}, #0x0e0]",
                    "ldp q16, q17, [{p}, #0x100]", "ldp q18, q19, [{p}, #0x120]",
                    "ldp q20, q21, [{p}, #0x140]", "ldp q22, q23, [{p}, #0x160]",
                    "ldp q24, q25, [{p}, #0x180]", "ldp q26, q27, [{p}, #0x1a0]",
                    "ldp q28, q29, [{p}, #0x1c0]", "ldp q30, q31, [{p}, #0x1e0]",
                    p = in(reg) p,
                    options(nostack),
                );
            }
        }

        fn enter_el1_at(&self, pc: u64, sp: u64) {
            const SPSR_EL1H_MASKED: u64 = 0x5 | (0xf << 6);
            self.write_sp_el1(sp);
            msr!("spsr_el2", SPSR_EL1H_MASKED);
            msr!("elr_el2", pc);
            unsafe { asm!("isb", "eret", options(noreturn)) };
        }

        fn resume_vcpu(&self, tf: &crate::arch::aarch64::cpu::trapframe::Trapframe) {
            self.write_sp_el1(tf.sp_el1);
            msr!("elr_el2", tf.elr_el1);
            msr!("spsr_el2", tf.spsr_el1);
            let p = tf.regs.as_ptr();
            // x30 carries the trapframe pointer through the whole load
            // sequence since every other GPR gets overwritten by it; the
            // final `ldr x30` clobbers the pointer itself, which is safe
            // because nothing after it needs the trapframe again.
            unsafe {
                asm!(
                    "ldp x0,  x1,  [x30, #0x000]", "ldp x2,  x3,  [x30, #0x010]",
                    "ldp x4,  x5,  [x30, #0x020]", "ldp x6,  x7,  [x30, #0x030]",
                    "ldp x8,  x9,  [x30, #0x040]", "ldp x10, x11, [x30, #0x050]",
                    "ldp x12, x13, [x30, #0x060]", "ldp x14, x15, [x30, #0x070]",
                    "ldp x16, x17, [x30, #0x080]", "ldp x18, x19, [x30, #0x090]",
                    "ldp x20, x21, [x30, #0x0a0]", "ldp x22, x23, [x30, #0x0b0]",
                    "ldp x24, x25, [x30, #0x0c0]", "ldp x26, x27, [x30, #0x0d0]",
                    "ldp x28, x29, [x30, #0x0e0]", "ldr x30,      [x30, #0x0f0]",
                    "isb",
                    "eret",
                    in("x30") p,
                    options(noreturn),
                );
            }
        }
    }

    fn read_lr(n: u8) -> u64 {
        match n {
            0 => mrs!("S3_4_C12_C12_0"),
            1 => mrs!("S3_4_C12_C12_1"),
            2 => mrs!("S3_4_C12_C12_2"),
            3 => mrs!("S3_4_C12_C12_3"),
            4 => mrs!("S3_4_C12_C12_4"),
            5 => mrs!("S3_4_C12_C12_5"),
            6 => mrs!("S3_4_C12_C12_6"),
            7 => mrs!("S3_4_C12_C12_7"),
            8 => mrs!("S3_4_C12_C13_0"),
            9 => mrs!("S3_4_C12_C13_1"),
            10 => mrs!("S3_4_C12_C13_2"),
            11 => mrs!("S3_4_C12_C13_3"),
            12 => mrs!("S3_4_C12_C13_4"),
            13 => mrs!("S3_4_C12_C13_5"),
            14 => mrs!("S3_4_C12_C13_6"),
            15 => mrs!("S3_4_C12_C13_7"),
            _ => unreachable!("ICH_LR index out of range"),
        }
    }

    fn write_lr(n: u8, value: u64) {
        match n {
            0 => msr!("S3_4_C12_C12_0", value),
            1 => msr!("S3_4_C12_C12_1", value),
            2 => msr!("S3_4_C12_C12_2", value),
            3 => msr!("S3_4_C12_C12_3", value),
            4 => msr!("S3_4_C12_C12_4", value),
            5 => msr!("S3_4_C12_C12_5", value),
            6 => msr!("S3_4_C12_C12_6", value),
            7 => msr!("S3_4_C12_C12_7", value),
            8 => msr!("S3_4_C12_C13_0", value),
            9 => msr!("S3_4_C12_C13_1", value),
            10 => msr!("S3_4_C12_C13_2", value),
            11 => msr!("S3_4_C12_C13_3", value),
            12 => msr!("S3_4_C12_C13_4", value),
            13 => msr!("S3_4_C12_C13_5", value),
            14 => msr!("S3_4_C12_C13_6", value),
            15 => msr!("S3_4_C12_C13_7", value),
            _ => unreachable!("ICH_LR index out of range"),
        }
    }
}

#[cfg(all(target_arch = "aarch64", not(test)))]
pub use hw::Hw;
