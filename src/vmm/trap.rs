//! EL2 exception dispatch (`el2_exception_common` in
//! `original_source/core/trap.c`). The assembly vector table and register
//! save/restore stub that call into this are out of scope; this module
//! begins at the point where `esr`/`elr`/`spsr`/`far` have already been
//! read out and the current VCPU's trapframe already holds the trapped
//! GPR state.

use crate::arch::aarch64::cpu::vcpu::Vcpu;
use crate::arch::aarch64::mmu::stage2::Stage2Tables;
use crate::arch::aarch64::regs::{SysOps, SysReg};
use crate::arch::aarch64::timer;
use crate::console;
use crate::vmm::hypercall::{self, HypercallOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Resume the current VCPU.
    Handled,
    /// The current VCPU asked to yield (WFI/WFE, or a future hypercall).
    Yield,
    /// A diagnostic has been printed; the caller must halt (wfi loop).
    Fatal,
}

fn exception_class(esr: u64) -> u64 {
    (esr >> 26) & 0x3f
}

fn advance_elr(ops: &impl SysOps, vcpu: &mut Vcpu, elr: u64) {
    let next = elr + 4;
    ops.write(SysReg::ElrEl2, next);
    vcpu.arch.tf.elr_el1 = next;
}

/// Dispatches one EL2 exception for `vcpu`. `code` is whatever
/// discriminator the (out-of-scope) vector stub passes through; it is only
/// ever printed, matching `el2_exception_common`'s unused `code` parameter.
pub fn dispatch(
    ops: &impl SysOps,
    stage2: &Stage2Tables,
    vcpu: &mut Vcpu,
    esr: u64,
    elr: u64,
    spsr: u64,
    far: u64,
    code: u64,
) -> TrapOutcome {
    let ec = exception_class(esr);

    match ec {
        0x01 => {
            console::puts("EL2: WFI/WFE from guest detected, yielding...\n");
            advance_elr(ops, vcpu, elr);
            vcpu.request_yield = true;
            TrapOutcome::Yield
        }

        0x16 => {
            let imm16 = (esr & 0xffff) as u16;
            match hypercall::dispatch(ops, vcpu, imm16) {
                Some(HypercallOutcome::Handled) => TrapOutcome::Handled,
                Some(HypercallOutcome::Fatal) => TrapOutcome::Fatal,
                None => {
                    dump_exception(ops, stage2, esr, elr, spsr, far, code);
                    TrapOutcome::Fatal
                }
            }
        }

        0x18 => match timer::handle_timer_sysreg(ops, &mut vcpu.arch.tf, esr) {
            Ok(()) => {
                advance_elr(ops, vcpu, elr);
                ops.isb();
                TrapOutcome::Handled
            }
            Err(_) => {
                dump_exception(ops, stage2, esr, elr, spsr, far, code);
                TrapOutcome::Fatal
            }
        },

        _ => {
            dump_exception(ops, stage2, esr, elr, spsr, far, code);
            TrapOutcome::Fatal
        }
    }
}

/// Prints the `=== EL2 Exception ===` banner and, for an abort EC, the
/// Stage-2 ISS/L1-descriptor decode. Never returns early: every line in
/// `el2_exception_common`'s fallback path is reproduced verbatim.
fn dump_exception(
    ops: &impl SysOps,
    stage2: &Stage2Tables,
    esr: u64,
    elr: u64,
    spsr: u64,
    far: u64,
    code: u64,
) {
    console::puts("\n=== EL2 Exception ===\n");
    console::puts("ESR: ");
    console::hex64(esr);
    console::puts("\n");
    console::puts("ELR: ");
    console::hex64(elr);
    console::puts("\n");
    console::puts("SPSR: ");
    console::hex64(spsr);
    console::puts("\n");
    console::puts("FAR: ");
    console::hex64(far);
    console::puts("\n");
    console::puts("Code: ");
    console::hex64(code);
    console::puts("\n");
    console::puts("====================\n");

    let ec = exception_class(esr);
    console::puts("Exception Class (EC): ");
    console::hex64(ec);
    console::puts("\n");

    if matches!(ec, 0x20 | 0x21 | 0x24 | 0x25) {
        match ec {
            0x20 => console::puts("Instruction Abort from lower EL detected.\n"),
            0x21 => console::puts("Instruction Abort from same EL detected.\n"),
            0x24 => console::puts("Data Abort from lower EL detected.\n"),
            0x25 => console::puts("Data Abort from same EL detected.\n"),
            _ => unreachable!(),
        }

        let vtcr = ops.read(SysReg::VtcrEl2);
        let vttbr = ops.read(SysReg::VttbrEl2);
        let hpfar = ops.read(SysReg::HpfarEl2);
        console::puts("VTTBR_EL2: ");
        console::hex64(vttbr);
        console::puts("\n");
        console::puts("VTCR_EL2 : ");
        console::hex64(vtcr);
        console::puts("\n");
        console::puts("HPFAR_EL2 : ");
        console::hex64(hpfar);
        console::puts("\n");

        let iss = esr & 0xff_ffff;
        let ifsc = iss & 0x3f;
        console::puts("ISS: ");
        console::hex64(iss);
        console::puts("\n");
        console::puts("  IFSC: ");
        console::hex64(ifsc);
        console::puts("\n");
        if matches!(ifsc, 0x4 | 0x5 | 0x6) {
            console::puts("  LVL: ");
            console::hex64(ifsc - 0x4);
            console::puts("\n");
        }
        let fnv = (iss >> 10) & 1;
        let ea = (iss >> 9) & 1;
        let s1ptw = (iss >> 7) & 1;
        console::puts("  S1PTW: ");
        console::hex64(s1ptw);
        console::puts("\n");
        console::puts("  FnV: ");
        console::hex64(fnv);
        console::puts("\n");
        console::puts("  EA: ");
        console::hex64(ea);
        console::puts("\n");

        let ipa_index = (far >> 30) & 0x1ff;
        console::puts("S2 L1 idx for FAR: ");
        console::hex64(ipa_index);
        console::puts("\n");
        let entry = stage2.l1_descriptor(far);
        console::puts("S2 L1 entry value : ");
        console::hex64(entry);
        console::puts("\n");
        if entry & 0x1 == 0 {
            console::puts("S2 L1 entry NOT VALID -> translation fault\n");
        } else {
            console::puts("S2 L1 entry valid.\n");
        }
    }
}
