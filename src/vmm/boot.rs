//! Image bring-up: the Rust-reachable part of `el2_main` in
//! `original_source/core/main.c`. The vector table, stack switch and
//! initial `CurrentEL` check that get here are boot assembly and out of
//! scope; this module starts at "BSS is about to be cleared" and ends with
//! two VCPUs registered and ready for [`vmm::scheduler::Scheduler::run`].
//!
//! Guest entry points are passed in rather than named directly: the
//! reference guest mini-kernels under `demos/` are illustration, not part
//! of this crate's build (`SPEC_FULL.md` §B), so a real image links them
//! separately and hands their addresses to [`build`].

use crate::arch::aarch64::cpu::vcpu::{Vcpu, VcpuBootManifest};
use crate::arch::aarch64::mmu::stage1::{PageAttrs, Stage1Tables};
use crate::arch::aarch64::mmu::stage2::Stage2Tables;
use crate::arch::aarch64::regs::{SysOps, SysReg};
use crate::config::S2_VM_GUARD_BYTES;
use crate::console;
use crate::platform;
use crate::vmm::scheduler::Scheduler;

/// Zeroes `.bss` by hand, matching `bss_clear` in `original_source`. Most
/// bare-metal entry sequences leave this to the boot assembly; it is kept
/// here, explicitly, because `original_source` performs it from C and
/// `spec.md`'s module boundary draws the line at the vector table, not at
/// this step.
fn bss_clear() {
    let bss = platform::bss();
    let mut p = bss.start;
    while p < bss.end {
        unsafe { core::ptr::write_volatile(p as *mut u8, 0) };
        p += 1;
    }
}

/// Identity-maps the whole of guest RAM Normal WB, RW, non-exec, so that
/// EL2's own Stage-1 covers addresses [`diagnostics::dump_shared_region`]
/// reads directly. Stage-2 translation only applies to EL1/EL0 accesses
/// gated by `HCR_EL2.VM`; it has no effect on EL2's own loads and stores,
/// which always go through Stage-1 alone, so this broad window is the only
/// way such a read is valid. `original_source/core/main.c` never maps this;
/// it is the one piece of `el2_main`'s boot sequence added beyond a literal
/// transcription of it (`SPEC_FULL.md` §B).
fn map_guest_ram_identity(stage1: &mut Stage1Tables) {
    stage1
        .map_range(platform::RAM_BASE, platform::RAM_BASE, platform::RAM_SIZE, PageAttrs::normal_rw())
        .unwrap();
}

/// Narrows the hypervisor's own five image sections plus UART0 on top of
/// the broad RAM window, matching the `el2_map_range` call sequence in
/// `original_source/core/main.c`. Remapping an already-mapped page is
/// explicitly allowed (`spec.md` §4.1), so this only changes the
/// permissions of pages [`map_guest_ram_identity`] already mapped.
fn map_hypervisor_sections(stage1: &mut Stage1Tables) {
    let text = platform::text();
    stage1.map_range(text.start, text.start, text.size(), PageAttrs::normal_ro_exec()).unwrap();

    let rodata = platform::rodata();
    stage1.map_range(rodata.start, rodata.start, rodata.size(), PageAttrs::normal_ro()).unwrap();

    let data = platform::data();
    stage1.map_range(data.start, data.start, data.size(), PageAttrs::normal_rw()).unwrap();

    let bss = platform::bss();
    stage1.map_range(bss.start, bss.start, bss.size(), PageAttrs::normal_rw()).unwrap();

    let stack = platform::stack();
    stage1.map_range(stack.start, stack.start, stack.size(), PageAttrs::normal_rw()).unwrap();

    stage1
        .map_range(platform::UART0_BASE, platform::UART0_BASE, platform::UART0_SIZE, PageAttrs::device_rw())
        .unwrap();
}

pub struct BootOutput {
    pub stage1: Stage1Tables,
    pub stage2: Stage2Tables,
    pub scheduler: Scheduler,
}

/// Builds both translation regimes, enables both MMUs, and registers the
/// two reference VCPUs at `guest_entries[i]` running on
/// `platform::GUEST_STACK_TOP[i]`. Does not dispatch: the caller runs
/// `out.scheduler.run(ops)` once ready.
pub fn build(ops: &impl SysOps, guest_entries: [u64; 2]) -> BootOutput {
    bss_clear();
    // Safety: called once, before any other code touches the UART.
    unsafe { console::init(platform::UART0_BASE) };
    console::puts("EL2: Hello from EL2!\n");

    let mut stage1 = Stage1Tables::new();
    stage1.init();
    map_guest_ram_identity(&mut stage1);
    map_hypervisor_sections(&mut stage1);
    stage1.enable(ops);
    console::puts("EL2: Stage-1 MMU enabled.\n");

    let mut stage2 = Stage2Tables::new();
    stage2
        .build_tables_identity(
            platform::RAM_BASE,
            platform::RAM_BASE,
            platform::RAM_SIZE,
            1,
            S2_VM_GUARD_BYTES,
            true,
            true,
            true,
        )
        .unwrap();
    console::puts("EL2: Stage-2 tables built.\n");

    let vttbr = stage2.program_regs_and_enable(ops);
    console::puts("EL2: Stage-2 MMU enabled.\n");

    let cntvct_now = ops.read(SysReg::CntvctEl0);
    let mut scheduler = Scheduler::new();
    for (id, &entry) in guest_entries.iter().enumerate() {
        let vcpu = Vcpu::new(
            id as u32,
            entry,
            platform::GUEST_STACK_TOP[id],
            vttbr,
            cntvct_now,
            VcpuBootManifest::default(),
        );
        scheduler.register(vcpu).unwrap();
    }

    console::puts("EL2: Launching initial VCPU...\n");
    BootOutput { stage1, stage2, scheduler }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::regs::mock::MockOps;

    #[test]
    fn build_enables_both_mmus_and_registers_two_vcpus() {
        let ops = MockOps::new();
        let out = build(&ops, [0x4008_0000, 0x400a_0000]);

        assert_eq!(ops.sctlr_el2.get() & ((1 << 0) | (1 << 2) | (1 << 12)), (1 << 0) | (1 << 2) | (1 << 12));
        const HCR_BITS: u64 = (1 << 0) | (1 << 3) | (1 << 4) | (1 << 5) | (1 << 13) | (1 << 14) | (1 << 19) | (1 << 31);
        assert_eq!(ops.hcr_el2.get() & HCR_BITS, HCR_BITS);

        assert_eq!(out.scheduler.len(), 2);
        assert_eq!(out.scheduler.current().unwrap().vcpu_id, 0);
    }
}
