//! Stage-2 (guest-physical → host-physical) translation tables.
//!
//! Ported from `original_source/core/s2_mmu.c`. `build_tables_identity`
//! keeps its general `vm_count`-guarded-windows shape so the module-level
//! invariant "an access into a window's guard faults" (`spec.md` §8,
//! invariant 3 / scenario 6) is directly testable here; the boot path in
//! `vmm::boot` calls it with `vm_count = 1` to match
//! `original_source/core/main.c` — see `SPEC_FULL.md` §C.4 for why.

use super::attrs::{mair_value, NORMAL_WB};
use super::table::TableArena;
use crate::arch::aarch64::regs::{SysOps, SysReg};
use crate::config::{S2_MAX_L2_TABLES, S2_MAX_L3_TABLES, IPA_BITS, VMID};
use crate::error::Result;

const PAGE_SIZE: u64 = 0x1000;
const L1_SHIFT: u32 = 30;
const L2_SHIFT: u32 = 21;
const L3_SHIFT: u32 = 12;
const LVL_INDEX_MASK: u64 = 0x1ff;
const PA_48_MASK: u64 = (1u64 << 48) - 1;

const S2_DESC_VALID: u64 = 1 << 0;
const S2_TABLE: u64 = 0b11;
const S2_PAGE: u64 = 0b11;
const S2_AF: u64 = 1 << 10;
const S2_SH_INNER: u64 = 0b11 << 8;
const S2AP_R: u64 = 1 << 6;
const S2AP_W: u64 = 1 << 7;
const S2_XN: u64 = 1u64 << 54;

fn s2_memattr(idx: u8) -> u64 {
    (idx as u64 & 0x7) << 2
}

pub struct Stage2Tables {
    l1: TableArena<1>,
    l2: TableArena<S2_MAX_L2_TABLES>,
    l3: TableArena<S2_MAX_L3_TABLES>,
}

impl Stage2Tables {
    pub const fn new() -> Self {
        Stage2Tables { l1: TableArena::new(), l2: TableArena::new(), l3: TableArena::new() }
    }

    fn reset(&mut self) {
        self.l1.reset();
        self.l2.reset();
        self.l3.reset();
    }

    fn map_page(&mut self, ipa: u64, pa: u64, read: bool, write: bool, exec: bool) -> Result<()> {
        let idx1 = ((ipa >> L1_SHIFT) & LVL_INDEX_MASK) as usize;
        let idx2 = ((ipa >> L2_SHIFT) & LVL_INDEX_MASK) as usize;
        let idx3 = ((ipa >> L3_SHIFT) & LVL_INDEX_MASK) as usize;

        let l2_idx = self.l1.ensure_child(0, idx1)?;
        self.l1.set_entry(0, idx1, self.l2.table_addr(l2_idx) | S2_TABLE);

        let l3_idx = self.l2.ensure_child(l2_idx, idx2)?;
        self.l2.set_entry(l2_idx, idx2, self.l3.table_addr(l3_idx) | S2_TABLE);

        let mut desc = (pa & PA_48_MASK & !(PAGE_SIZE - 1))
            | S2_PAGE
            | S2_AF
            | S2_SH_INNER
            | s2_memattr(NORMAL_WB);
        if read {
            desc |= S2AP_R;
        }
        if write {
            desc |= S2AP_W;
        }
        if !exec {
            desc |= S2_XN;
        }
        self.l3.set_entry(l3_idx, idx3, desc);
        Ok(())
    }

    /// Builds `vm_count` equal-sized, equal-permission identity windows of
    /// `vm_size` bytes each, separated by `guard_bytes` of deliberately
    /// unmapped space. Clears the whole table first: this is meant to be
    /// called once per boot, matching `s2_build_tables_identity`.
    #[allow(clippy::too_many_arguments)]
    pub fn build_tables_identity(
        &mut self,
        ipa_base: u64,
        pa_base: u64,
        vm_size: u64,
        vm_count: u32,
        guard_bytes: u64,
        read: bool,
        write: bool,
        exec: bool,
    ) -> Result<()> {
        self.reset();
        let vm_size = (vm_size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let guard_bytes = (guard_bytes + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let stride = vm_size + guard_bytes;

        for vm in 0..vm_count as u64 {
            let slot_offset = vm * stride;
            let mut off = 0;
            while off < vm_size {
                self.map_page(
                    ipa_base + slot_offset + off,
                    pa_base + slot_offset + off,
                    read,
                    write,
                    exec,
                )?;
                off += PAGE_SIZE;
            }
        }
        Ok(())
    }

    /// `true` if `ipa` resolves to a valid leaf descriptor anywhere in the
    /// table (used by tests to probe guard gaps, and not exposed to
    /// production code, which never needs to ask "is this mapped" outside
    /// of the trap-dispatch diagnostic path below).
    #[cfg(test)]
    fn is_mapped(&self, ipa: u64) -> bool {
        let idx1 = ((ipa >> L1_SHIFT) & LVL_INDEX_MASK) as usize;
        let l1e = self.l1.entry(0, idx1);
        if l1e & S2_DESC_VALID == 0 {
            return false;
        }
        let l2_idx = match self.l1.children_peek(0, idx1) {
            Some(i) => i,
            None => return false,
        };
        let idx2 = ((ipa >> L2_SHIFT) & LVL_INDEX_MASK) as usize;
        let l2e = self.l2.entry(l2_idx, idx2);
        if l2e & S2_DESC_VALID == 0 {
            return false;
        }
        let l3_idx = match self.l2.children_peek(l2_idx, idx2) {
            Some(i) => i,
            None => return false,
        };
        let idx3 = ((ipa >> L3_SHIFT) & LVL_INDEX_MASK) as usize;
        self.l3.entry(l3_idx, idx3) & S2_DESC_VALID != 0
    }

    /// Raw L1 descriptor for the given guest-physical address, used by the
    /// abort diagnostic dump (`el2_exception_common`'s `ipa_index`/`l1[...]`
    /// report in `original_source/core/trap.c`).
    pub fn l1_descriptor(&self, ipa: u64) -> u64 {
        let idx1 = ((ipa >> L1_SHIFT) & LVL_INDEX_MASK) as usize;
        self.l1.entry(0, idx1)
    }

    pub fn l1_base(&self) -> u64 {
        self.l1.table_addr(0)
    }

    fn vtcr_value() -> u64 {
        const TG0: u64 = 0b00 << 14;
        const SH0: u64 = 0b11 << 12;
        const ORGN0: u64 = 0b1 << 10;
        const IRGN0: u64 = 0b1 << 8;
        const SL0: u64 = 0b01 << 6;
        const PS: u64 = 0b101 << 16;
        let t0sz = 64 - IPA_BITS as u64;
        t0sz | TG0 | SH0 | ORGN0 | IRGN0 | SL0 | PS
    }

    /// Programs `MAIR_EL2`, `VTCR_EL2`, `VTTBR_EL2` and the `HCR_EL2`
    /// virtualization-enable bits, in the exact sequence and barrier
    /// placement of `s2_program_regs_and_enable`. Returns the programmed
    /// `VTTBR_EL2` value, which callers snapshot into each VCPU.
    pub fn program_regs_and_enable(&self, ops: &impl SysOps) -> u64 {
        ops.write(SysReg::MairEl2, mair_value());
        ops.write(SysReg::VtcrEl2, Self::vtcr_value());

        let mmfr1 = ops.read(SysReg::IdAa64Mmfr1El1);
        let vmid_bits = (mmfr1 >> 4) & 0xf;
        let mask = if vmid_bits == 0x2 { 0xffff } else { 0xff };
        let vttbr = ((VMID as u64 & mask) << 48) | self.l1_base();
        ops.write(SysReg::VttbrEl2, vttbr);

        ops.dsb_ish();
        ops.tlbi_vmalls12e1is();
        ops.dsb_ish();
        ops.isb();

        const HCR_VM: u64 = 1 << 0;
        const HCR_RW: u64 = 1 << 31;
        const HCR_TWE: u64 = 1 << 14;
        const HCR_TWI: u64 = 1 << 13;
        const HCR_TSC: u64 = 1 << 19;
        const HCR_FMO: u64 = 1 << 3;
        const HCR_IMO: u64 = 1 << 4;
        const HCR_AMO: u64 = 1 << 5;
        let hcr = ops.read(SysReg::HcrEl2)
            | HCR_VM
            | HCR_RW
            | HCR_TWE
            | HCR_TWI
            | HCR_TSC
            | HCR_FMO
            | HCR_IMO
            | HCR_AMO;
        ops.write(SysReg::HcrEl2, hcr);

        ops.dsb_ish();
        ops.tlbi_vmalls12e1is();
        ops.dsb_ish();
        ops.isb();

        vttbr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::regs::mock::MockOps;
    use crate::config::S2_VM_GUARD_BYTES;

    #[test]
    fn guard_gap_is_left_unmapped() {
        let mut t = Stage2Tables::new();
        let vm_size = 0x10000u64;
        t.build_tables_identity(0x4000_0000, 0x4000_0000, vm_size, 2, S2_VM_GUARD_BYTES, true, true, false)
            .unwrap();

        // Last page of window 0 is mapped...
        assert!(t.is_mapped(0x4000_0000 + vm_size - PAGE_SIZE));
        // ...but the guard gap right after it is not...
        assert!(!t.is_mapped(0x4000_0000 + vm_size));
        // ...and window 1 resumes after the guard.
        assert!(t.is_mapped(0x4000_0000 + vm_size + S2_VM_GUARD_BYTES));
    }

    #[test]
    fn mapped_page_carries_requested_permissions() {
        let mut t = Stage2Tables::new();
        t.build_tables_identity(0, 0, PAGE_SIZE, 1, 0, true, false, true).unwrap();
        let idx3 = 0;
        let desc = t.l3.entry(t.l2.children_peek(t.l1.children_peek(0, 0).unwrap(), 0).unwrap(), idx3);
        assert_eq!(desc & S2AP_R, S2AP_R);
        assert_eq!(desc & S2AP_W, 0);
        assert_eq!(desc & S2_XN, 0);
    }

    #[test]
    fn program_regs_and_enable_sets_hcr_vm_bit_and_matching_vttbr() {
        let mut t = Stage2Tables::new();
        t.build_tables_identity(0x4000_0000, 0x4000_0000, 0x1000, 1, 0, true, true, true).unwrap();
        let ops = MockOps::new();
        let vttbr = t.program_regs_and_enable(&ops);
        assert_eq!(ops.hcr_el2.get() & 1, 1);
        assert_eq!(ops.vttbr_el2.get(), vttbr);
        assert_eq!(vttbr & PA_48_MASK & !0xfff, t.l1_base() & !0xfff);
        assert_eq!((vttbr >> 48) & 0xff, VMID as u64);
    }

    #[test]
    fn wide_vmid_bits_use_16_bit_mask() {
        let mut t = Stage2Tables::new();
        t.build_tables_identity(0, 0, PAGE_SIZE, 1, 0, true, true, true).unwrap();
        let ops = MockOps::new();
        ops.id_aa64mmfr1_el1.set(0x2 << 4);
        let vttbr = t.program_regs_and_enable(&ops);
        assert_eq!((vttbr >> 48) & 0xffff, VMID as u64);
    }
}
