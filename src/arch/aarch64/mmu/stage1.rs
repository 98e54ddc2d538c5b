//! Stage-1 (EL2-private) translation tables.
//!
//! A faithful rewrite of `original_source/core/el2_mmu.c` onto the
//! [`TableArena`](super::table::TableArena): same granularity (4 KiB
//! pages only, outward-aligned ranges), same descriptor bits, same
//! `TCR_EL2`/`SCTLR_EL2` programming sequence.

use super::attrs::{mair_value, DEVICE_NGNRE, NORMAL_WB};
use super::table::TableArena;
use crate::arch::aarch64::regs::{SysOps, SysReg};
use crate::config::{S1_MAX_L2_TABLES, S1_MAX_L3_TABLES};
use crate::error::Result;

const PAGE_SIZE: u64 = 0x1000;
const L1_SHIFT: u32 = 30;
const L2_SHIFT: u32 = 21;
const L3_SHIFT: u32 = 12;
const LVL_INDEX_MASK: u64 = 0x1ff;
const PA_48_MASK: u64 = (1u64 << 48) - 1;

const DESC_TABLE: u64 = 0x3;
const PTE_PAGE: u64 = 0x3;
const PTE_SH_INNER: u64 = 0x3 << 8;
const PTE_AF: u64 = 1 << 10;
const PTE_RDONLY: u64 = 1 << 7;
const PTE_PXN: u64 = 1 << 53;
const PTE_UXN: u64 = 1 << 54;

fn pte_attr(idx: u8) -> u64 {
    (idx as u64 & 0x7) << 2
}

/// Page attributes for a single `map_range` call.
#[derive(Clone, Copy)]
pub struct PageAttrs {
    pub attr_idx: u8,
    pub read_only: bool,
    pub exec: bool,
}

impl PageAttrs {
    pub const fn normal_rw() -> Self {
        PageAttrs { attr_idx: NORMAL_WB, read_only: false, exec: false }
    }
    pub const fn normal_ro_exec() -> Self {
        PageAttrs { attr_idx: NORMAL_WB, read_only: true, exec: true }
    }
    pub const fn normal_ro() -> Self {
        PageAttrs { attr_idx: NORMAL_WB, read_only: true, exec: false }
    }
    pub const fn device_rw() -> Self {
        PageAttrs { attr_idx: DEVICE_NGNRE, read_only: false, exec: false }
    }
}

pub struct Stage1Tables {
    l1: TableArena<1>,
    l2: TableArena<S1_MAX_L2_TABLES>,
    l3: TableArena<S1_MAX_L3_TABLES>,
}

impl Stage1Tables {
    pub const fn new() -> Self {
        Stage1Tables { l1: TableArena::new(), l2: TableArena::new(), l3: TableArena::new() }
    }

    /// Clears every table. Call once before the first `map_range`.
    pub fn init(&mut self) {
        self.l1.reset();
        self.l2.reset();
        self.l3.reset();
    }

    fn map_page(&mut self, va: u64, pa: u64, attrs: PageAttrs) -> Result<()> {
        let idx1 = ((va >> L1_SHIFT) & LVL_INDEX_MASK) as usize;
        let idx2 = ((va >> L2_SHIFT) & LVL_INDEX_MASK) as usize;
        let idx3 = ((va >> L3_SHIFT) & LVL_INDEX_MASK) as usize;

        let l2_idx = self.l1.ensure_child(0, idx1)?;
        self.l1.set_entry(0, idx1, self.l2.table_addr(l2_idx) | DESC_TABLE);

        let l3_idx = self.l2.ensure_child(l2_idx, idx2)?;
        self.l2.set_entry(l2_idx, idx2, self.l3.table_addr(l3_idx) | DESC_TABLE);

        let mut desc = (pa & PA_48_MASK & !(PAGE_SIZE - 1))
            | PTE_PAGE
            | pte_attr(attrs.attr_idx)
            | PTE_SH_INNER
            | PTE_AF;
        if attrs.read_only {
            desc |= PTE_RDONLY;
        }
        if !attrs.exec {
            desc |= PTE_PXN | PTE_UXN;
        }
        self.l3.set_entry(l3_idx, idx3, desc);
        Ok(())
    }

    /// Maps `[va, va + size)` to `pa` onwards, aligning outward to page
    /// granularity (`el2_map_range` in `original_source`). Re-mapping an
    /// already-mapped page overwrites it without error.
    pub fn map_range(&mut self, va: u64, pa: u64, size: u64, attrs: PageAttrs) -> Result<()> {
        let start = va & !(PAGE_SIZE - 1);
        let end = (va + size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let mut offset = 0;
        while start + offset < end {
            self.map_page(start + offset, pa + offset, attrs)?;
            offset += PAGE_SIZE;
        }
        Ok(())
    }

    /// Programs `TTBR0_EL2`/`TCR_EL2`/`MAIR_EL2` and sets `SCTLR_EL2.M`,
    /// in the exact barrier sequence `el2_mmu_enable` uses.
    pub fn enable(&self, ops: &impl SysOps) {
        ops.dsb_ishst();
        ops.write(SysReg::TtbrElx, self.l1.table_addr(0));

        const T0SZ: u64 = 25;
        const TG0: u64 = 0;
        const SH0: u64 = 0b11 << 12;
        const ORGN0: u64 = 0b01 << 10;
        const IRGN0: u64 = 0b01 << 8;
        const IPS: u64 = 0b101 << 16;
        let tcr = T0SZ | TG0 | SH0 | ORGN0 | IRGN0 | IPS;
        ops.write(SysReg::TcrEl2, tcr);

        ops.write(SysReg::MairEl2, mair_value());
        ops.dsb_ish();
        ops.isb();

        let sctlr = ops.read(SysReg::SctlrEl2) | (1 << 0) | (1 << 2) | (1 << 12);
        ops.write(SysReg::SctlrEl2, sctlr);
        ops.isb();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::regs::mock::MockOps;

    #[test]
    fn map_range_aligns_outward_to_page_granularity() {
        let mut t = Stage1Tables::new();
        t.init();
        t.map_range(0x1001, 0x2001, 1, PageAttrs::normal_rw()).unwrap();

        let idx1 = 0;
        let idx2 = 0;
        let idx3 = 1; // VA 0x1000 falls in L3 index 1.
        let l2_idx = 0;
        let l3_idx = 0;
        let l1e = t.l1.entry(0, idx1);
        assert_eq!(l1e & DESC_TABLE, DESC_TABLE);
        let l2e = t.l2.entry(l2_idx, idx2);
        assert_eq!(l2e & DESC_TABLE, DESC_TABLE);
        let l3e = t.l3.entry(l3_idx, idx3);
        assert_eq!(l3e & PA_48_MASK & !(PAGE_SIZE - 1), 0x2000);
        assert_eq!(l3e & PTE_PAGE, PTE_PAGE);
    }

    #[test]
    fn read_only_sets_rdonly_bit_and_exec_clears_xn_bits() {
        let mut t = Stage1Tables::new();
        t.init();
        t.map_range(0x4000_0000, 0x4000_0000, PAGE_SIZE, PageAttrs::normal_ro_exec()).unwrap();
        let l3e = t.l3.entry(0, 0);
        assert_eq!(l3e & PTE_RDONLY, PTE_RDONLY);
        assert_eq!(l3e & (PTE_PXN | PTE_UXN), 0);
    }

    #[test]
    fn non_exec_sets_both_xn_bits() {
        let mut t = Stage1Tables::new();
        t.init();
        t.map_range(0x4000_0000, 0x4000_0000, PAGE_SIZE, PageAttrs::normal_rw()).unwrap();
        let l3e = t.l3.entry(0, 0);
        assert_eq!(l3e & (PTE_PXN | PTE_UXN), PTE_PXN | PTE_UXN);
    }

    #[test]
    fn remap_overwrites_without_error() {
        let mut t = Stage1Tables::new();
        t.init();
        t.map_range(0x1000, 0x1000, PAGE_SIZE, PageAttrs::normal_rw()).unwrap();
        t.map_range(0x1000, 0x1000, PAGE_SIZE, PageAttrs::normal_ro_exec()).unwrap();
        let l3e = t.l3.entry(0, 1);
        assert_eq!(l3e & PTE_RDONLY, PTE_RDONLY);
    }

    #[test]
    fn enable_sets_sctlr_m_bit_and_programs_ttbr() {
        let mut t = Stage1Tables::new();
        t.init();
        let ops = MockOps::new();
        t.enable(&ops);
        assert_eq!(ops.sctlr_el2.get() & 1, 1);
        assert_eq!(ops.ttbr_elx.get(), t.l1.table_addr(0));
        assert_eq!(ops.mair_el2.get(), mair_value());
    }
}
