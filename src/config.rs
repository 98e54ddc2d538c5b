//! Compile-time capacities for the table-pool arenas, the scheduler ring and
//! the VGIC list-register shadow.
//!
//! These mirror `original_source`'s `EL2_PT_ENTRIES` / `S2_MAX_L2_TABLES` /
//! `S2_MAX_L3_TABLES` / `VCPU_SCHED_MAX` constants directly; see
//! `DESIGN.md` for the file-by-file grounding.

/// Entries per L1/L2/L3 table, both translation regimes (`EL2_PT_ENTRIES`,
/// `S2_PT_ENTRIES`).
pub const PT_ENTRIES: usize = 512;

/// Stage-1 (EL2-private) arena capacity. `original_source/core/el2_mmu.c`
/// sizes `l2_pool[16]`/`l3_pool[64]` for its own image sections only; this
/// arena additionally covers the broad guest-RAM identity window
/// `vmm::boot` maps for diagnostics (`SPEC_FULL.md` §B), so `S1_MAX_L3_TABLES`
/// is sized to the full `platform::RAM_SIZE` at 2 MiB per L3 table
/// (`RAM_SIZE / 0x20_0000`), not just the hypervisor's own footprint.
pub const S1_MAX_L2_TABLES: usize = 16;
pub const S1_MAX_L3_TABLES: usize = 512;

/// Stage-2 (guest-physical) arena capacity: `S2_MAX_L2_TABLES`,
/// `S2_MAX_L3_TABLES`.
pub const S2_MAX_L2_TABLES: usize = 16;
pub const S2_MAX_L3_TABLES: usize = 1024;

/// Maximum concurrently registered VCPUs (`VCPU_SCHED_MAX`).
pub const MAX_VCPUS: usize = 8;

/// Upper bound on ICH_LR<n>_EL2 list registers a core may implement
/// (`ICH_VTR_EL2.ListRegs` is a 4-bit field, so at most 16).
pub const MAX_VGIC_LIST_REGS: usize = 16;

/// Guest-physical address width for the Stage-2 regime (`IPA_BITS`).
pub const IPA_BITS: u32 = 39;

/// Fixed VMID used for the single guest-physical address space this
/// hypervisor programs (`VMID` in `include/s2_mmu.h`).
pub const VMID: u16 = 1;

/// Guard gap inserted between adjacent VM windows by
/// `stage2::build_tables_identity` (`S2_VM_GUARD_BYTES`).
pub const S2_VM_GUARD_BYTES: u64 = 2 * 0x1000;
