//! MAIR_ELx attribute encoding, shared by both translation regimes.
//!
//! Grounded in `original_source/include/mem_attrs.h` for the attribute
//! indices and values, and in `arch/arm64/mmu/attrs.rs`'s
//! `MemoryType`/`MairConfig` shape for expressing `encode()` as a plain
//! bit-packing function rather than a `tock_registers` bitfield.

/// `AttrIndx` values used by every descriptor this crate builds.
pub const NORMAL_WB: u8 = 0;
pub const DEVICE_NGNRE: u8 = 1;

const MAIR_ATTR_NORMAL_WBWA: u8 = 0xff;
const MAIR_ATTR_DEVICE_NGNRE: u8 = 0x04;

/// The two-entry MAIR value both MAIR_EL2 and the Stage-2 MAIR program,
/// matching `MAIR_EL2_VALUE` in `original_source`.
pub fn mair_value() -> u64 {
    (MAIR_ATTR_NORMAL_WBWA as u64) << (8 * NORMAL_WB as u64)
        | (MAIR_ATTR_DEVICE_NGNRE as u64) << (8 * DEVICE_NGNRE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mair_value_packs_both_indices() {
        let v = mair_value();
        assert_eq!(v & 0xff, MAIR_ATTR_NORMAL_WBWA as u64);
        assert_eq!((v >> 8) & 0xff, MAIR_ATTR_DEVICE_NGNRE as u64);
    }
}
