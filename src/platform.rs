//! QEMU `virt` memory map and linker-provided section symbols.
//!
//! The hypervisor image, both reference guests and the shared diagnostic
//! slot table all live inside one identity-mapped RAM window, matching
//! `original_source/core/main.c`: see `SPEC_FULL.md` §C.4 for why the
//! guests cannot be given separate Stage-2 windows.

/// Base of RAM on the QEMU `virt` machine, and the address the image is
/// linked to run at.
pub const RAM_BASE: u64 = 0x4000_0000;

/// Size of the single Stage-2 identity window covering the whole guest
/// address space (`s2_build_tables_identity(RAM_BASE, RAM_BASE, RAM_SIZE, 1,
/// ...)` in `original_source`).
pub const RAM_SIZE: u64 = 0x4000_0000;

/// PL011 UART0 (`UART0_BASE`, `UART_SIZE` in `include/platform.h`).
pub const UART0_BASE: u64 = 0x0900_0000;
pub const UART0_SIZE: u64 = 0x1000;

/// Per-VCPU EL1 stack addresses for the two reference guests, as named in
/// `spec.md` §6 ("reference guests"). Stacks grow down from these.
pub const GUEST_STACK_TOP: [u64; 2] = [0x4008_0000, 0x400a_0000];

/// Base of each guest's private scratch region, used by the counter/memwalk
/// reference tasks. `guest_layout.h` was not retained in the example pack;
/// these values are chosen to sit well clear of both the image and the
/// guest stacks above.
pub const GUEST_WORK_BASE: u64 = 0x4004_0000;
pub const GUEST_WORK_STRIDE: u64 = 0x0001_0000;
pub const GUEST_WORK_SIZE: u64 = 0x0000_1000;

/// Shared diagnostic slot table both guests and EL2 can observe
/// (`guest_shared_slot`, `guest_shared_dump`). One `u64` per slot.
pub const GUEST_SHARED_BASE: u64 = 0x4006_0000;
pub const GUEST_SHARED_STRIDE: u64 = 8;
pub const GUEST_SHARED_SLOT_COUNT: usize = 16;

/// A linker-provided `[start, end)` byte range. `end` is guaranteed `>=
/// start` by the linker script; zero-sized sections collapse to an empty
/// range rather than being omitted, so callers never special-case them.
#[derive(Clone, Copy)]
pub struct Section {
    pub start: u64,
    pub end: u64,
}

impl Section {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

#[cfg(not(test))]
mod sections {
    use super::Section;

    extern "C" {
        static __text_start: u8;
        static __text_end: u8;
        static __rodata_start: u8;
        static __rodata_end: u8;
        static __data_start: u8;
        static __data_end: u8;
        static __bss_start: u8;
        static __bss_end: u8;
        static __stack_bottom: u8;
        static __stack_top: u8;
    }

    macro_rules! section {
        ($start:ident, $end:ident) => {
            // Safety: both symbols are defined by the linker script and
            // never written to; taking their address does not read through
            // them.
            Section {
                start: unsafe { &$start as *const u8 as u64 },
                end: unsafe { &$end as *const u8 as u64 },
            }
        };
    }

    pub fn text() -> Section {
        section!(__text_start, __text_end)
    }

    pub fn rodata() -> Section {
        section!(__rodata_start, __rodata_end)
    }

    pub fn data() -> Section {
        section!(__data_start, __data_end)
    }

    pub fn bss() -> Section {
        section!(__bss_start, __bss_end)
    }

    pub fn stack() -> Section {
        section!(__stack_bottom, __stack_top)
    }
}

/// Host test double for the linker-provided sections: `link.ld`'s symbols
/// don't exist when a `cargo test` binary links against the host target, so
/// each "section" is a small scratch buffer instead. Large enough for
/// `boot::build`'s `map_range` calls to walk without tripping a table-pool
/// exhaustion in the tests that exercise it.
#[cfg(test)]
mod sections {
    use super::Section;
    use core::cell::UnsafeCell;

    struct ScratchSection(UnsafeCell<[u8; 64]>);
    unsafe impl Sync for ScratchSection {}

    static TEXT: ScratchSection = ScratchSection(UnsafeCell::new([0; 64]));
    static RODATA: ScratchSection = ScratchSection(UnsafeCell::new([0; 64]));
    static DATA: ScratchSection = ScratchSection(UnsafeCell::new([0; 64]));
    static BSS: ScratchSection = ScratchSection(UnsafeCell::new([0; 64]));
    static STACK: ScratchSection = ScratchSection(UnsafeCell::new([0; 64]));

    fn range(s: &'static ScratchSection) -> Section {
        let p = s.0.get() as u64;
        Section { start: p, end: p + 64 }
    }

    pub fn text() -> Section {
        range(&TEXT)
    }

    pub fn rodata() -> Section {
        range(&RODATA)
    }

    pub fn data() -> Section {
        range(&DATA)
    }

    pub fn bss() -> Section {
        range(&BSS)
    }

    pub fn stack() -> Section {
        range(&STACK)
    }
}

pub use sections::{bss, data, rodata, stack, text};
