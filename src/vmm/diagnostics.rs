//! EL2-side diagnostics over guest-visible state. Ported from
//! `original_source/core/guest_monitor.c`'s `guest_shared_dump`.

use crate::console;
use crate::platform::{GUEST_SHARED_BASE, GUEST_SHARED_SLOT_COUNT, GUEST_SHARED_STRIDE};

/// Prints every slot of the shared diagnostic table both guests and EL2
/// can observe, starting at `base`. Factored out of [`dump_shared_region`]
/// so tests can point it at an ordinary buffer instead of the fixed
/// physical address used at runtime.
fn dump_shared_region_at(base: u64) {
    console::puts("EL2: guest shared slots snapshot\n");
    for slot in 0..GUEST_SHARED_SLOT_COUNT {
        let addr = base + slot as u64 * GUEST_SHARED_STRIDE;
        // Safety: caller guarantees `base` names `GUEST_SHARED_SLOT_COUNT`
        // live `u64` slots; the read is volatile because another VCPU may
        // be concurrently writing through it.
        let value = unsafe { core::ptr::read_volatile(addr as *const u64) };
        console::puts("  slot ");
        console::hex64(slot as u64);
        console::puts(" @ ");
        console::hex64(addr);
        console::puts(" = ");
        console::hex64(value);
        console::puts("\n");
    }
}

/// Reads through EL2's own Stage-1 mapping of guest RAM, so this must only
/// be called once Stage-1 is enabled; `vmm::boot::build` maps the whole of
/// guest RAM before returning, so the shared slot table is always covered
/// by the time a caller can reach this.
pub fn dump_shared_region() {
    dump_shared_region_at(GUEST_SHARED_BASE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::GUEST_SHARED_SLOT_COUNT;

    #[test]
    fn reads_every_slot_without_panicking() {
        let buf = [0u64; GUEST_SHARED_SLOT_COUNT];
        dump_shared_region_at(buf.as_ptr() as u64);
    }
}
