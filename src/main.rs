//! Entry point for the `schism` image.
//!
//! The vector table, the initial stack switch and the `CurrentEL` check
//! that land here are boot assembly and out of scope (`spec.md` §1);
//! `link.ld` places this binary to be entered with `el2_main` reachable
//! and the stack already switched to `__stack_top`. A real image links
//! two guest payloads and provides `guest_counter_os`/`guest_memwalk_os`
//! at the addresses below; the ones under `demos/` are illustration and
//! are not part of this crate's build (`SPEC_FULL.md` §B).

#![no_std]
#![no_main]

use schism::arch::aarch64::regs::{Hw, SysOps};
use schism::console;
use schism::vmm::boot;

extern "C" {
    fn guest_counter_os(guest_id: u64);
    fn guest_memwalk_os(guest_id: u64);
}

fn halt() -> ! {
    loop {
        Hw.wfi();
    }
}

#[no_mangle]
pub extern "C" fn el2_main() -> ! {
    let entries = [guest_counter_os as usize as u64, guest_memwalk_os as usize as u64];
    let mut out = boot::build(&Hw, entries);
    schism::logger::init();

    // `Scheduler::run` does not return on real hardware: `world_switch`'s
    // tail call erets into the first VCPU, and control only comes back to
    // EL2 code through a trap (out of scope here, see `vmm::trap`).
    if out.scheduler.run(&Hw).is_err() {
        console::puts("EL2: no VCPUs registered, halting.\n");
    }
    halt()
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    console::puts("EL2: panic: ");
    if let Some(location) = info.location() {
        console::puts(location.file());
        console::puts("\n");
    }
    halt()
}
