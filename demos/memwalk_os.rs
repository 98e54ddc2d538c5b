//! Reference guest #1: walks and checksums its private work region, then
//! reports the result to EL2 via HVC #0x60. Ported from
//! `original_source/guests/memwalk_os.c`. Illustration only, see
//! `guest_stubs.rs`'s module comment.

#![no_std]
#![no_main]

#[path = "guest_stubs.rs"]
mod guest_stubs;
#[path = "guest_tasks.rs"]
mod guest_tasks;

use guest_stubs::{guest_delay, guest_log_value, guest_private_region, guest_read_current_el, guest_read_sp, guest_yield};
use schism::platform::GUEST_WORK_SIZE;

const MEMWALK_SLOT_ID: u32 = 6;
const MEMWALK_SLOT_EL: u32 = 7;
const MEMWALK_SLOT_SP: u32 = 8;
const MEMWALK_SLOT_REGION: u32 = 9;
const MEMWALK_SLOT_CHECKSUM: u32 = 10;
const MEMWALK_SLOT_SEED: u32 = 11;

fn run_isolation_tests(guest_id: u64, region: *mut u64) {
    guest_log_value(MEMWALK_SLOT_ID, guest_id);
    guest_log_value(MEMWALK_SLOT_EL, guest_read_current_el());
    guest_log_value(MEMWALK_SLOT_SP, guest_read_sp());
    guest_log_value(MEMWALK_SLOT_REGION, region as u64);

    unsafe { core::ptr::write_volatile(region, 0xBEEF_0000u64 | guest_id) };
}

#[no_mangle]
pub extern "C" fn guest_memwalk_os(guest_id: u64) -> ! {
    let region = guest_private_region(guest_id);
    let words = (GUEST_WORK_SIZE / 8) as usize;
    let mut seed = 0xfeed_0000_0000_0000u64;

    run_isolation_tests(guest_id, region);

    loop {
        let mut checksum = 0u64;
        for i in 0..words {
            let value = seed ^ ((i as u64) << 8);
            unsafe { core::ptr::write_volatile(region.add(i), value) };
            checksum ^= value;
        }

        guest_log_value(MEMWALK_SLOT_CHECKSUM, checksum);
        guest_log_value(MEMWALK_SLOT_SEED, seed);

        let result = guest_tasks::guest_task_memwalk(guest_id);
        guest_tasks::report(guest_id, &result);

        seed = seed.wrapping_add(0x1_1111_1111);
        guest_delay(200);
        guest_yield();
    }
}
