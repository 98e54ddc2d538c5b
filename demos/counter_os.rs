//! Reference guest #0: samples the virtual counter in a loop and logs it
//! to the shared slot table. Ported from
//! `original_source/guests/counter_os.c`. Illustration only, see
//! `guest_stubs.rs`'s module comment.

#![no_std]
#![no_main]

#[path = "guest_stubs.rs"]
mod guest_stubs;
#[path = "guest_tasks.rs"]
mod guest_tasks;

use guest_stubs::{
    guest_delay, guest_log_value, guest_private_region, guest_read_current_el, guest_read_sp, guest_yield,
};

const COUNTER_SLOT_ID: u32 = 0;
const COUNTER_SLOT_EL: u32 = 1;
const COUNTER_SLOT_SP: u32 = 2;
const COUNTER_SLOT_REGION: u32 = 3;
const COUNTER_SLOT_COUNTER: u32 = 4;
const COUNTER_SLOT_ITER: u32 = 5;

fn run_isolation_tests(guest_id: u64) {
    guest_log_value(COUNTER_SLOT_ID, guest_id);
    guest_log_value(COUNTER_SLOT_EL, guest_read_current_el());
    guest_log_value(COUNTER_SLOT_SP, guest_read_sp());
    let region = guest_private_region(guest_id);
    guest_log_value(COUNTER_SLOT_REGION, region as u64);

    let pattern = 0xC0DE_0000u64 | guest_id;
    unsafe { core::ptr::write_volatile(region, pattern) };
}

#[no_mangle]
pub extern "C" fn guest_counter_os(guest_id: u64) -> ! {
    run_isolation_tests(guest_id);

    let mut iteration = 0u64;
    loop {
        let result = guest_tasks::guest_task_counter(guest_id);
        guest_log_value(COUNTER_SLOT_COUNTER, result.data0);
        guest_log_value(COUNTER_SLOT_ITER, iteration);

        iteration += 1;
        guest_delay(10_000);
        guest_yield();
    }
}
