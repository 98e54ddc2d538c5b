//! Guest-side helpers shared by the two reference mini-kernels below.
//! Ported from `original_source/include/guest_stubs.h`. Illustration only:
//! this file is not part of the `schism` crate build (`SPEC_FULL.md` §B)
//! and is compiled, if at all, straight into a guest EL1 image alongside
//! `counter_os.rs`/`memwalk_os.rs`.

#![allow(dead_code)]

use core::arch::asm;
use schism::platform::{GUEST_SHARED_BASE, GUEST_SHARED_STRIDE, GUEST_WORK_BASE, GUEST_WORK_STRIDE};

pub fn guest_shared_slot(slot: u32) -> *mut u64 {
    (GUEST_SHARED_BASE + slot as u64 * GUEST_SHARED_STRIDE) as *mut u64
}

pub fn guest_log_value(slot: u32, value: u64) {
    unsafe { core::ptr::write_volatile(guest_shared_slot(slot), value) };
}

pub fn guest_yield() {
    unsafe { asm!("wfi", options(nomem, nostack)) };
}

pub fn guest_delay(iterations: u32) {
    for _ in 0..iterations {
        unsafe { asm!("nop", options(nomem, nostack)) };
    }
}

pub fn guest_read_counter() -> u64 {
    let v: u64;
    unsafe { asm!("mrs {}, cntvct_el0", out(reg) v, options(nomem, nostack)) };
    v
}

pub fn guest_read_current_el() -> u64 {
    let v: u64;
    unsafe { asm!("mrs {}, CurrentEL", out(reg) v, options(nomem, nostack)) };
    v
}

pub fn guest_read_sp() -> u64 {
    let v: u64;
    unsafe { asm!("mov {}, sp", out(reg) v, options(nomem, nostack)) };
    v
}

pub fn guest_private_region(guest_id: u64) -> *mut u64 {
    (GUEST_WORK_BASE + guest_id * GUEST_WORK_STRIDE) as *mut u64
}

/// HVC #0x61: rebinds the guest's virtual counter, returning the value EL2
/// actually applied.
pub fn guest_set_virtual_time(virtual_cnt: u64) -> u64 {
    let mut x0 = virtual_cnt;
    unsafe { asm!("hvc #0x61", inout("x0") x0, options(nostack)) };
    x0
}

/// HVC #0x60: reports a [`schism::guest_api::GuestTaskResult`] to EL2.
pub fn guest_task_report(guest_id: u64, out: *const schism::guest_api::GuestTaskResult) {
    unsafe { asm!("hvc #0x60", in("x0") guest_id, in("x1") out as u64, options(nostack)) };
}
