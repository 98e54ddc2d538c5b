//! Shared task helpers for the two reference guests. Ported from
//! `original_source/guests/guest_tasks.c`. Illustration only, see
//! `guest_stubs.rs`'s module comment.

#![allow(dead_code)]

use schism::guest_api::GuestTaskResult;
use schism::platform::GUEST_WORK_SIZE;

use crate::guest_stubs::{guest_private_region, guest_read_counter, guest_task_report};

fn copy_desc(out: &mut [u8; 32], msg: &str) {
    let bytes = msg.as_bytes();
    let n = bytes.len().min(out.len() - 1);
    out[..n].copy_from_slice(&bytes[..n]);
    out[n] = 0;
}

pub fn guest_task_counter(guest_id: u64) -> GuestTaskResult {
    let mut desc = [0u8; 32];
    copy_desc(&mut desc, "counter task");
    GuestTaskResult {
        id: guest_id,
        desc,
        data0: guest_read_counter(),
        data1: guest_private_region(guest_id) as u64,
        time_before: 0,
        time_after: 0,
        time_target: 0,
        memwalk_time: 0,
    }
}

pub fn guest_task_memwalk(guest_id: u64) -> GuestTaskResult {
    let region = guest_private_region(guest_id);
    let words = (GUEST_WORK_SIZE / 8) as usize;
    let mut checksum = 0u64;
    for i in 0..words {
        let value = unsafe { core::ptr::read_volatile(region.add(i)) } ^ (guest_id << 32);
        checksum ^= value;
    }
    let mut desc = [0u8; 32];
    copy_desc(&mut desc, "memwalk task");
    GuestTaskResult {
        id: guest_id,
        desc,
        data0: checksum,
        data1: region as u64,
        time_before: 0,
        time_after: 0,
        time_target: 0,
        memwalk_time: 0,
    }
}

pub fn report(guest_id: u64, result: &GuestTaskResult) {
    guest_task_report(guest_id, result as *const GuestTaskResult);
}
