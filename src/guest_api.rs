//! The guest/hypervisor ABI surface: the task-report record and hypercall
//! immediates. Ported from `original_source/include/guest_api.h`, expanded
//! with the timer telemetry fields `core/trap.c`'s `handle_guest_task_report`
//! already reads out of a wider record than the header it shipped with.

/// HVC #0x60: x1 points at one of these, native endianness, `desc`
/// NUL-terminated within its 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GuestTaskResult {
    pub id: u64,
    pub desc: [u8; 32],
    pub data0: u64,
    pub data1: u64,
    pub time_before: u64,
    pub time_after: u64,
    pub time_target: u64,
    pub memwalk_time: u64,
}

impl GuestTaskResult {
    /// `desc` up to (but not including) its first NUL, or the whole 32
    /// bytes if none is present. Invalid UTF-8 is reported as `"?"` rather
    /// than panicking, since this is guest-supplied data the hypervisor
    /// must not trust.
    pub fn desc_str(&self) -> &str {
        let len = self.desc.iter().position(|&b| b == 0).unwrap_or(self.desc.len());
        core::str::from_utf8(&self.desc[..len]).unwrap_or("?")
    }

    /// `true` if any of the timer telemetry fields carry data, matching
    /// the C dispatcher's "only print the timing line if one of these is
    /// nonzero" check.
    pub fn has_timer_telemetry(&self) -> bool {
        self.time_before != 0 || self.time_after != 0 || self.time_target != 0 || self.memwalk_time != 0
    }
}

/// HVC immediates this hypervisor dispatches on (`handle_guest_hvc`).
pub const HVC_TASK_REPORT: u16 = 0x60;
pub const HVC_SET_VIRTUAL_TIME: u16 = 0x61;
pub const HVC_FATAL: u16 = 0x63;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desc_str_stops_at_first_nul() {
        let mut desc = [0u8; 32];
        desc[..7].copy_from_slice(b"counter");
        let r = GuestTaskResult {
            id: 0,
            desc,
            data0: 0,
            data1: 0,
            time_before: 0,
            time_after: 0,
            time_target: 0,
            memwalk_time: 0,
        };
        assert_eq!(r.desc_str(), "counter");
    }

    #[test]
    fn has_timer_telemetry_is_false_when_all_zero() {
        let r = GuestTaskResult {
            id: 0,
            desc: [0; 32],
            data0: 1,
            data1: 2,
            time_before: 0,
            time_after: 0,
            time_target: 0,
            memwalk_time: 0,
        };
        assert!(!r.has_timer_telemetry());
    }

    #[test]
    fn size_matches_field_layout() {
        // id(8) + desc(32) + data0(8) + data1(8) + four timer u64s(32) = 88.
        assert_eq!(core::mem::size_of::<GuestTaskResult>(), 88);
    }
}
