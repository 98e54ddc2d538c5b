//! Cooperative round-robin VCPU scheduler.
//!
//! Ported from the `sched_runqueue`/`sched_len`/`sched_idx` globals and
//! `vcpu_scheduler_register`/`vcpu_scheduler_yield`/`vcpu_scheduler_run`
//! in `original_source/core/vcpu.c`. `heapless::Vec` stands in for the
//! original's fixed C array plus length counter — the same fixed-capacity,
//! no-allocation shape, through an already-present dependency.

use crate::arch::aarch64::cpu::switch::world_switch;
use crate::arch::aarch64::cpu::vcpu::Vcpu;
use crate::arch::aarch64::regs::SysOps;
use crate::config::MAX_VCPUS;
use crate::error::{Error, Result};
use heapless::Vec;

pub struct Scheduler {
    run_queue: Vec<Vcpu, MAX_VCPUS>,
    current: usize,
}

impl Scheduler {
    pub const fn new() -> Self {
        Scheduler { run_queue: Vec::new(), current: 0 }
    }

    pub fn register(&mut self, vcpu: Vcpu) -> Result<()> {
        self.run_queue.push(vcpu).map_err(|_| Error::SchedulerFull)
    }

    pub fn current(&self) -> Option<&Vcpu> {
        self.run_queue.get(self.current)
    }

    pub fn current_mut(&mut self) -> Option<&mut Vcpu> {
        self.run_queue.get_mut(self.current)
    }

    pub fn find_mut(&mut self, vcpu_id: u32) -> Option<&mut Vcpu> {
        self.run_queue.iter_mut().find(|v| v.vcpu_id == vcpu_id)
    }

    /// Enters the first registered VCPU. Must be called exactly once, from
    /// the boot path, after every VCPU has been registered
    /// (`vcpu_scheduler_run`).
    pub fn run(&mut self, ops: &impl SysOps) -> Result<()> {
        if self.run_queue.is_empty() {
            return Err(Error::UnknownVcpu);
        }
        self.current = 0;
        world_switch(ops, None, &mut self.run_queue[0]);
        Ok(())
    }

    /// Switches to the next VCPU in round-robin order
    /// (`vcpu_scheduler_yield`).
    pub fn yield_now(&mut self, ops: &impl SysOps) {
        let len = self.run_queue.len();
        if len < 2 {
            return;
        }
        let from_idx = self.current;
        let to_idx = (self.current + 1) % len;
        self.current = to_idx;

        let (from, to) = if from_idx < to_idx {
            let (head, tail) = self.run_queue.split_at_mut(to_idx);
            (&mut head[from_idx], &mut tail[0])
        } else {
            let (head, tail) = self.run_queue.split_at_mut(from_idx);
            (&mut tail[0], &mut head[to_idx])
        };
        world_switch(ops, Some(from), to);
    }

    pub fn len(&self) -> usize {
        self.run_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.run_queue.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::cpu::vcpu::VcpuBootManifest;
    use crate::arch::aarch64::regs::mock::MockOps;

    fn vcpu(id: u32, entry: u64) -> Vcpu {
        Vcpu::new(id, entry, 0x1000 * (id as u64 + 1), id as u64, 0, VcpuBootManifest::default())
    }

    #[test]
    fn register_fills_up_to_capacity() {
        let mut s = Scheduler::new();
        for i in 0..MAX_VCPUS as u32 {
            s.register(vcpu(i, 0x1000)).unwrap();
        }
        assert_eq!(s.register(vcpu(99, 0)), Err(Error::SchedulerFull));
    }

    #[test]
    fn yield_now_round_robins_and_wraps() {
        let ops = MockOps::new();
        let mut s = Scheduler::new();
        s.register(vcpu(0, 0x1000)).unwrap();
        s.register(vcpu(1, 0x2000)).unwrap();
        s.register(vcpu(2, 0x3000)).unwrap();

        s.run(&ops).unwrap();
        assert_eq!(s.current().unwrap().vcpu_id, 0);

        s.yield_now(&ops);
        assert_eq!(s.current().unwrap().vcpu_id, 1);
        s.yield_now(&ops);
        assert_eq!(s.current().unwrap().vcpu_id, 2);
        s.yield_now(&ops);
        assert_eq!(s.current().unwrap().vcpu_id, 0);
    }

    #[test]
    fn yield_with_one_vcpu_is_a_no_op() {
        let ops = MockOps::new();
        let mut s = Scheduler::new();
        s.register(vcpu(0, 0x1000)).unwrap();
        s.run(&ops).unwrap();
        s.yield_now(&ops);
        assert_eq!(s.current().unwrap().vcpu_id, 0);
    }
}
