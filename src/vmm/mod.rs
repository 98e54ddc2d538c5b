//! Boot bring-up, cooperative scheduling and exception dispatch: the
//! pieces of `original_source/core/main.c`/`core/trap.c`/`core/vcpu.c`
//! that sit above the architecture layer in `arch::aarch64`.

pub mod boot;
pub mod diagnostics;
pub mod hypercall;
pub mod scheduler;
pub mod trap;
