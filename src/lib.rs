//! Preemptive priority-based real-time microkernel in Rust
//!
//! A real-time operating system kernel providing:
//! - Priority-based preemptive scheduling with per-priority round-robin
//! - Synchronization primitives (semaphores, data queues, event groups,
//!   mutexes with priority inheritance and priority ceiling)
//! - Tick-driven timeouts and sleep
//! - Context switching for ARM Cortex-M

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::kernel;
pub use crate::core::kernel::{os_int_enter, os_int_exit, os_sys_start, os_sys_tslice_set};
pub use crate::core::list;
pub use crate::core::prio;
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::task;
pub use crate::core::task::{os_task_create, os_task_sleep, OsTaskFn, OsTcb};
pub use crate::core::sched;
pub use crate::core::sched::os_sched;
pub use crate::core::time;
pub use crate::core::time::{os_sys_time_get, os_sys_time_set, os_tick_int_processing};

#[cfg(feature = "sem")]
pub use crate::sync::sem;
#[cfg(feature = "queue")]
pub use crate::sync::queue;
#[cfg(feature = "event")]
pub use crate::sync::event;
#[cfg(feature = "mutex")]
pub use crate::sync::mutex;
