//! Time management module
//!
//! Tick processing driven from the hardware timer ISR, plus access to the
//! free-running tick counter.

use crate::critical::critical_section;
use crate::error::OsError;
use crate::kernel;
use crate::sched;
use crate::types::{OsTick, WAIT_INFINITE};

/// Get the free-running tick counter
#[inline]
pub fn os_sys_time_get() -> OsTick {
    kernel::KERNEL.tick_get()
}

/// Set the free-running tick counter
#[inline]
pub fn os_sys_time_set(ticks: OsTick) {
    kernel::KERNEL.tick_set(ticks);
}

/// Walk the global timeout list: decrement every finite wait and complete
/// the expired ones with a Timeout return code.
///
/// # Safety
/// Caller must hold the critical section (tick ISR context).
unsafe fn wait_timeout_manage() {
    unsafe {
        let mut cur = kernel::timer_list_head();

        while let Some(tcb) = cur {
            let tcb_ref = &mut *tcb.as_ptr();

            // completing the wait unlinks the entry, so read the successor first
            let next = tcb_ref.tick_next;

            if tcb_ref.tick_remain == WAIT_INFINITE {
                crate::port::os_fatal_error();
            }

            if tcb_ref.tick_remain > 0 {
                tcb_ref.tick_remain -= 1;

                if tcb_ref.tick_remain == 0 {
                    crate::task::task_wait_complete(tcb, OsError::Timeout);
                }
            }

            cur = next;
        }
    }
}

/// Tick processing; call from the timer ISR at the kernel tick rate
///
/// Runs round-robin rotation, expires timed waits, and increments the
/// free-running tick counter. A context switch is pended on ISR exit when
/// an expired wait made a higher-priority task runnable.
pub fn os_tick_int_processing() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    kernel::os_int_enter();

    critical_section(|_cs| unsafe {
        sched::round_robin_manage();
        wait_timeout_manage();
    });

    kernel::KERNEL.tick_increment();

    kernel::os_int_exit();
}

/// SysTick interrupt handler
#[no_mangle]
pub extern "C" fn SysTick() {
    os_tick_int_processing();
}
