//! Port layer - CPU-specific implementations
//!
//! This module provides the hardware abstraction the core consumes:
//! context-switch pend, first-task start, exit-without-save, stack frame
//! initialization, unconditional interrupt control and the fatal-error
//! hook.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::*;

// Stub implementations for non-ARM targets (for testing)
#[cfg(not(target_arch = "arm"))]
pub mod stub {
    use crate::task::OsTaskFn;
    use crate::types::OsStkElement;

    /// Core clock; feeds the SysTick reload computation
    pub const CPU_CLOCK_HZ: u32 = 16_000_000;

    pub fn os_int_disable() {}

    pub fn os_int_enable() {}

    pub unsafe fn os_start_high_rdy(_int_sp: *mut OsStkElement) -> ! {
        panic!("os_start_high_rdy not available on this platform");
    }

    pub fn os_ctx_sw() {
        // No-op for testing
    }

    pub fn os_int_ctx_sw() {
        // No-op for testing
    }

    pub fn os_switch_context_exit() -> ! {
        panic!("os_switch_context_exit not available on this platform");
    }

    pub unsafe fn os_task_stk_init(
        _task_fn: OsTaskFn,
        _arg: *mut (),
        stk_base: *mut OsStkElement,
        stk_size: usize,
    ) -> *mut OsStkElement {
        // Return top of stack for testing
        unsafe { stk_base.add(stk_size - 1) }
    }

    pub fn os_cpu_systick_init(_cnts: u32) {
        // No-op for testing
    }

    pub fn os_fatal_error() -> ! {
        panic!("kernel fatal error");
    }
}

#[cfg(not(target_arch = "arm"))]
pub use stub::*;
