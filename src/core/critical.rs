//! Critical section handling
//!
//! Disabling interrupts is the only mutual-exclusion mechanism in the
//! kernel: every shared structure is mutated inside a critical section.
//! Sections nest; each guard saves the prior interrupt-enable state and
//! restores it on drop, so an inner section never re-enables interrupts
//! under an outer one. The [`CsCell`] type at the bottom of this module
//! ties access to the scheduler globals to a live guard.

use core::cell::UnsafeCell;

/// RAII guard for critical sections
///
/// When this guard is created, interrupts are disabled.
/// When it is dropped, interrupts are restored to their previous state.
pub struct CriticalSection {
    was_active: bool,
}

impl CriticalSection {
    /// Enter a critical section by disabling interrupts.
    ///
    /// Returns a guard that will restore interrupt state when dropped.
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "arm")]
        {
            let was_active = cortex_m::register::primask::read().is_active();
            cortex_m::interrupt::disable();
            CriticalSection { was_active }
        }

        #[cfg(not(target_arch = "arm"))]
        {
            CriticalSection { was_active: false }
        }
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        #[cfg(target_arch = "arm")]
        if self.was_active {
            unsafe { cortex_m::interrupt::enable() };
        }

        #[cfg(not(target_arch = "arm"))]
        {
            let _ = self.was_active;
        }
    }
}

/// Execute a closure with interrupts disabled
///
/// The closure receives a reference to the critical section guard,
/// which unlocks [`CsCell`]-protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}

/// Interior-mutable cell for the scheduler globals
///
/// Holds data that is only ever mutated under the critical section: the
/// ready lists, priority bitmap, time-slice table and timeout list all
/// live behind one of these. The guard-taking [`get`](CsCell::get) is the
/// front door; [`get_unchecked`](CsCell::get_unchecked) exists for kernel
/// internals that are already inside a section and cannot thread the
/// guard through (the tick path, the context-switch bookkeeping).
pub struct CsCell<T>(UnsafeCell<T>);

// SAFETY: all access paths require interrupts to be disabled, and there is
// a single core, so no two references exist at once.
unsafe impl<T> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    /// Wrap a value for critical-section-only access
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Borrow the inner value; the guard proves interrupts are off
    #[inline(always)]
    pub fn get(&self, _cs: &CriticalSection) -> &mut T {
        unsafe { &mut *self.0.get() }
    }

    /// Borrow the inner value without a guard
    ///
    /// # Safety
    /// The caller must already be inside a critical section (or in the
    /// single-threaded window before the kernel starts).
    #[inline(always)]
    pub unsafe fn get_unchecked(&self) -> &mut T {
        unsafe { &mut *self.0.get() }
    }
}
