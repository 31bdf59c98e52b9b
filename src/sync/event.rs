//! Event group implementation
//!
//! A bitmask pattern plus a wait list. Waiters name a requested pattern
//! and a mode (all bits / any bit), optionally consuming the matched bits
//! at wake time. Modifying the pattern scans the whole wait list, because
//! one set operation may satisfy several waiters with different patterns.

use crate::config::CFG_PARAM_CHECK_EN;
use crate::core::list::TaskList;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::task;
use crate::types::{opt, OsEventAttr, OsEventOp, OsFlags, OsObjType, OsOpt, OsPendOn, OsTick};

/// Check whether a waiter's condition is satisfied by the current pattern
fn cond_check(pattern: OsFlags, wait_pattern: OsFlags, wait_opt: OsOpt) -> bool {
    if (wait_opt & opt::EVENT_WAIT_ALL) != 0 {
        (pattern & wait_pattern) == wait_pattern
    } else {
        (pattern & wait_pattern) != 0
    }
}

/// Event group
pub struct OsEvent {
    /// Identity marker
    obj_type: OsObjType,
    /// Tasks waiting for a pattern, FIFO
    wait_list: TaskList,
    /// Current flag pattern
    pattern: OsFlags,
    /// Single-waiter or multi-waiter admission
    attr: OsEventAttr,
}

impl OsEvent {
    /// Create a new, not-yet-created event group
    pub const fn new() -> Self {
        OsEvent {
            obj_type: OsObjType::None,
            wait_list: TaskList::new(),
            pattern: 0,
            attr: OsEventAttr::Multi,
        }
    }

    #[inline]
    fn check(&self) -> OsResult<()> {
        if self.obj_type != OsObjType::Event {
            return Err(OsError::InvalidObj);
        }
        Ok(())
    }

    fn check_wait_args(wait_pattern: OsFlags, wait_opt: OsOpt) -> OsResult<()> {
        if CFG_PARAM_CHECK_EN {
            if wait_pattern == 0 {
                return Err(OsError::WrongParam);
            }
            let mode = wait_opt & (opt::EVENT_WAIT_ALL | opt::EVENT_WAIT_ANY);
            if mode != opt::EVENT_WAIT_ALL && mode != opt::EVENT_WAIT_ANY {
                return Err(OsError::WrongParam);
            }
        }
        Ok(())
    }

    /// Initialize the event group with an initial pattern
    pub fn create(&mut self, initial_pattern: OsFlags, attr: OsEventAttr) -> OsResult<()> {
        if CFG_PARAM_CHECK_EN && self.obj_type == OsObjType::Event {
            return Err(OsError::WrongParam);
        }

        critical_section(|_cs| {
            self.wait_list.init();
            self.pattern = initial_pattern;
            self.attr = attr;
            self.obj_type = OsObjType::Event;
        });

        Ok(())
    }

    /// Delete the event group; every waiter is woken with Deleted
    pub fn delete(&mut self) -> OsResult<()> {
        self.check()?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| unsafe {
            task::wait_list_notify_deleted(&mut self.wait_list);
            self.obj_type = OsObjType::None;
            self.pattern = 0;
        });

        sched::os_sched();
        Ok(())
    }

    /// Poll the condition: returns the actual pattern on success and
    /// consumes matched bits when requested
    fn wait_inner(&mut self, wait_pattern: OsFlags, wait_opt: OsOpt) -> OsResult<OsFlags> {
        // single-waiter groups admit one parked task at most
        if self.attr == OsEventAttr::Single && !self.wait_list.is_empty() {
            return Err(OsError::IllegalUse);
        }

        if cond_check(self.pattern, wait_pattern, wait_opt) {
            let actual = self.pattern;
            if (wait_opt & opt::EVENT_CONSUME) != 0 {
                self.pattern &= !wait_pattern;
            }
            Ok(actual)
        } else {
            Err(OsError::Timeout)
        }
    }

    /// Wait until the pattern satisfies the condition, at most `timeout`
    /// ticks; returns the pattern observed at the moment the condition held
    ///
    /// A zero timeout polls.
    pub fn wait(&mut self, wait_pattern: OsFlags, wait_opt: OsOpt, timeout: OsTick) -> OsResult<OsFlags> {
        self.check()?;
        Self::check_wait_args(wait_pattern, wait_opt)?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        let obj_ptr = self as *const OsEvent as *const ();

        let result = critical_section(|_cs| unsafe {
            match self.wait_inner(wait_pattern, wait_opt) {
                Ok(actual) => Ok(Some(actual)),
                Err(OsError::Timeout) if timeout != 0 => {
                    if !kernel::KERNEL.is_running() {
                        return Err(OsError::WrongContext);
                    }
                    if let Some(cur) = kernel::tcb_cur_ptr() {
                        let cur_ref = &mut *cur.as_ptr();
                        cur_ref.flags_pend = wait_pattern;
                        cur_ref.flags_opt = wait_opt;
                    }
                    task::task_curr_to_wait(
                        Some(&mut self.wait_list),
                        OsPendOn::Event,
                        obj_ptr,
                        timeout,
                    );
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })?;

        match result {
            Some(actual) => Ok(actual),
            None => {
                sched::os_sched();
                task::task_wait_rc()?;
                critical_section(|_cs| unsafe {
                    match kernel::tcb_cur_ptr() {
                        Some(cur) => Ok((*cur.as_ptr()).flags_rdy),
                        None => Err(OsError::Internal),
                    }
                })
            }
        }
    }

    /// Poll the condition without waiting
    pub fn wait_polling(&mut self, wait_pattern: OsFlags, wait_opt: OsOpt) -> OsResult<OsFlags> {
        self.wait(wait_pattern, wait_opt, 0)
    }

    /// Poll the condition from ISR context
    pub fn iwait(&mut self, wait_pattern: OsFlags, wait_opt: OsOpt) -> OsResult<OsFlags> {
        self.check()?;
        Self::check_wait_args(wait_pattern, wait_opt)?;

        if !is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| self.wait_inner(wait_pattern, wait_opt))
    }

    /// Wake every waiter whose condition is now satisfied
    ///
    /// # Safety
    /// Caller must hold the critical section.
    unsafe fn scan_wait_list(&mut self) {
        unsafe {
            let mut cur = self.wait_list.head();

            while let Some(tcb) = cur {
                let tcb_ref = &mut *tcb.as_ptr();
                // waking the task unlinks it, so read the successor first
                let next = tcb_ref.list_next;

                if cond_check(self.pattern, tcb_ref.flags_pend, tcb_ref.flags_opt) {
                    tcb_ref.flags_rdy = self.pattern;
                    task::task_wait_complete(tcb, OsError::None);

                    if (tcb_ref.flags_opt & opt::EVENT_CONSUME) != 0 {
                        self.pattern &= !tcb_ref.flags_pend;
                    }
                }

                cur = next;
            }
        }
    }

    fn modify_inner(&mut self, operation: OsEventOp, pattern: OsFlags) -> OsResult<()> {
        if CFG_PARAM_CHECK_EN && pattern == 0 {
            return Err(OsError::WrongParam);
        }

        match operation {
            OsEventOp::Clear => {
                self.pattern &= !pattern;
            }
            OsEventOp::Set => {
                self.pattern |= pattern;
                unsafe { self.scan_wait_list() };
            }
            OsEventOp::Toggle => {
                self.pattern ^= pattern;
                unsafe { self.scan_wait_list() };
            }
        }

        Ok(())
    }

    /// Modify the pattern: set, clear or toggle the given bits
    pub fn modify(&mut self, operation: OsEventOp, pattern: OsFlags) -> OsResult<()> {
        self.check()?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        let rc = critical_section(|_cs| self.modify_inner(operation, pattern));
        sched::os_sched();
        rc
    }

    /// Modify the pattern from ISR context
    pub fn imodify(&mut self, operation: OsEventOp, pattern: OsFlags) -> OsResult<()> {
        self.check()?;

        if !is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| self.modify_inner(operation, pattern))
    }

    /// Get the current pattern
    #[inline]
    pub fn pattern(&self) -> OsFlags {
        self.pattern
    }
}

impl Default for OsEvent {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable event group handle for application use
pub struct EventGroup {
    inner: UnsafeCell<OsEvent>,
}

unsafe impl Sync for EventGroup {}
unsafe impl Send for EventGroup {}

impl EventGroup {
    pub const fn new() -> Self {
        EventGroup {
            inner: UnsafeCell::new(OsEvent::new()),
        }
    }

    pub fn create(&self, initial_pattern: OsFlags, attr: OsEventAttr) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(initial_pattern, attr) }
    }

    pub fn delete(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).delete() }
    }

    pub fn wait(&self, pattern: OsFlags, wait_opt: OsOpt, timeout: OsTick) -> OsResult<OsFlags> {
        unsafe { (*self.inner.get()).wait(pattern, wait_opt, timeout) }
    }

    pub fn wait_polling(&self, pattern: OsFlags, wait_opt: OsOpt) -> OsResult<OsFlags> {
        unsafe { (*self.inner.get()).wait_polling(pattern, wait_opt) }
    }

    pub fn iwait(&self, pattern: OsFlags, wait_opt: OsOpt) -> OsResult<OsFlags> {
        unsafe { (*self.inner.get()).iwait(pattern, wait_opt) }
    }

    pub fn modify(&self, operation: OsEventOp, pattern: OsFlags) -> OsResult<()> {
        unsafe { (*self.inner.get()).modify(operation, pattern) }
    }

    pub fn imodify(&self, operation: OsEventOp, pattern: OsFlags) -> OsResult<()> {
        unsafe { (*self.inner.get()).imodify(operation, pattern) }
    }

    #[inline]
    pub fn pattern(&self) -> OsFlags {
        unsafe { (*self.inner.get()).pattern() }
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cond_check_and() {
        assert!(cond_check(0b0111, 0b0110, opt::EVENT_WAIT_ALL));
        assert!(!cond_check(0b0101, 0b0110, opt::EVENT_WAIT_ALL));
        assert!(!cond_check(0b0000, 0b0110, opt::EVENT_WAIT_ALL));
    }

    #[test]
    fn test_cond_check_or() {
        assert!(cond_check(0b0100, 0b0110, opt::EVENT_WAIT_ANY));
        assert!(cond_check(0b0010, 0b0110, opt::EVENT_WAIT_ANY));
        assert!(!cond_check(0b1001, 0b0110, opt::EVENT_WAIT_ANY));
    }

    #[test]
    fn test_set_clear_round_trip() {
        let mut evf = OsEvent::new();
        evf.create(0b0001, OsEventAttr::Multi).unwrap();

        evf.modify(OsEventOp::Set, 0b0110).unwrap();
        assert_eq!(evf.pattern(), 0b0111);

        evf.modify(OsEventOp::Clear, 0b0110).unwrap();
        assert_eq!(evf.pattern(), 0b0001);
    }

    #[test]
    fn test_toggle() {
        let mut evf = OsEvent::new();
        evf.create(0b1010, OsEventAttr::Multi).unwrap();

        evf.modify(OsEventOp::Toggle, 0b0110).unwrap();
        assert_eq!(evf.pattern(), 0b1100);
    }

    #[test]
    fn test_polling_wait() {
        let mut evf = OsEvent::new();
        evf.create(0b0011, OsEventAttr::Multi).unwrap();

        // satisfied without consume: pattern untouched
        assert_eq!(evf.wait_polling(0b0001, opt::EVENT_WAIT_ALL), Ok(0b0011));
        assert_eq!(evf.pattern(), 0b0011);

        // satisfied with consume: requested bits cleared
        assert_eq!(
            evf.wait_polling(0b0001, opt::EVENT_WAIT_ANY | opt::EVENT_CONSUME),
            Ok(0b0011)
        );
        assert_eq!(evf.pattern(), 0b0010);

        // not satisfied: polling returns Timeout
        assert_eq!(
            evf.wait_polling(0b0101, opt::EVENT_WAIT_ALL),
            Err(OsError::Timeout)
        );
    }

    #[test]
    fn test_wait_args_validated() {
        let mut evf = OsEvent::new();
        evf.create(0, OsEventAttr::Multi).unwrap();

        assert_eq!(
            evf.wait_polling(0, opt::EVENT_WAIT_ANY),
            Err(OsError::WrongParam)
        );
        assert_eq!(evf.wait_polling(0b1, 0), Err(OsError::WrongParam));
        assert_eq!(
            evf.wait_polling(0b1, opt::EVENT_WAIT_ALL | opt::EVENT_WAIT_ANY),
            Err(OsError::WrongParam)
        );
    }

    #[test]
    fn test_no_recreation() {
        let mut evf = OsEvent::new();
        evf.create(0, OsEventAttr::Multi).unwrap();
        assert_eq!(
            evf.create(0, OsEventAttr::Multi),
            Err(OsError::WrongParam)
        );
    }
}
