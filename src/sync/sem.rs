//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.

use crate::config::CFG_PARAM_CHECK_EN;
use crate::core::list::TaskList;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::task;
use crate::types::{OsObjType, OsPendOn, OsSemCtr, OsTick};

/// Counting semaphore
pub struct OsSem {
    /// Identity marker
    obj_type: OsObjType,
    /// Tasks waiting to acquire, FIFO
    wait_list: TaskList,
    /// Current count
    count: OsSemCtr,
    /// Count ceiling
    max_count: OsSemCtr,
}

impl OsSem {
    /// Create a new, not-yet-created semaphore
    pub const fn new() -> Self {
        OsSem {
            obj_type: OsObjType::None,
            wait_list: TaskList::new(),
            count: 0,
            max_count: 0,
        }
    }

    #[inline]
    fn check(&self) -> OsResult<()> {
        if self.obj_type != OsObjType::Sem {
            return Err(OsError::InvalidObj);
        }
        Ok(())
    }

    /// Initialize the semaphore with an initial count and a maximum
    pub fn create(&mut self, count: OsSemCtr, max_count: OsSemCtr) -> OsResult<()> {
        if CFG_PARAM_CHECK_EN {
            if max_count == 0 || count > max_count {
                return Err(OsError::WrongParam);
            }
            if self.obj_type == OsObjType::Sem {
                return Err(OsError::WrongParam);
            }
        }

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| {
            self.wait_list.init();
            self.count = count;
            self.max_count = max_count;
            self.obj_type = OsObjType::Sem;
        });

        Ok(())
    }

    /// Delete the semaphore; every waiter is woken with Deleted
    pub fn delete(&mut self) -> OsResult<()> {
        self.check()?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| unsafe {
            task::wait_list_notify_deleted(&mut self.wait_list);
            self.obj_type = OsObjType::None;
            self.count = 0;
            self.max_count = 0;
        });

        sched::os_sched();
        Ok(())
    }

    fn signal_inner(&mut self) -> OsResult<()> {
        if let Some(head) = self.wait_list.head() {
            // hand off to the first waiter; the count stays untouched
            unsafe { task::task_wait_complete(head, OsError::None) };
            Ok(())
        } else if self.count < self.max_count {
            self.count += 1;
            Ok(())
        } else {
            Err(OsError::Overflow)
        }
    }

    /// Signal the semaphore
    pub fn signal(&mut self) -> OsResult<()> {
        self.check()?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        let rc = critical_section(|_cs| self.signal_inner());
        sched::os_sched();
        rc
    }

    /// Signal the semaphore from ISR context
    pub fn isignal(&mut self) -> OsResult<()> {
        self.check()?;

        if !is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| self.signal_inner())
    }

    /// Acquire the semaphore, waiting at most `timeout` ticks
    ///
    /// A zero timeout polls: the call returns Timeout immediately when the
    /// count is exhausted.
    pub fn acquire(&mut self, timeout: OsTick) -> OsResult<()> {
        self.check()?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        let obj_ptr = self as *const OsSem as *const ();

        let parked = critical_section(|_cs| {
            if self.count > 0 {
                self.count -= 1;
                return Ok(false);
            }

            if timeout == 0 {
                return Err(OsError::Timeout);
            }

            if !kernel::KERNEL.is_running() {
                return Err(OsError::WrongContext);
            }

            unsafe {
                task::task_curr_to_wait(Some(&mut self.wait_list), OsPendOn::Sem, obj_ptr, timeout);
            }
            Ok(true)
        })?;

        if parked {
            sched::os_sched();
            task::task_wait_rc()
        } else {
            Ok(())
        }
    }

    /// Try to acquire without waiting
    pub fn polling(&mut self) -> OsResult<()> {
        self.acquire(0)
    }

    /// Try to acquire from ISR context
    pub fn ipolling(&mut self) -> OsResult<()> {
        self.check()?;

        if !is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| {
            if self.count > 0 {
                self.count -= 1;
                Ok(())
            } else {
                Err(OsError::Timeout)
            }
        })
    }

    /// Get the current count
    #[inline]
    pub fn count(&self) -> OsSemCtr {
        self.count
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable semaphore handle for application use
pub struct Semaphore {
    inner: UnsafeCell<OsSem>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    pub const fn new() -> Self {
        Semaphore {
            inner: UnsafeCell::new(OsSem::new()),
        }
    }

    pub fn create(&self, count: OsSemCtr, max_count: OsSemCtr) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(count, max_count) }
    }

    pub fn delete(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).delete() }
    }

    pub fn acquire(&self, timeout: OsTick) -> OsResult<()> {
        unsafe { (*self.inner.get()).acquire(timeout) }
    }

    pub fn polling(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).polling() }
    }

    pub fn ipolling(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).ipolling() }
    }

    pub fn signal(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).signal() }
    }

    pub fn isignal(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).isignal() }
    }

    #[inline]
    pub fn count(&self) -> OsSemCtr {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}
