//! Mutex implementation with priority inheritance and priority ceiling
//!
//! A mutex carries one of two protocols, fixed at creation. Under
//! inheritance the holder is raised to the priority of its best waiter,
//! transitively along chains of blocked holders. Under ceiling the holder
//! is raised to the mutex's ceiling priority on acquisition and a task
//! whose base priority beats the ceiling may not lock at all. Both undo
//! their boosts by full recomputation whenever a waiter leaves or the
//! mutex is unlocked.

use core::ptr::NonNull;

use crate::config::{CFG_MUTEX_RECURSIVE_EN, CFG_PARAM_CHECK_EN, CFG_PRIO_IDLE};
use crate::core::list::TaskList;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::task;
use crate::task::OsTcb;
use crate::types::{OsMutexAttr, OsNestingCtr, OsObjType, OsPendOn, OsPrio, OsTick};

/// Mutex
pub struct OsMutex {
    /// Identity marker
    obj_type: OsObjType,
    /// Tasks waiting to lock, FIFO
    wait_list: TaskList,
    /// Task that holds the mutex; None if free
    holder: Option<NonNull<OsTcb>>,
    /// Locking protocol
    attr: OsMutexAttr,
    /// Ceiling priority; meaningful for the ceiling protocol only
    ceil_prio: OsPrio,
    /// Recursion counter
    cnt: OsNestingCtr,
    /// Links in the holder's owned-mutexes list
    own_next: Option<NonNull<OsMutex>>,
    own_prev: Option<NonNull<OsMutex>>,
}

impl OsMutex {
    /// Create a new, not-yet-created mutex
    pub const fn new() -> Self {
        OsMutex {
            obj_type: OsObjType::None,
            wait_list: TaskList::new(),
            holder: None,
            attr: OsMutexAttr::Inherit,
            ceil_prio: 0,
            cnt: 0,
            own_next: None,
            own_prev: None,
        }
    }

    #[inline]
    fn check(&self) -> OsResult<()> {
        if self.obj_type != OsObjType::Mutex {
            return Err(OsError::InvalidObj);
        }
        Ok(())
    }

    /// Initialize the mutex with the given protocol
    ///
    /// `ceil_prio` applies to the ceiling protocol and must leave the idle
    /// priority alone.
    pub fn create(&mut self, attr: OsMutexAttr, ceil_prio: OsPrio) -> OsResult<()> {
        if CFG_PARAM_CHECK_EN {
            if self.obj_type == OsObjType::Mutex {
                return Err(OsError::WrongParam);
            }
            if attr == OsMutexAttr::Ceiling && ceil_prio >= CFG_PRIO_IDLE {
                return Err(OsError::WrongParam);
            }
        }

        critical_section(|_cs| {
            self.wait_list.init();
            self.holder = None;
            self.attr = attr;
            self.ceil_prio = ceil_prio;
            self.cnt = 0;
            self.own_next = None;
            self.own_prev = None;
            self.obj_type = OsObjType::Mutex;
        });

        Ok(())
    }

    /// Delete the mutex
    ///
    /// Allowed for the holder or when the mutex is free. Every waiter is
    /// woken with Deleted and any boost the mutex contributed is undone.
    pub fn delete(&mut self) -> OsResult<()> {
        self.check()?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        let rc = critical_section(|_cs| unsafe {
            let cur = kernel::tcb_cur_ptr();
            if self.holder.is_some() && self.holder != cur {
                return Err(OsError::IllegalUse);
            }

            task::wait_list_notify_deleted(&mut self.wait_list);

            if let Some(owner) = self.holder {
                self.cnt = 0;
                self.do_unlock(owner);
            }

            self.obj_type = OsObjType::None;
            Ok(())
        });

        sched::os_sched();
        rc
    }

    /// Lock the mutex, waiting at most `timeout` ticks
    ///
    /// A zero timeout polls.
    pub fn lock(&mut self, timeout: OsTick) -> OsResult<()> {
        self.check()?;

        if is_isr_context() || !kernel::KERNEL.is_running() {
            return Err(OsError::WrongContext);
        }

        let obj_ptr = self as *const OsMutex as *const ();

        let parked = critical_section(|_cs| unsafe {
            let Some(cur) = kernel::tcb_cur_ptr() else {
                return Err(OsError::Internal);
            };

            if self.holder == Some(cur) {
                if CFG_MUTEX_RECURSIVE_EN {
                    if self.cnt == OsNestingCtr::MAX {
                        return Err(OsError::Overflow);
                    }
                    self.cnt += 1;
                    return Ok(false);
                } else {
                    return Err(OsError::IllegalUse);
                }
            }

            // a misconfigured ceiling cannot serve this task at all
            if self.attr == OsMutexAttr::Ceiling && (*cur.as_ptr()).base_prio < self.ceil_prio {
                return Err(OsError::IllegalUse);
            }

            if self.holder.is_none() {
                self.do_lock(cur);
                return Ok(false);
            }

            if timeout == 0 {
                return Err(OsError::Timeout);
            }

            if self.attr == OsMutexAttr::Inherit {
                if let Some(holder) = self.holder {
                    if (*cur.as_ptr()).prio < (*holder.as_ptr()).prio {
                        set_current_priority(holder, (*cur.as_ptr()).prio);
                    }
                }
            }

            let reason = match self.attr {
                OsMutexAttr::Inherit => OsPendOn::MutexInherit,
                OsMutexAttr::Ceiling => OsPendOn::MutexCeiling,
            };
            task::task_curr_to_wait(Some(&mut self.wait_list), reason, obj_ptr, timeout);
            Ok(true)
        })?;

        sched::os_sched();

        if parked {
            task::task_wait_rc()
        } else {
            Ok(())
        }
    }

    /// Try to lock without waiting
    pub fn lock_polling(&mut self) -> OsResult<()> {
        self.lock(0)
    }

    /// Unlock the mutex
    ///
    /// Only the holder may unlock; the mutex is released once the recursion
    /// count returns to zero.
    pub fn unlock(&mut self) -> OsResult<()> {
        self.check()?;

        if is_isr_context() || !kernel::KERNEL.is_running() {
            return Err(OsError::WrongContext);
        }

        let rc = critical_section(|_cs| unsafe {
            let Some(cur) = kernel::tcb_cur_ptr() else {
                return Err(OsError::Internal);
            };

            if self.holder != Some(cur) {
                return Err(OsError::IllegalUse);
            }

            if CFG_MUTEX_RECURSIVE_EN && self.cnt > 1 {
                self.cnt -= 1;
                return Ok(());
            }

            self.cnt = 0;
            self.do_unlock(cur);
            Ok(())
        });

        sched::os_sched();
        rc
    }

    /// Check if the mutex is held
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.holder.is_some()
    }

    /// Get the holder's current priority
    pub fn holder_prio(&self) -> Option<OsPrio> {
        self.holder.map(|ptr| unsafe { ptr.as_ref().prio })
    }

    // ============ Protocol internals ============

    /// Grant the free mutex to `cur`
    ///
    /// # Safety
    /// Caller must hold the critical section; the mutex must be free.
    unsafe fn do_lock(&mut self, cur: NonNull<OsTcb>) {
        self.holder = Some(cur);
        self.cnt = 1;
        unsafe {
            owned_list_add(cur, NonNull::from(&mut *self));

            if self.attr == OsMutexAttr::Ceiling {
                let cur_ref = &*cur.as_ptr();
                if cur_ref.prio > self.ceil_prio {
                    sched::change_running_task_priority(cur, self.ceil_prio);
                }
            }
        }
    }

    /// Release the mutex held by `owner`: restore the owner's priority
    /// from its remaining boosts and hand the mutex to the first waiter.
    ///
    /// # Safety
    /// Caller must hold the critical section; `owner` must hold the mutex.
    unsafe fn do_unlock(&mut self, owner: NonNull<OsTcb>) {
        unsafe {
            owned_list_remove(owner, NonNull::from(&mut *self));

            let target = recalc_owned_priority(owner);
            if target != (*owner.as_ptr()).prio {
                apply_priority(owner, target);
            }

            if let Some(waiter) = self.wait_list.head() {
                // the head waiter becomes the new holder
                self.holder = Some(waiter);
                self.cnt = 1;

                let waiter_ref = &mut *waiter.as_ptr();
                if self.attr == OsMutexAttr::Ceiling && waiter_ref.prio > self.ceil_prio {
                    waiter_ref.prio = self.ceil_prio;
                }

                task::task_wait_complete(waiter, OsError::None);
                owned_list_add(waiter, NonNull::from(&mut *self));
            } else {
                self.holder = None;
            }
        }
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Owned-mutexes list ============

/// Link a mutex into its holder's owned list
///
/// # Safety
/// Caller must hold the critical section; the mutex must not be linked.
unsafe fn owned_list_add(task: NonNull<OsTcb>, mutex: NonNull<OsMutex>) {
    unsafe {
        let task_ref = &mut *task.as_ptr();
        let mutex_ref = &mut *mutex.as_ptr();

        mutex_ref.own_prev = None;
        mutex_ref.own_next = NonNull::new(task_ref.mutex_own_head as *mut OsMutex);

        if let Some(mut old_head) = mutex_ref.own_next {
            old_head.as_mut().own_prev = Some(mutex);
        }

        task_ref.mutex_own_head = mutex.as_ptr() as *mut ();
    }
}

/// Unlink a mutex from its holder's owned list
///
/// # Safety
/// Caller must hold the critical section; the mutex must be linked.
unsafe fn owned_list_remove(task: NonNull<OsTcb>, mutex: NonNull<OsMutex>) {
    unsafe {
        let task_ref = &mut *task.as_ptr();
        let mutex_ref = &mut *mutex.as_ptr();

        match mutex_ref.own_prev {
            Some(mut prev) => prev.as_mut().own_next = mutex_ref.own_next,
            None => {
                task_ref.mutex_own_head = mutex_ref
                    .own_next
                    .map_or(core::ptr::null_mut(), |p| p.as_ptr() as *mut ());
            }
        }

        if let Some(mut next) = mutex_ref.own_next {
            next.as_mut().own_prev = mutex_ref.own_prev;
        }

        mutex_ref.own_next = None;
        mutex_ref.own_prev = None;
    }
}

// ============ Priority bookkeeping ============

/// Best (numerically smallest) priority among a mutex's waiters, seeded
/// with `ref_prio`
///
/// # Safety
/// Caller must hold the critical section.
unsafe fn find_max_blocked_priority(mutex: &OsMutex, ref_prio: OsPrio) -> OsPrio {
    let mut prio = ref_prio;
    let mut cur = mutex.wait_list.head();

    while let Some(tcb) = cur {
        let tcb_ref = unsafe { &*tcb.as_ptr() };
        if tcb_ref.prio < prio {
            prio = tcb_ref.prio;
        }
        cur = tcb_ref.list_next;
    }

    prio
}

/// The priority a task deserves from its base priority plus every mutex it
/// still holds: ceilings contribute their ceiling, inheritance mutexes the
/// best priority of their waiters.
///
/// # Safety
/// Caller must hold the critical section.
unsafe fn recalc_owned_priority(task: NonNull<OsTcb>) -> OsPrio {
    unsafe {
        let task_ref = &*task.as_ptr();
        let mut prio = task_ref.base_prio;

        let mut cur = task_ref.mutex_own_head as *const OsMutex;
        while !cur.is_null() {
            let mutex_ref = &*cur;
            match mutex_ref.attr {
                OsMutexAttr::Ceiling => {
                    if mutex_ref.ceil_prio < prio {
                        prio = mutex_ref.ceil_prio;
                    }
                }
                OsMutexAttr::Inherit => {
                    prio = find_max_blocked_priority(mutex_ref, prio);
                }
            }
            cur = mutex_ref
                .own_next
                .map_or(core::ptr::null(), |p| p.as_ptr() as *const OsMutex);
        }

        prio
    }
}

/// Move a task to a new current priority, wherever it is: runnable tasks
/// change ready list, waiting tasks only change the field (wait lists are
/// FIFO and never re-sorted).
///
/// # Safety
/// Caller must hold the critical section.
unsafe fn apply_priority(task: NonNull<OsTcb>, prio: OsPrio) {
    unsafe {
        let task_ref = &mut *task.as_ptr();
        if task_ref.task_state.is_runnable() {
            sched::change_running_task_priority(task, prio);
        } else {
            task_ref.prio = prio;
        }
    }
}

/// Raise a holder to the given priority, propagating along the chain of
/// inheritance mutexes it may itself be blocked on.
///
/// The walk stops at a holder that already runs at least that high, which
/// also bounds it on cyclic wait graphs.
///
/// # Safety
/// Caller must hold the critical section.
pub(crate) unsafe fn set_current_priority(mut task: NonNull<OsTcb>, prio: OsPrio) {
    loop {
        let task_ref = unsafe { &mut *task.as_ptr() };

        if task_ref.prio <= prio {
            return;
        }

        if task_ref.task_state.is_runnable() {
            unsafe { sched::change_running_task_priority(task, prio) };
            return;
        }

        if task_ref.task_state.is_waiting() && task_ref.pend_on == OsPendOn::MutexInherit {
            task_ref.prio = prio;

            let mutex_ref = unsafe { &*(task_ref.pend_obj_ptr as *const OsMutex) };
            if let Some(holder) = mutex_ref.holder {
                task = holder;
                continue;
            }
            return;
        }

        task_ref.prio = prio;
        return;
    }
}

/// Recompute a task's priority from scratch and propagate the change up
/// the chain of inheritance mutexes it is blocked on. Used when a waiter
/// departs, which may lower the boosts stepwise along the whole chain.
///
/// # Safety
/// Caller must hold the critical section.
unsafe fn mutex_prio_recalc(mut task: NonNull<OsTcb>) {
    loop {
        let task_ref = unsafe { &mut *task.as_ptr() };

        let target = unsafe { recalc_owned_priority(task) };
        if target == task_ref.prio {
            return;
        }

        let upstream = if task_ref.task_state.is_waiting()
            && task_ref.pend_on == OsPendOn::MutexInherit
        {
            unsafe { (*(task_ref.pend_obj_ptr as *const OsMutex)).holder }
        } else {
            None
        };

        unsafe { apply_priority(task, target) };

        match upstream {
            Some(holder) => task = holder,
            None => return,
        }
    }
}

/// Called by wait completion whenever a task stops waiting on a mutex for
/// any reason (hand-off, timeout, forced release, deletion): the holder's
/// boost may have depended on that waiter.
///
/// # Safety
/// Caller must hold the critical section; the waiter must already be off
/// the mutex's wait list.
pub(crate) unsafe fn on_waiter_left(mutex: *const OsMutex, waiter: NonNull<OsTcb>) {
    unsafe {
        let mutex_ref = &*mutex;

        if mutex_ref.obj_type != OsObjType::Mutex {
            return;
        }

        if let Some(holder) = mutex_ref.holder {
            // on hand-off the departing waiter is the new holder itself
            if holder != waiter {
                let holder_ref = &*holder.as_ptr();
                if holder_ref.prio != holder_ref.base_prio {
                    mutex_prio_recalc(holder);
                }
            }
        }
    }
}

/// Unlock every mutex owned by a task; used on exit and termination
///
/// # Safety
/// Caller must hold the critical section.
pub(crate) unsafe fn release_all_owned(task: NonNull<OsTcb>) {
    unsafe {
        while let Some(mutex) = NonNull::new((*task.as_ptr()).mutex_own_head as *mut OsMutex) {
            let mutex_ref = &mut *mutex.as_ptr();
            mutex_ref.cnt = 0;
            mutex_ref.do_unlock(task);
        }
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable mutex handle for application use
pub struct Mutex {
    inner: UnsafeCell<OsMutex>,
}

unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            inner: UnsafeCell::new(OsMutex::new()),
        }
    }

    pub fn create(&self, attr: OsMutexAttr, ceil_prio: OsPrio) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(attr, ceil_prio) }
    }

    pub fn delete(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).delete() }
    }

    pub fn lock(&self, timeout: OsTick) -> OsResult<()> {
        unsafe { (*self.inner.get()).lock(timeout) }
    }

    pub fn lock_polling(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).lock_polling() }
    }

    pub fn unlock(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).unlock() }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        unsafe { (*self.inner.get()).is_locked() }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::list::TaskList;
    use crate::types::OsTaskState;

    fn waiting_tcb(prio: OsPrio) -> OsTcb {
        let mut t = OsTcb::new();
        t.prio = prio;
        t.base_prio = prio;
        t.task_state = OsTaskState::WAIT;
        t
    }

    #[test]
    fn test_find_max_blocked_priority() {
        let mut m = OsMutex::new();
        m.create(OsMutexAttr::Inherit, 0).unwrap();

        let mut a = waiting_tcb(7);
        let mut b = waiting_tcb(3);
        let mut c = waiting_tcb(5);

        unsafe {
            let wl: &mut TaskList = &mut m.wait_list;
            wl.insert_tail(NonNull::from(&mut a));
            wl.insert_tail(NonNull::from(&mut b));
            wl.insert_tail(NonNull::from(&mut c));

            assert_eq!(find_max_blocked_priority(&m, 10), 3);
            assert_eq!(find_max_blocked_priority(&m, 2), 2);
        }
    }

    #[test]
    fn test_recalc_owned_priority() {
        let mut owner = waiting_tcb(6);
        owner.task_state = OsTaskState::WAIT;

        let mut m_inherit = OsMutex::new();
        m_inherit.create(OsMutexAttr::Inherit, 0).unwrap();
        let mut m_ceiling = OsMutex::new();
        m_ceiling.create(OsMutexAttr::Ceiling, 4).unwrap();

        let owner_ptr = NonNull::from(&mut owner);
        unsafe {
            owned_list_add(owner_ptr, NonNull::from(&mut m_inherit));
            owned_list_add(owner_ptr, NonNull::from(&mut m_ceiling));

            // no waiters: the ceiling is the only boost
            assert_eq!(recalc_owned_priority(owner_ptr), 4);

            // a priority-2 waiter on the inheritance mutex wins
            let mut w = waiting_tcb(2);
            m_inherit.wait_list.insert_tail(NonNull::from(&mut w));
            assert_eq!(recalc_owned_priority(owner_ptr), 2);

            m_inherit.wait_list.remove(NonNull::from(&mut w));
            owned_list_remove(owner_ptr, NonNull::from(&mut m_ceiling));
            assert_eq!(recalc_owned_priority(owner_ptr), 6);
        }
    }

    #[test]
    fn test_owned_list_add_remove() {
        let mut owner = waiting_tcb(5);
        let owner_ptr = NonNull::from(&mut owner);

        let mut m1 = OsMutex::new();
        m1.create(OsMutexAttr::Inherit, 0).unwrap();
        let mut m2 = OsMutex::new();
        m2.create(OsMutexAttr::Inherit, 0).unwrap();

        unsafe {
            owned_list_add(owner_ptr, NonNull::from(&mut m1));
            owned_list_add(owner_ptr, NonNull::from(&mut m2));

            // head is m2, linked to m1
            assert_eq!(owner.mutex_own_head as *const OsMutex, &m2 as *const _);
            assert_eq!(m2.own_next.map(|p| p.as_ptr() as *const OsMutex), Some(&m1 as *const _));

            owned_list_remove(owner_ptr, NonNull::from(&mut m2));
            assert_eq!(owner.mutex_own_head as *const OsMutex, &m1 as *const _);

            owned_list_remove(owner_ptr, NonNull::from(&mut m1));
            assert!(owner.mutex_own_head.is_null());
        }
    }

    #[test]
    fn test_ceiling_range_checked() {
        let mut m = OsMutex::new();
        assert_eq!(
            m.create(OsMutexAttr::Ceiling, CFG_PRIO_IDLE),
            Err(OsError::WrongParam)
        );
        assert!(m.create(OsMutexAttr::Ceiling, 4).is_ok());
    }
}
