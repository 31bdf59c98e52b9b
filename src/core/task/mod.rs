//! Task management module
//!
//! Task creation and the task state machine: activate, suspend, resume,
//! sleep, wakeup, forced wait release, priority change, exit, terminate
//! and delete. Also hosts the two internal wait primitives shared by every
//! synchronization object: parking the current task and completing a wait.

mod tcb;

pub use tcb::OsTcb;

use core::ptr::NonNull;

use crate::config::{
    CFG_PARAM_CHECK_EN, CFG_PRIO_IDLE, CFG_PRIO_MAX, CFG_STK_FILL_VAL, CFG_STK_SIZE_MIN,
};
use crate::core::list::TaskList;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::types::{
    opt, OsObjType, OsOpt, OsPendOn, OsPrio, OsStkElement, OsTaskState, OsTick, WAIT_INFINITE,
};

/// Task entry point function type
///
/// Returning from the entry function lands in the port's task-exit
/// trampoline, which performs an exit without deletion.
pub type OsTaskFn = fn(*mut ());

/// Validate a task pointer's identity marker
#[inline]
fn check_task(task: NonNull<OsTcb>) -> OsResult<()> {
    if CFG_PARAM_CHECK_EN && unsafe { task.as_ref().obj_type } != OsObjType::Task {
        return Err(OsError::InvalidObj);
    }
    Ok(())
}

/// Reset the volatile part of a TCB to the dormant state.
///
/// Creation-time fields (entry, stack, base priority, name, options,
/// activate counter) are left alone.
fn set_dormant_state(tcb_ref: &mut OsTcb) {
    tcb_ref.list_next = None;
    tcb_ref.list_prev = None;
    tcb_ref.tick_next = None;
    tcb_ref.tick_prev = None;

    tcb_ref.pend_list_ptr = core::ptr::null_mut();
    tcb_ref.pend_on = OsPendOn::Nothing;
    tcb_ref.pend_obj_ptr = core::ptr::null();
    tcb_ref.pend_rc = OsError::None;

    tcb_ref.mutex_own_head = core::ptr::null_mut();

    tcb_ref.prio = tcb_ref.base_prio;
    tcb_ref.task_state = OsTaskState::DORMANT;

    tcb_ref.tick_remain = WAIT_INFINITE;
    tcb_ref.wakeup_count = 0;
    tcb_ref.tslice_count = 0;

    tcb_ref.flags_pend = 0;
    tcb_ref.flags_opt = 0;
    tcb_ref.flags_rdy = 0;
    tcb_ref.msg_ptr = core::ptr::null_mut();
}

// ============ Internal wait primitives ============

/// Park the current task: leave the ready list, enter the WAIT state and
/// (if given) the object's wait list, and arm the timeout.
///
/// # Safety
/// Caller must hold the critical section; the kernel must be running.
pub(crate) unsafe fn task_curr_to_wait(
    wait_list: Option<&mut TaskList>,
    pend_on: OsPendOn,
    obj: *const (),
    timeout: OsTick,
) {
    unsafe {
        let Some(cur) = kernel::tcb_cur_ptr() else {
            return;
        };

        sched::task_clear_runnable(cur);

        let cur_ref = &mut *cur.as_ptr();
        cur_ref.task_state = OsTaskState::WAIT;
        cur_ref.pend_on = pend_on;
        cur_ref.pend_obj_ptr = obj;
        cur_ref.pend_rc = OsError::None;
        cur_ref.tick_remain = timeout;

        if let Some(wl) = wait_list {
            cur_ref.pend_list_ptr = wl as *mut TaskList;
            wl.insert_tail(cur);
        }

        if timeout != WAIT_INFINITE {
            kernel::timer_list_insert(cur);
        }
    }
}

/// Complete a task's wait with the given return code.
///
/// Removes the task from its wait list and the timeout list, stores the
/// result, and makes it runnable unless it is also suspended. If the task
/// was blocked on a mutex, the holder's inherited priority is recomputed
/// now that this waiter is gone.
///
/// Returns true if the task became runnable.
///
/// # Safety
/// Caller must hold the critical section.
pub(crate) unsafe fn task_wait_complete(tcb: NonNull<OsTcb>, rc: OsError) -> bool {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    if !tcb_ref.task_state.is_waiting() {
        return false;
    }

    #[cfg(feature = "mutex")]
    let mutex_obj = match tcb_ref.pend_on {
        OsPendOn::MutexInherit | OsPendOn::MutexCeiling => tcb_ref.pend_obj_ptr,
        _ => core::ptr::null(),
    };

    unsafe {
        if !tcb_ref.pend_list_ptr.is_null() {
            (*tcb_ref.pend_list_ptr).remove(tcb);
            tcb_ref.pend_list_ptr = core::ptr::null_mut();
        }

        if tcb_ref.tick_remain != WAIT_INFINITE {
            kernel::timer_list_remove(tcb);
            tcb_ref.tick_remain = WAIT_INFINITE;
        }
    }

    tcb_ref.pend_rc = rc;
    tcb_ref.pend_on = OsPendOn::Nothing;
    tcb_ref.pend_obj_ptr = core::ptr::null();

    let became_runnable = if !tcb_ref.task_state.is_suspended() {
        unsafe { sched::task_set_runnable(tcb) };
        true
    } else {
        tcb_ref.task_state = OsTaskState::SUSPEND;
        false
    };

    #[cfg(feature = "mutex")]
    if !mutex_obj.is_null() {
        unsafe {
            crate::sync::mutex::on_waiter_left(mutex_obj as *const crate::sync::mutex::OsMutex, tcb)
        };
    }

    became_runnable
}

/// Wake every task on a wait list with the Deleted return code.
///
/// # Safety
/// Caller must hold the critical section.
pub(crate) unsafe fn wait_list_notify_deleted(wait_list: &mut TaskList) {
    while let Some(head) = wait_list.head() {
        unsafe { task_wait_complete(head, OsError::Deleted) };
    }
}

/// Consume the current task's wait return code after it was resumed.
pub(crate) fn task_wait_rc() -> OsResult<()> {
    critical_section(|_cs| unsafe {
        match kernel::tcb_cur_ptr() {
            Some(cur) => {
                let cur_ref = &mut *cur.as_ptr();
                let rc = cur_ref.pend_rc;
                cur_ref.pend_rc = OsError::None;
                if rc == OsError::None {
                    Ok(())
                } else {
                    Err(rc)
                }
            }
            None => Err(OsError::Internal),
        }
    })
}

// ============ Task creation ============

/// Create a new task (raw pointer variant)
///
/// The TCB is fully initialized, the stack is pre-filled with
/// [`CFG_STK_FILL_VAL`] and armed with an initial frame, and the task is
/// left DORMANT unless `opt::TASK_START_ON_CREATION` is given.
///
/// # Safety
/// `tcb` and `stk_base` must point to memory that outlives the task.
pub unsafe fn os_task_create_raw(
    tcb: *mut OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_size: usize,
    task_opt: OsOpt,
) -> OsResult<()> {
    if CFG_PARAM_CHECK_EN {
        if tcb.is_null() || stk_base.is_null() {
            return Err(OsError::WrongParam);
        }
        if stk_size < CFG_STK_SIZE_MIN {
            return Err(OsError::WrongParam);
        }
        if (prio as usize) >= CFG_PRIO_MAX {
            return Err(OsError::WrongParam);
        }
        // the lowest priority belongs to the idle task
        if prio == CFG_PRIO_IDLE && (task_opt & opt::TASK_IDLE) == 0 {
            return Err(OsError::WrongParam);
        }
        // no recreation of a live task
        if unsafe { (*tcb).obj_type } == OsObjType::Task {
            return Err(OsError::WrongParam);
        }
    }

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb };
        *tcb_ref = OsTcb::new();

        tcb_ref.name = name;
        tcb_ref.prio = prio;
        tcb_ref.base_prio = prio;
        tcb_ref.opt = task_opt;
        tcb_ref.task_entry = Some(task_fn);
        tcb_ref.task_arg = arg;
        tcb_ref.stk_base = stk_base;
        tcb_ref.stk_size = stk_size;
        tcb_ref.obj_type = OsObjType::Task;

        // Fill the stack space for high-watermark observation
        unsafe {
            for i in 0..stk_size {
                *stk_base.add(i) = CFG_STK_FILL_VAL;
            }
        }

        tcb_ref.stk_ptr = unsafe { crate::port::os_task_stk_init(task_fn, arg, stk_base, stk_size) };

        set_dormant_state(tcb_ref);

        crate::trace!("task created: {=str}", tcb_ref.name);

        if (task_opt & opt::TASK_START_ON_CREATION) != 0 {
            unsafe { sched::task_set_runnable(NonNull::new_unchecked(tcb)) };
        }
    });

    if kernel::KERNEL.is_running() {
        sched::os_sched();
    }

    Ok(())
}

/// Create a new task using static references
///
/// This is the recommended way to create tasks.
///
/// # Example
/// ```ignore
/// static mut TASK_TCB: OsTcb = OsTcb::new();
/// static mut TASK_STK: [OsStkElement; 256] = [0; 256];
///
/// fn my_task(_: *mut ()) {
///     loop { /* ... */ }
/// }
///
/// // In the application init callback:
/// os_task_create(
///     unsafe { &mut TASK_TCB },
///     unsafe { &mut TASK_STK },
///     "MyTask",
///     my_task,
///     5,
///     opt::TASK_START_ON_CREATION,
/// ).expect("Task creation failed");
/// ```
pub fn os_task_create(
    tcb: &'static mut OsTcb,
    stack: &'static mut [OsStkElement],
    name: &'static str,
    task_fn: OsTaskFn,
    prio: OsPrio,
    task_opt: OsOpt,
) -> OsResult<()> {
    unsafe {
        os_task_create_raw(
            tcb as *mut OsTcb,
            name,
            task_fn,
            core::ptr::null_mut(),
            prio,
            stack.as_mut_ptr(),
            stack.len(),
            task_opt,
        )
    }
}

// ============ Activation ============

unsafe fn task_activate_inner(task: NonNull<OsTcb>) -> OsResult<()> {
    let tcb_ref = unsafe { &mut *task.as_ptr() };

    if tcb_ref.task_state.is_dormant() {
        unsafe { sched::task_set_runnable(task) };
        Ok(())
    } else if tcb_ref.activate_count == 0 {
        tcb_ref.activate_count += 1;
        Ok(())
    } else {
        Err(OsError::Overflow)
    }
}

/// Activate a dormant task, or queue one activation request
pub fn os_task_activate(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    let rc = critical_section(|_cs| unsafe { task_activate_inner(task) });
    sched::os_sched();
    rc
}

/// Activate a task from ISR context
pub fn os_task_iactivate(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if !is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|_cs| unsafe { task_activate_inner(task) })
}

// ============ Suspend / resume ============

/// Suspend a task: a runnable task stops running, a waiting task keeps
/// waiting but will not become runnable when its wait completes
pub fn os_task_suspend(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|_cs| unsafe {
        let tcb_ref = &mut *task.as_ptr();

        if tcb_ref.task_state.is_suspended() {
            return Err(OsError::Overflow);
        }
        if tcb_ref.task_state.is_dormant() {
            return Err(OsError::WrongState);
        }
        if (tcb_ref.opt & opt::TASK_IDLE) != 0 {
            return Err(OsError::IllegalUse);
        }

        if tcb_ref.task_state.is_runnable() {
            sched::task_clear_runnable(task);
            tcb_ref.task_state = OsTaskState::SUSPEND;
        } else {
            tcb_ref.task_state.insert(OsTaskState::SUSPEND);
        }
        Ok(())
    })?;

    sched::os_sched();
    Ok(())
}

/// Release a task from the suspended state
pub fn os_task_resume(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|_cs| unsafe {
        let tcb_ref = &mut *task.as_ptr();

        if !tcb_ref.task_state.is_suspended() {
            return Err(OsError::WrongState);
        }

        if !tcb_ref.task_state.is_waiting() {
            sched::task_set_runnable(task);
        } else {
            tcb_ref.task_state.remove(OsTaskState::SUSPEND);
        }
        Ok(())
    })?;

    sched::os_sched();
    Ok(())
}

// ============ Sleep / wakeup ============

/// Put the current task to sleep for at most `timeout` ticks
///
/// A zero timeout is rejected. A queued wakeup request is consumed instead
/// of sleeping.
pub fn os_task_sleep(timeout: OsTick) -> OsResult<()> {
    if CFG_PARAM_CHECK_EN && timeout == 0 {
        return Err(OsError::WrongParam);
    }

    if is_isr_context() || !kernel::KERNEL.is_running() {
        return Err(OsError::WrongContext);
    }

    let slept = critical_section(|_cs| unsafe {
        let Some(cur) = kernel::tcb_cur_ptr() else {
            return false;
        };
        let cur_ref = &mut *cur.as_ptr();

        if cur_ref.wakeup_count > 0 {
            cur_ref.wakeup_count -= 1;
            false
        } else {
            task_curr_to_wait(None, OsPendOn::Sleep, core::ptr::null(), timeout);
            true
        }
    });

    if slept {
        sched::os_sched();
        // timeout expiry is the normal end of a sleep
        match task_wait_rc() {
            Ok(()) | Err(OsError::Timeout) => Ok(()),
            Err(e) => Err(e),
        }
    } else {
        Ok(())
    }
}

unsafe fn task_wakeup_inner(task: NonNull<OsTcb>) -> OsResult<()> {
    let tcb_ref = unsafe { &mut *task.as_ptr() };

    if tcb_ref.task_state.is_dormant() {
        return Err(OsError::WrongState);
    }

    if tcb_ref.task_state.is_waiting() && tcb_ref.pend_on == OsPendOn::Sleep {
        unsafe { task_wait_complete(task, OsError::None) };
        Ok(())
    } else if tcb_ref.wakeup_count == 0 {
        tcb_ref.wakeup_count += 1;
        Ok(())
    } else {
        Err(OsError::Overflow)
    }
}

/// Wake a sleeping task, or queue one wakeup request
pub fn os_task_wakeup(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    let rc = critical_section(|_cs| unsafe { task_wakeup_inner(task) });
    sched::os_sched();
    rc
}

/// Wake a sleeping task from ISR context
pub fn os_task_iwakeup(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if !is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|_cs| unsafe { task_wakeup_inner(task) })
}

// ============ Forced wait release ============

unsafe fn task_release_wait_inner(task: NonNull<OsTcb>) -> OsResult<()> {
    let tcb_ref = unsafe { task.as_ref() };

    if tcb_ref.task_state.is_waiting() {
        unsafe { task_wait_complete(task, OsError::None) };
        Ok(())
    } else {
        Err(OsError::WrongState)
    }
}

/// Forcibly complete another task's wait; the released wait returns Ok
pub fn os_task_release_wait(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    let rc = critical_section(|_cs| unsafe { task_release_wait_inner(task) });
    sched::os_sched();
    rc
}

/// Forcibly complete another task's wait from ISR context
pub fn os_task_irelease_wait(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if !is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|_cs| unsafe { task_release_wait_inner(task) })
}

// ============ Priority change ============

/// Change a task's base priority
///
/// An active mutex boost is never lowered by this call; the boosted value
/// keeps precedence until the boost is undone.
pub fn os_task_change_prio(task: NonNull<OsTcb>, new_prio: OsPrio) -> OsResult<()> {
    check_task(task)?;

    if CFG_PARAM_CHECK_EN && new_prio >= CFG_PRIO_IDLE {
        return Err(OsError::WrongParam);
    }

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|_cs| unsafe {
        let tcb_ref = &mut *task.as_ptr();

        if tcb_ref.task_state.is_dormant() {
            return Err(OsError::WrongState);
        }
        if (tcb_ref.opt & opt::TASK_IDLE) != 0 {
            return Err(OsError::IllegalUse);
        }

        let boosted = tcb_ref.prio != tcb_ref.base_prio;
        tcb_ref.base_prio = new_prio;

        let target = if boosted && tcb_ref.prio < new_prio {
            tcb_ref.prio
        } else {
            new_prio
        };

        if tcb_ref.prio != target {
            if tcb_ref.task_state.is_runnable() {
                sched::change_running_task_priority(task, target);
            } else {
                // wait lists are FIFO; position is not re-sorted
                tcb_ref.prio = target;
            }
        }
        Ok(())
    })?;

    sched::os_sched();
    Ok(())
}

// ============ Exit / terminate / delete ============

/// Terminate the current task. Never returns.
///
/// All owned mutexes are unlocked, the stack is re-armed for a future
/// activation, and a queued activate request restarts the task right away.
/// With `opt::TASK_DELETE_ON_EXIT` the task's identity is invalidated.
pub fn os_task_exit(task_opt: OsOpt) -> ! {
    if is_isr_context() || !kernel::KERNEL.is_running() {
        crate::port::os_fatal_error();
    }

    crate::port::os_int_disable();

    unsafe {
        let Some(cur) = kernel::tcb_cur_ptr() else {
            crate::port::os_fatal_error();
        };

        #[cfg(feature = "mutex")]
        crate::sync::mutex::release_all_owned(cur);

        sched::task_clear_runnable(cur);

        let cur_ref = &mut *cur.as_ptr();
        set_dormant_state(cur_ref);

        let entry = match cur_ref.task_entry {
            Some(f) => f,
            None => crate::port::os_fatal_error(),
        };
        cur_ref.stk_ptr = crate::port::os_task_stk_init(
            entry,
            cur_ref.task_arg,
            cur_ref.stk_base,
            cur_ref.stk_size,
        );

        if cur_ref.activate_count > 0 {
            cur_ref.activate_count -= 1;
            sched::task_set_runnable(cur);
        } else if (task_opt & opt::TASK_DELETE_ON_EXIT) != 0 {
            cur_ref.obj_type = OsObjType::None;
        }

        crate::port::os_switch_context_exit()
    }
}

/// Terminate another task: like exit, applied to the given task
pub fn os_task_terminate(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|_cs| unsafe {
        let tcb_ref = &mut *task.as_ptr();

        if tcb_ref.task_state.is_dormant() {
            return Err(OsError::WrongState);
        }
        if kernel::tcb_cur_ptr() == Some(task) {
            // a task cannot terminate itself; use os_task_exit
            return Err(OsError::WrongContext);
        }
        if (tcb_ref.opt & opt::TASK_IDLE) != 0 {
            return Err(OsError::IllegalUse);
        }

        if tcb_ref.task_state.is_waiting() {
            task_wait_complete(task, OsError::None);
        }
        if tcb_ref.task_state.is_runnable() {
            sched::task_clear_runnable(task);
        }

        #[cfg(feature = "mutex")]
        crate::sync::mutex::release_all_owned(task);

        set_dormant_state(tcb_ref);

        let entry = match tcb_ref.task_entry {
            Some(f) => f,
            None => return Err(OsError::Internal),
        };
        tcb_ref.stk_ptr = crate::port::os_task_stk_init(
            entry,
            tcb_ref.task_arg,
            tcb_ref.stk_base,
            tcb_ref.stk_size,
        );

        if tcb_ref.activate_count > 0 {
            tcb_ref.activate_count -= 1;
            sched::task_set_runnable(task);
        }
        Ok(())
    })?;

    sched::os_sched();
    Ok(())
}

/// Delete a dormant task: its TCB is released back to the application
pub fn os_task_delete(task: NonNull<OsTcb>) -> OsResult<()> {
    check_task(task)?;

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|_cs| unsafe {
        let tcb_ref = &mut *task.as_ptr();

        if !tcb_ref.task_state.is_dormant() {
            return Err(OsError::WrongState);
        }

        tcb_ref.obj_type = OsObjType::None;
        Ok(())
    })
}
