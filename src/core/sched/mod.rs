//! Scheduler module
//!
//! Priority-based preemptive scheduling with round-robin rotation inside a
//! priority level. The next task to run is maintained incrementally: every
//! transition that changes readiness updates `CPU_STATE.tcb_high_rdy`, and
//! the actual switch is pended to the context-switch trampoline.

use core::ptr::NonNull;

use crate::config::NO_TIME_SLICE;
use crate::critical::{is_isr_context, CriticalSection};
use crate::kernel;
use crate::task::OsTcb;
use crate::types::{OsPrio, OsTaskState};

/// Recompute the next task from the ready bitmap: head of the highest
/// non-empty ready list.
///
/// # Safety
/// Caller must hold the critical section.
pub(crate) unsafe fn find_next_task() {
    unsafe {
        let prio = kernel::prio_table().get_highest();
        if let Some(head) = kernel::rdy_list(prio).head() {
            kernel::set_tcb_high_rdy(head);
        }
    }
}

/// Make a task runnable: append it to the ready list for its priority and
/// take over as next task if it beats the current pick.
///
/// # Safety
/// Caller must hold the critical section; the task must not be on any list.
pub(crate) unsafe fn task_set_runnable(tcb: NonNull<OsTcb>) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    tcb_ref.task_state = OsTaskState::RUNNABLE;
    tcb_ref.pend_list_ptr = core::ptr::null_mut();
    let prio = tcb_ref.prio;

    unsafe {
        kernel::rdy_list(prio).insert_tail(tcb);
        kernel::prio_table().insert(prio);

        // less value - greater priority
        match kernel::tcb_high_rdy_ptr() {
            Some(next) if (*next.as_ptr()).prio <= prio => {}
            _ => kernel::set_tcb_high_rdy(tcb),
        }
    }
}

/// Remove a task from its ready list and re-select the next task.
///
/// The caller is responsible for setting the task's new state bits.
///
/// # Safety
/// Caller must hold the critical section; the task must be runnable.
pub(crate) unsafe fn task_clear_runnable(tcb: NonNull<OsTcb>) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    let prio = tcb_ref.prio;

    tcb_ref.task_state.remove(OsTaskState::RUNNABLE);

    unsafe {
        let rdy = kernel::rdy_list(prio);
        rdy.remove(tcb);

        if rdy.is_empty() {
            kernel::prio_table().remove(prio);
            find_next_task();
        } else if kernel::tcb_high_rdy_ptr() == Some(tcb) {
            if let Some(head) = rdy.head() {
                kernel::set_tcb_high_rdy(head);
            }
        }
    }
}

/// Move a runnable task to a different priority level
///
/// The task goes to the tail of the new ready list and the next task is
/// re-selected.
///
/// # Safety
/// Caller must hold the critical section; the task must be runnable.
pub(crate) unsafe fn change_running_task_priority(tcb: NonNull<OsTcb>, new_prio: OsPrio) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    let old_prio = tcb_ref.prio;

    if old_prio == new_prio {
        return;
    }

    unsafe {
        let old_rdy = kernel::rdy_list(old_prio);
        old_rdy.remove(tcb);
        if old_rdy.is_empty() {
            kernel::prio_table().remove(old_prio);
        }

        tcb_ref.prio = new_prio;

        kernel::rdy_list(new_prio).insert_tail(tcb);
        kernel::prio_table().insert(new_prio);
        find_next_task();
    }
}

/// Main scheduling point
///
/// Pends a context switch when the next task differs from the current one.
/// Called after any operation that may have changed task readiness. The
/// actual register save/restore happens in the port's switch trampoline
/// once interrupts are re-enabled.
pub fn os_sched() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    if is_isr_context() {
        return;
    }

    let _cs = CriticalSection::enter();

    unsafe {
        let next = kernel::tcb_high_rdy_ptr();
        if next.is_some() && next != kernel::tcb_cur_ptr() {
            crate::port::os_ctx_sw();
        }
    }
}

/// Round-robin rotation for tasks sharing the current priority
///
/// Runs once per tick. When the current task has consumed its priority's
/// quantum, it is moved from the head to the tail of its ready list.
///
/// # Safety
/// Caller must hold the critical section (tick ISR context).
pub(crate) unsafe fn round_robin_manage() {
    unsafe {
        let Some(cur) = kernel::tcb_cur_ptr() else {
            return;
        };
        let cur_ref = &mut *cur.as_ptr();

        if !cur_ref.task_state.is_runnable() {
            return;
        }

        let quantum = kernel::SCHED.get_unchecked().tslice[cur_ref.prio as usize];
        if quantum == NO_TIME_SLICE {
            return;
        }

        cur_ref.tslice_count += 1;
        if cur_ref.tslice_count > quantum {
            cur_ref.tslice_count = 0;

            let rdy = kernel::rdy_list(cur_ref.prio);
            if rdy.head() != rdy.tail() {
                if let Some(head) = rdy.remove_head() {
                    rdy.insert_tail(head);
                }
                find_next_task();
            }
        }
    }
}
