//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task. It is
//! statically allocated by the application and owned by the kernel between
//! creation and deletion.

use core::ptr::NonNull;

use crate::core::list::TaskList;
use crate::error::OsError;
use crate::types::{
    OsFlags, OsMsgPtr, OsNestingCtr, OsObjType, OsOpt, OsPendOn, OsPrio, OsStkElement,
    OsTaskState, OsTick, WAIT_INFINITE,
};

use super::OsTaskFn;

/// Task Control Block
#[repr(C)]
pub struct OsTcb {
    // ============ Stack pointer ============
    /// Current stack pointer, saved on context switch
    pub stk_ptr: *mut OsStkElement,

    // ============ Stack information ============
    /// Base of stack
    pub stk_base: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    // ============ Task identification ============
    /// Task name
    pub name: &'static str,
    /// Identity marker; `OsObjType::Task` while the task exists
    pub obj_type: OsObjType,

    // ============ Ready / wait list links ============
    /// Next TCB in the ready list or wait list this task is on
    pub list_next: Option<NonNull<OsTcb>>,
    /// Previous TCB in the ready list or wait list this task is on
    pub list_prev: Option<NonNull<OsTcb>>,

    // ============ Wait bookkeeping ============
    /// Wait list this task is parked on; null unless waiting on an object
    pub pend_list_ptr: *mut TaskList,
    /// Why the task is waiting
    pub pend_on: OsPendOn,
    /// The object waited on, tagged by `pend_on`
    pub pend_obj_ptr: *const (),
    /// Result delivered when the wait completes
    pub pend_rc: OsError,

    // ============ Timeout list links ============
    /// Next TCB in the global timeout list
    pub tick_next: Option<NonNull<OsTcb>>,
    /// Previous TCB in the global timeout list
    pub tick_prev: Option<NonNull<OsTcb>>,
    /// Ticks until the wait times out; WAIT_INFINITE when no timeout
    pub tick_remain: OsTick,

    // ============ Priority ============
    /// Current priority; may be boosted by mutex inheritance/ceiling
    pub prio: OsPrio,
    /// Priority requested at creation
    pub base_prio: OsPrio,

    // ============ State ============
    /// Current task state bitmask
    pub task_state: OsTaskState,
    /// Task options
    pub opt: OsOpt,

    // ============ Request counters (saturate at 1) ============
    /// Queued wakeup request
    pub wakeup_count: OsNestingCtr,
    /// Queued activate request
    pub activate_count: OsNestingCtr,

    // ============ Time slicing ============
    /// Ticks consumed at current priority since last rotation
    pub tslice_count: OsTick,

    // ============ Event group wait slots ============
    /// Pattern being waited for
    pub flags_pend: OsFlags,
    /// Wait mode and consume option
    pub flags_opt: OsOpt,
    /// Group pattern captured at wake time
    pub flags_rdy: OsFlags,

    // ============ Data queue element slot ============
    /// Datum carried while blocked on a full/empty queue
    pub msg_ptr: OsMsgPtr,

    // ============ Mutex ownership ============
    /// Head of intrusive list of mutexes currently held by this task
    pub mutex_own_head: *mut (),

    // ============ Task entry point ============
    /// Task function
    pub task_entry: Option<OsTaskFn>,
    /// Task argument
    pub task_arg: *mut (),
}

impl OsTcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        OsTcb {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_size: 0,

            name: "",
            obj_type: OsObjType::None,

            list_next: None,
            list_prev: None,

            pend_list_ptr: core::ptr::null_mut(),
            pend_on: OsPendOn::Nothing,
            pend_obj_ptr: core::ptr::null(),
            pend_rc: OsError::None,

            tick_next: None,
            tick_prev: None,
            tick_remain: WAIT_INFINITE,

            prio: 0,
            base_prio: 0,

            task_state: OsTaskState::DORMANT,
            opt: 0,

            wakeup_count: 0,
            activate_count: 0,

            tslice_count: 0,

            flags_pend: 0,
            flags_opt: 0,
            flags_rdy: 0,

            msg_ptr: core::ptr::null_mut(),

            mutex_own_head: core::ptr::null_mut(),

            task_entry: None,
            task_arg: core::ptr::null_mut(),
        }
    }

    /// Check if task is eligible to run
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.task_state.is_runnable()
    }

    /// Check if task is blocked on an object or sleeping
    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.task_state.is_waiting()
    }

    /// Check if task is suspended
    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.task_state.is_suspended()
    }

    /// Check if task exists but is not activated
    #[inline]
    pub fn is_dormant(&self) -> bool {
        self.task_state.is_dormant()
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
