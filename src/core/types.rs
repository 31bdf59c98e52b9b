//! Core type definitions for the kernel
//!
//! These types provide strong typing for RTOS primitives.

/// Task priority (0 = highest priority)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Semaphore counter type
pub type OsSemCtr = u32;

/// Nesting counter
pub type OsNestingCtr = u8;

/// Option flags for API calls
pub type OsOpt = u16;

/// Event flags type
pub type OsFlags = u32;

/// Stack element type
pub type OsStkElement = u32;

/// Data queue element: one pointer-sized slot
pub type OsMsgPtr = *mut ();

/// Timeout sentinel: wait forever
pub const WAIT_INFINITE: OsTick = OsTick::MAX;

/// Task state bitmask
///
/// States are a set of bits, not a single value. Legal combinations are
/// RUNNABLE, WAIT, SUSPEND, WAIT|SUSPEND and DORMANT; anything else is a
/// kernel bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsTaskState(u8);

impl OsTaskState {
    /// Task is on a ready list, eligible for selection
    pub const RUNNABLE: OsTaskState = OsTaskState(0x01);
    /// Task is blocked pending an event
    pub const WAIT: OsTaskState = OsTaskState(0x02);
    /// Task has been explicitly suspended
    pub const SUSPEND: OsTaskState = OsTaskState(0x04);
    /// Task exists but has not been activated (or has exited)
    pub const DORMANT: OsTaskState = OsTaskState(0x08);

    pub const fn empty() -> Self {
        OsTaskState(0)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn contains(self, other: OsTaskState) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub fn insert(&mut self, other: OsTaskState) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: OsTaskState) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn is_runnable(self) -> bool {
        self.contains(Self::RUNNABLE)
    }

    #[inline]
    pub fn is_waiting(self) -> bool {
        self.contains(Self::WAIT)
    }

    #[inline]
    pub fn is_suspended(self) -> bool {
        self.contains(Self::SUSPEND)
    }

    #[inline]
    pub fn is_dormant(self) -> bool {
        self.contains(Self::DORMANT)
    }
}

/// Why a task is waiting
///
/// Consulted on wait-complete to run reason-specific cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsPendOn {
    Nothing = 0,
    Sleep = 1,
    Sem = 2,
    Event = 3,
    QueueSend = 4,
    QueueRecv = 5,
    MutexInherit = 6,
    MutexCeiling = 7,
    FixedMem = 8,
}

/// Kernel object identity marker
///
/// Every kernel object carries one of these in a reserved field; API calls
/// verify it and refuse objects that were never created or already deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OsObjType {
    None = 0,
    Task = 0x5441534B,  // 'TASK'
    Sem = 0x53454D41,   // 'SEMA'
    Queue = 0x51554555, // 'QUEU'
    Event = 0x45564E54, // 'EVNT'
    Mutex = 0x4D555458, // 'MUTX'
}

/// Mutex locking protocol, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsMutexAttr {
    /// Priority inheritance: the holder is boosted to the priority of its
    /// highest-priority waiter, transitively.
    Inherit = 0,
    /// Priority ceiling: the holder is boosted to the mutex's ceiling
    /// priority on acquisition.
    Ceiling = 1,
}

/// Event group waiter admission, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsEventAttr {
    /// At most one task may wait on the group at a time
    Single = 0,
    /// Any number of tasks may wait concurrently
    Multi = 1,
}

/// Event group modify operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsEventOp {
    Set = 0,
    Clear = 1,
    Toggle = 2,
}

// ============ Option flags ============

pub mod opt {
    use super::OsOpt;

    pub const NONE: OsOpt = 0x0000;

    // Task options
    pub const TASK_START_ON_CREATION: OsOpt = 0x0001;
    pub const TASK_IDLE: OsOpt = 0x0002;
    pub const TASK_DELETE_ON_EXIT: OsOpt = 0x0004;

    // Event wait modes (exactly one of ALL/ANY must be given)
    pub const EVENT_WAIT_ALL: OsOpt = 0x0001;
    pub const EVENT_WAIT_ANY: OsOpt = 0x0002;
    /// Per-waiter auto-clear: consume the requested bits at wake time
    pub const EVENT_CONSUME: OsOpt = 0x0100;
}
