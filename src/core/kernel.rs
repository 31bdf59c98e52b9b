//! Global kernel state and startup
//!
//! This module owns the scheduler globals (ready lists, priority bitmap,
//! per-priority time slices, the global timeout list), the current/next
//! task pointers consumed by the context-switch trampoline, and the
//! one-shot system start entry point.

use core::ptr::NonNull;

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::config::{CFG_PRIO_IDLE, CFG_PRIO_MAX, CFG_STK_FILL_VAL, CFG_STK_SIZE_MIN, NO_TIME_SLICE};
use crate::core::list::TaskList;
use crate::critical::{critical_section, is_isr_context, CsCell};
use crate::error::{OsError, OsResult};
use crate::prio::PrioTable;
use crate::task::OsTcb;
use crate::types::{opt, OsNestingCtr, OsPrio, OsStkElement, OsTick};

// ============ Kernel State Structures ============

/// Atomic kernel flags
pub struct KernelFlags {
    running: AtomicBool,
    int_nesting: AtomicU8,
    tick_counter: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
            tick_counter: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.int_nesting.store(0, Ordering::SeqCst);
        self.tick_counter.store(0, Ordering::SeqCst);
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    /// Get the free-running tick counter
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    /// Set the free-running tick counter
    #[inline(always)]
    pub(crate) fn tick_set(&self, val: OsTick) {
        self.tick_counter.store(val, Ordering::Relaxed);
    }

    /// Increment and return tick count
    #[inline(always)]
    pub(crate) fn tick_increment(&self) -> OsTick {
        self.tick_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get interrupt nesting level
    #[inline(always)]
    pub fn int_nesting(&self) -> OsNestingCtr {
        self.int_nesting.load(Ordering::Relaxed)
    }

    /// Enter ISR
    #[inline(always)]
    pub(crate) fn int_enter(&self) {
        if self.is_running() {
            let nesting = self.int_nesting.load(Ordering::Relaxed);
            if nesting < OsNestingCtr::MAX {
                self.int_nesting.store(nesting + 1, Ordering::Relaxed);
            }
        }
    }

    /// Decrement int nesting
    #[inline(always)]
    pub(crate) fn int_nesting_dec(&self) -> OsNestingCtr {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        if nesting > 0 {
            self.int_nesting.store(nesting - 1, Ordering::Relaxed);
        }
        nesting.saturating_sub(1)
    }
}

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

/// Scheduler state
pub struct SchedState {
    pub(crate) prio_tbl: PrioTable,
    pub(crate) rdy_list: [TaskList; CFG_PRIO_MAX],
    pub(crate) tslice: [OsTick; CFG_PRIO_MAX],
    timer_list_head: Option<NonNull<OsTcb>>,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            prio_tbl: PrioTable::new(),
            rdy_list: [const { TaskList::new() }; CFG_PRIO_MAX],
            tslice: [NO_TIME_SLICE; CFG_PRIO_MAX],
            timer_list_head: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.prio_tbl.init();
        for list in self.rdy_list.iter_mut() {
            list.init();
        }
        self.tslice = [NO_TIME_SLICE; CFG_PRIO_MAX];
        self.timer_list_head = None;
    }

    /// Head of the global timeout list
    #[inline(always)]
    pub(crate) fn timer_list_head(&self) -> Option<NonNull<OsTcb>> {
        self.timer_list_head
    }

    /// Add a waiting task to the global timeout list
    pub(crate) unsafe fn timer_list_insert(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.tick_next = self.timer_list_head;
        tcb_ref.tick_prev = None;

        if let Some(mut old_head) = self.timer_list_head {
            unsafe { old_head.as_mut().tick_prev = Some(tcb) };
        }

        self.timer_list_head = Some(tcb);
    }

    /// Remove a task from the global timeout list
    pub(crate) unsafe fn timer_list_remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if let Some(mut prev) = tcb_ref.tick_prev {
            unsafe { prev.as_mut().tick_next = tcb_ref.tick_next };
        } else {
            self.timer_list_head = tcb_ref.tick_next;
        }

        if let Some(mut next) = tcb_ref.tick_next {
            unsafe { next.as_mut().tick_prev = tcb_ref.tick_prev };
        }

        tcb_ref.tick_next = None;
        tcb_ref.tick_prev = None;
    }
}

/// Global scheduler state instance
pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

/// IDLE task TCB
static mut IDLE_TCB: OsTcb = OsTcb::new();

/// User callback run once by the idle task before the first reschedule
static mut APPL_INIT: Option<fn()> = None;

/// User callback run on every idle iteration
static mut IDLE_HOOK: Option<fn()> = None;

// ============ CPU/Context Switch State ============

/// CPU context switch state
#[repr(C)]
pub struct CpuState {
    /// Current running task's TCB pointer
    pub tcb_cur: *mut OsTcb,
    /// Next task to run; differs from `tcb_cur` when a switch is pended
    pub tcb_high_rdy: *mut OsTcb,
    /// Current running task's priority
    pub prio_cur: OsPrio,
    /// Next task's priority
    pub prio_high_rdy: OsPrio,
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            tcb_cur: core::ptr::null_mut(),
            tcb_high_rdy: core::ptr::null_mut(),
            prio_cur: 0,
            prio_high_rdy: 0,
        }
    }

    pub fn reset(&mut self) {
        self.tcb_cur = core::ptr::null_mut();
        self.tcb_high_rdy = core::ptr::null_mut();
        self.prio_cur = 0;
        self.prio_high_rdy = 0;
    }
}

/// Global CPU state instance
#[no_mangle]
#[used]
pub static mut CPU_STATE: CpuState = CpuState::new();

// ============ Internal accessors for other modules ============

/// Get mutable reference to priority table
#[inline(always)]
pub(crate) unsafe fn prio_table() -> &'static mut PrioTable {
    unsafe { &mut SCHED.get_unchecked().prio_tbl }
}

/// Get reference to ready list for a priority
#[inline(always)]
pub(crate) unsafe fn rdy_list(prio: OsPrio) -> &'static mut TaskList {
    unsafe { &mut SCHED.get_unchecked().rdy_list[prio as usize] }
}

/// Get current TCB pointer as Option<NonNull>
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn tcb_cur_ptr() -> Option<NonNull<OsTcb>> {
    unsafe { NonNull::new(CPU_STATE.tcb_cur) }
}

/// Get next-task TCB pointer as Option<NonNull>
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn tcb_high_rdy_ptr() -> Option<NonNull<OsTcb>> {
    unsafe { NonNull::new(CPU_STATE.tcb_high_rdy) }
}

/// Set the next task to run
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn set_tcb_high_rdy(tcb: NonNull<OsTcb>) {
    unsafe {
        CPU_STATE.tcb_high_rdy = tcb.as_ptr();
        CPU_STATE.prio_high_rdy = tcb.as_ref().prio;
    }
}

// ============ Timeout list wrappers ============

/// Add a task to the global timeout list
pub(crate) unsafe fn timer_list_insert(tcb: NonNull<OsTcb>) {
    unsafe { SCHED.get_unchecked().timer_list_insert(tcb) }
}

/// Remove a task from the global timeout list
pub(crate) unsafe fn timer_list_remove(tcb: NonNull<OsTcb>) {
    unsafe { SCHED.get_unchecked().timer_list_remove(tcb) }
}

/// Get head of the global timeout list
#[inline]
pub(crate) unsafe fn timer_list_head() -> Option<NonNull<OsTcb>> {
    unsafe { SCHED.get_unchecked().timer_list_head() }
}

// ============ Initialization ============

/// Internal IDLE task body: runs the application init callback once with
/// interrupts disabled, then loops over the idle hook forever.
#[allow(static_mut_refs)]
fn os_idle_task(_: *mut ()) {
    crate::port::os_int_disable();
    if let Some(cb) = unsafe { APPL_INIT } {
        cb();
    }
    crate::port::os_int_enable();

    loop {
        if let Some(hook) = unsafe { IDLE_HOOK } {
            hook();
        }
    }
}

/// Reset global kernel state
#[allow(static_mut_refs)]
unsafe fn os_reset_globals() {
    KERNEL.reset();

    unsafe {
        CPU_STATE.reset();
        SCHED.get_unchecked().reset();
    }
}

// ============ Public API ============

/// Start the kernel. This function never returns under normal operation.
///
/// The caller supplies the idle task stack, the interrupt stack, an
/// application init callback and an idle hook. The idle task runs
/// `appl_init` once with interrupts disabled (this is where application
/// tasks and objects are created), then loops over `idle_hook`.
///
/// # Returns
/// * `Err(OsError::WrongParam)` - a stack buffer is too small
/// * `Err(OsError::WrongContext)` - called from ISR or kernel already running
#[allow(static_mut_refs)]
pub fn os_sys_start(
    idle_stack: &'static mut [OsStkElement],
    int_stack: &'static mut [OsStkElement],
    appl_init: fn(),
    idle_hook: fn(),
) -> OsResult<()> {
    if crate::config::CFG_PARAM_CHECK_EN
        && (idle_stack.len() < CFG_STK_SIZE_MIN || int_stack.is_empty())
    {
        return Err(OsError::WrongParam);
    }

    if is_isr_context() || KERNEL.is_running() {
        return Err(OsError::WrongContext);
    }

    unsafe { os_reset_globals() };

    // Fill interrupt stack space for high-watermark observation
    for elem in int_stack.iter_mut() {
        *elem = CFG_STK_FILL_VAL;
    }
    let int_sp = unsafe { int_stack.as_mut_ptr().add(int_stack.len()) };

    critical_section(|_cs| {
        unsafe {
            APPL_INIT = Some(appl_init);
            IDLE_HOOK = Some(idle_hook);

            crate::task::os_task_create_raw(
                &raw mut IDLE_TCB,
                "Idle",
                os_idle_task,
                core::ptr::null_mut(),
                CFG_PRIO_IDLE,
                idle_stack.as_mut_ptr(),
                idle_stack.len(),
                opt::TASK_IDLE | opt::TASK_START_ON_CREATION,
            )?;

            // The idle task is both the first current and the first next task
            CPU_STATE.tcb_cur = &raw mut IDLE_TCB;
            CPU_STATE.prio_cur = CFG_PRIO_IDLE;
        }
        Ok(())
    })?;

    KERNEL.set_running(true);

    crate::info!("kernel started");

    crate::port::os_cpu_systick_init(crate::port::CPU_CLOCK_HZ / crate::config::CFG_TICK_RATE_HZ);

    unsafe { crate::port::os_start_high_rdy(int_sp) }
}

/// Enter ISR: bump the interrupt nesting level
///
/// Must be paired with [`os_int_exit`] at the end of the handler.
pub fn os_int_enter() {
    KERNEL.int_enter();
}

/// Exit ISR: pend a context switch if the outermost interrupt made a
/// higher-priority task runnable
pub fn os_int_exit() {
    if !KERNEL.is_running() {
        return;
    }

    let _cs = crate::critical::CriticalSection::enter();

    if KERNEL.int_nesting() == 0 {
        return;
    }

    let new_nesting = KERNEL.int_nesting_dec();

    if new_nesting == 0 {
        unsafe {
            let next = tcb_high_rdy_ptr();
            if next.is_some() && next != tcb_cur_ptr() {
                crate::port::os_int_ctx_sw();
            }
        }
    }
}

/// Set the round-robin quantum for one priority level
///
/// A value of [`NO_TIME_SLICE`] (zero) disables time slicing at that
/// priority. The idle priority cannot be sliced.
pub fn os_sys_tslice_set(prio: OsPrio, ticks: OsTick) -> OsResult<()> {
    if crate::config::CFG_PARAM_CHECK_EN && prio >= CFG_PRIO_IDLE {
        return Err(OsError::WrongParam);
    }

    if is_isr_context() {
        return Err(OsError::WrongContext);
    }

    critical_section(|cs| {
        SCHED.get(cs).tslice[prio as usize] = ticks;
    });

    Ok(())
}
