//! Data queue implementation
//!
//! Fixed-capacity FIFO of pointer-sized elements over a caller-supplied
//! slot array. A queue of capacity zero carries no buffer at all: every
//! send must rendezvous with a parked receiver and vice versa.

use crate::config::CFG_PARAM_CHECK_EN;
use crate::core::list::TaskList;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::task;
use crate::types::{OsMsgPtr, OsObjType, OsPendOn, OsTick};

/// Data queue
pub struct OsQueue {
    /// Identity marker
    obj_type: OsObjType,
    /// Tasks blocked because the buffer was full, FIFO; each carries its
    /// datum in the TCB element slot
    send_wait: TaskList,
    /// Tasks blocked because the buffer was empty, FIFO
    recv_wait: TaskList,
    /// Caller-supplied circular buffer; null when capacity is zero
    data_fifo: *mut OsMsgPtr,
    /// Buffer capacity in slots
    items_cnt: usize,
    /// Number of occupied slots
    filled: usize,
    /// Write index
    head_idx: usize,
    /// Read index
    tail_idx: usize,
}

impl OsQueue {
    /// Create a new, not-yet-created queue
    pub const fn new() -> Self {
        OsQueue {
            obj_type: OsObjType::None,
            send_wait: TaskList::new(),
            recv_wait: TaskList::new(),
            data_fifo: core::ptr::null_mut(),
            items_cnt: 0,
            filled: 0,
            head_idx: 0,
            tail_idx: 0,
        }
    }

    #[inline]
    fn check(&self) -> OsResult<()> {
        if self.obj_type != OsObjType::Queue {
            return Err(OsError::InvalidObj);
        }
        Ok(())
    }

    /// Initialize the queue over a slot array
    ///
    /// # Safety
    /// `data_fifo` must point to `items_cnt` slots that outlive the queue,
    /// or be null together with `items_cnt == 0`.
    pub unsafe fn create(&mut self, data_fifo: *mut OsMsgPtr, items_cnt: usize) -> OsResult<()> {
        if CFG_PARAM_CHECK_EN && self.obj_type == OsObjType::Queue {
            return Err(OsError::WrongParam);
        }

        critical_section(|_cs| {
            self.send_wait.init();
            self.recv_wait.init();

            self.data_fifo = data_fifo;
            self.items_cnt = if data_fifo.is_null() { 0 } else { items_cnt };

            self.filled = 0;
            self.head_idx = 0;
            self.tail_idx = 0;

            self.obj_type = OsObjType::Queue;
        });

        Ok(())
    }

    /// Delete the queue; every waiter on either list is woken with Deleted
    pub fn delete(&mut self) -> OsResult<()> {
        self.check()?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| unsafe {
            task::wait_list_notify_deleted(&mut self.send_wait);
            task::wait_list_notify_deleted(&mut self.recv_wait);
            self.obj_type = OsObjType::None;
            self.data_fifo = core::ptr::null_mut();
            self.items_cnt = 0;
            self.filled = 0;
        });

        sched::os_sched();
        Ok(())
    }

    // ============ Buffer FIFO ============

    fn fifo_write(&mut self, p_data: OsMsgPtr) -> OsResult<()> {
        if self.filled >= self.items_cnt {
            return Err(OsError::Timeout);
        }

        unsafe { *self.data_fifo.add(self.head_idx) = p_data };
        self.filled += 1;
        self.head_idx += 1;
        if self.head_idx >= self.items_cnt {
            self.head_idx = 0;
        }

        Ok(())
    }

    fn fifo_read(&mut self) -> OsResult<OsMsgPtr> {
        if self.filled == 0 {
            return Err(OsError::Timeout);
        }

        let p_data = unsafe { *self.data_fifo.add(self.tail_idx) };
        self.filled -= 1;
        self.tail_idx += 1;
        if self.tail_idx >= self.items_cnt {
            self.tail_idx = 0;
        }

        Ok(p_data)
    }

    // ============ Hand-off core ============

    unsafe fn send_inner(&mut self, p_data: OsMsgPtr) -> OsResult<()> {
        if let Some(head) = self.recv_wait.head() {
            // a receiver is parked: hand the datum over directly,
            // bypassing the buffer
            unsafe {
                (*head.as_ptr()).msg_ptr = p_data;
                task::task_wait_complete(head, OsError::None);
            }
            Ok(())
        } else {
            self.fifo_write(p_data)
        }
    }

    unsafe fn receive_inner(&mut self) -> OsResult<OsMsgPtr> {
        match self.fifo_read() {
            Ok(p_data) => {
                // room opened up: drain the first parked sender into the buffer
                if let Some(head) = self.send_wait.head() {
                    unsafe {
                        let sender_data = (*head.as_ptr()).msg_ptr;
                        if self.fifo_write(sender_data).is_err() {
                            crate::port::os_fatal_error();
                        }
                        task::task_wait_complete(head, OsError::None);
                    }
                }
                Ok(p_data)
            }
            Err(OsError::Timeout) => {
                // empty buffer with a parked sender happens only at capacity
                // zero: take the sender's datum directly
                if let Some(head) = self.send_wait.head() {
                    unsafe {
                        let p_data = (*head.as_ptr()).msg_ptr;
                        task::task_wait_complete(head, OsError::None);
                        Ok(p_data)
                    }
                } else {
                    Err(OsError::Timeout)
                }
            }
            Err(e) => Err(e),
        }
    }

    // ============ Public operations ============

    /// Send one element, waiting at most `timeout` ticks for room
    ///
    /// A zero timeout polls.
    pub fn send(&mut self, p_data: OsMsgPtr, timeout: OsTick) -> OsResult<()> {
        self.check()?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        let obj_ptr = self as *const OsQueue as *const ();

        let parked = critical_section(|_cs| unsafe {
            match self.send_inner(p_data) {
                Ok(()) => Ok(false),
                Err(OsError::Timeout) if timeout != 0 => {
                    if !kernel::KERNEL.is_running() {
                        return Err(OsError::WrongContext);
                    }
                    // stash the datum in the TCB slot until a receiver
                    // drains it
                    if let Some(cur) = kernel::tcb_cur_ptr() {
                        (*cur.as_ptr()).msg_ptr = p_data;
                    }
                    task::task_curr_to_wait(
                        Some(&mut self.send_wait),
                        OsPendOn::QueueSend,
                        obj_ptr,
                        timeout,
                    );
                    Ok(true)
                }
                Err(e) => Err(e),
            }
        })?;

        sched::os_sched();

        if parked {
            task::task_wait_rc()
        } else {
            Ok(())
        }
    }

    /// Try to send without waiting
    pub fn send_polling(&mut self, p_data: OsMsgPtr) -> OsResult<()> {
        self.send(p_data, 0)
    }

    /// Try to send from ISR context
    pub fn isend_polling(&mut self, p_data: OsMsgPtr) -> OsResult<()> {
        self.check()?;

        if !is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| unsafe { self.send_inner(p_data) })
    }

    /// Receive one element, waiting at most `timeout` ticks for data
    ///
    /// A zero timeout polls.
    pub fn receive(&mut self, timeout: OsTick) -> OsResult<OsMsgPtr> {
        self.check()?;

        if is_isr_context() {
            return Err(OsError::WrongContext);
        }

        let obj_ptr = self as *const OsQueue as *const ();

        let result = critical_section(|_cs| unsafe {
            match self.receive_inner() {
                Ok(p_data) => Ok(Some(p_data)),
                Err(OsError::Timeout) if timeout != 0 => {
                    if !kernel::KERNEL.is_running() {
                        return Err(OsError::WrongContext);
                    }
                    task::task_curr_to_wait(
                        Some(&mut self.recv_wait),
                        OsPendOn::QueueRecv,
                        obj_ptr,
                        timeout,
                    );
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })?;

        sched::os_sched();

        match result {
            Some(p_data) => Ok(p_data),
            None => {
                // the sender delivered into our TCB slot before waking us
                task::task_wait_rc()?;
                critical_section(|_cs| unsafe {
                    match kernel::tcb_cur_ptr() {
                        Some(cur) => Ok((*cur.as_ptr()).msg_ptr),
                        None => Err(OsError::Internal),
                    }
                })
            }
        }
    }

    /// Try to receive without waiting
    pub fn receive_polling(&mut self) -> OsResult<OsMsgPtr> {
        self.receive(0)
    }

    /// Try to receive from ISR context
    pub fn ireceive_polling(&mut self) -> OsResult<OsMsgPtr> {
        self.check()?;

        if !is_isr_context() {
            return Err(OsError::WrongContext);
        }

        critical_section(|_cs| unsafe { self.receive_inner() })
    }

    /// Number of occupied slots
    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Buffer capacity in slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.items_cnt
    }
}

impl Default for OsQueue {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsQueue {}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable data queue handle for application use
pub struct DataQueue {
    inner: UnsafeCell<OsQueue>,
}

unsafe impl Sync for DataQueue {}
unsafe impl Send for DataQueue {}

impl DataQueue {
    pub const fn new() -> Self {
        DataQueue {
            inner: UnsafeCell::new(OsQueue::new()),
        }
    }

    /// Initialize the queue over a static slot array; an empty slice gives
    /// a capacity-zero rendezvous queue
    pub fn create(&self, slots: &'static mut [OsMsgPtr]) -> OsResult<()> {
        let (ptr, len) = if slots.is_empty() {
            (core::ptr::null_mut(), 0)
        } else {
            (slots.as_mut_ptr(), slots.len())
        };
        unsafe { (*self.inner.get()).create(ptr, len) }
    }

    pub fn delete(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).delete() }
    }

    pub fn send(&self, p_data: OsMsgPtr, timeout: OsTick) -> OsResult<()> {
        unsafe { (*self.inner.get()).send(p_data, timeout) }
    }

    pub fn send_polling(&self, p_data: OsMsgPtr) -> OsResult<()> {
        unsafe { (*self.inner.get()).send_polling(p_data) }
    }

    pub fn isend_polling(&self, p_data: OsMsgPtr) -> OsResult<()> {
        unsafe { (*self.inner.get()).isend_polling(p_data) }
    }

    pub fn receive(&self, timeout: OsTick) -> OsResult<OsMsgPtr> {
        unsafe { (*self.inner.get()).receive(timeout) }
    }

    pub fn receive_polling(&self) -> OsResult<OsMsgPtr> {
        unsafe { (*self.inner.get()).receive_polling() }
    }

    pub fn ireceive_polling(&self) -> OsResult<OsMsgPtr> {
        unsafe { (*self.inner.get()).ireceive_polling() }
    }

    #[inline]
    pub fn filled(&self) -> usize {
        unsafe { (*self.inner.get()).filled() }
    }
}

impl Default for DataQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_queue(slots: &mut [OsMsgPtr]) -> OsQueue {
        let mut q = OsQueue::new();
        unsafe { q.create(slots.as_mut_ptr(), slots.len()).unwrap() };
        q
    }

    #[test]
    fn test_fifo_order() {
        let mut slots: [OsMsgPtr; 3] = [core::ptr::null_mut(); 3];
        let mut q = make_queue(&mut slots);

        q.fifo_write(1 as OsMsgPtr).unwrap();
        q.fifo_write(2 as OsMsgPtr).unwrap();
        q.fifo_write(3 as OsMsgPtr).unwrap();
        assert_eq!(q.fifo_write(4 as OsMsgPtr), Err(OsError::Timeout));

        assert_eq!(q.fifo_read(), Ok(1 as OsMsgPtr));
        assert_eq!(q.fifo_read(), Ok(2 as OsMsgPtr));

        // wrap-around
        q.fifo_write(4 as OsMsgPtr).unwrap();
        assert_eq!(q.fifo_read(), Ok(3 as OsMsgPtr));
        assert_eq!(q.fifo_read(), Ok(4 as OsMsgPtr));
        assert_eq!(q.fifo_read(), Err(OsError::Timeout));
    }

    #[test]
    fn test_send_receive_round_trip() {
        let mut slots: [OsMsgPtr; 2] = [core::ptr::null_mut(); 2];
        let mut q = make_queue(&mut slots);

        let p = 0x1234 as OsMsgPtr;
        q.send_polling(p).unwrap();
        assert_eq!(q.filled(), 1);
        assert_eq!(q.receive_polling(), Ok(p));
        assert_eq!(q.filled(), 0);
    }

    #[test]
    fn test_polling_never_parks() {
        let mut slots: [OsMsgPtr; 1] = [core::ptr::null_mut(); 1];
        let mut q = make_queue(&mut slots);

        q.send_polling(1 as OsMsgPtr).unwrap();
        assert_eq!(q.send_polling(2 as OsMsgPtr), Err(OsError::Timeout));

        q.receive_polling().unwrap();
        assert_eq!(q.receive_polling(), Err(OsError::Timeout));
    }

    #[test]
    fn test_zero_capacity_polling() {
        let mut q = OsQueue::new();
        unsafe { q.create(core::ptr::null_mut(), 0).unwrap() };

        // without a parked peer there is nothing to rendezvous with
        assert_eq!(q.send_polling(1 as OsMsgPtr), Err(OsError::Timeout));
        assert_eq!(q.receive_polling(), Err(OsError::Timeout));
    }

    #[test]
    fn test_invalid_obj() {
        let mut q = OsQueue::new();
        assert_eq!(q.send_polling(1 as OsMsgPtr), Err(OsError::InvalidObj));
        assert_eq!(q.receive_polling(), Err(OsError::InvalidObj));
        assert_eq!(q.delete(), Err(OsError::InvalidObj));
    }
}
