//! Host-run tests for the kernel's data-structure layer
//!
//! Everything here exercises code that needs no live context switch: the
//! priority bitmap, configuration invariants, the error set, the task
//! state machine types, and the polling paths of the four synchronization
//! objects.

#[cfg(test)]
mod prio_tests {
    use corten::config::{CFG_PRIO_IDLE, CFG_PRIO_MAX};
    use corten::prio::PrioTable;

    #[test]
    fn test_word_edge_bits() {
        // all priorities share one bitmap word; both edge bits must map
        // cleanly onto their priorities
        let mut table = PrioTable::new();
        let last = (CFG_PRIO_MAX - 1) as u8;

        table.insert(0);
        table.insert(last);
        assert!(table.is_set(0));
        assert!(table.is_set(last));
        assert_eq!(table.get_highest(), 0);

        table.remove(0);
        assert_eq!(table.get_highest(), last);

        table.remove(last);
        assert!(table.is_empty());
    }

    #[test]
    fn test_empty_resolves_to_idle() {
        // the fallback of the find-first-set scan is the idle priority
        let table = PrioTable::new();
        assert_eq!(table.get_highest(), CFG_PRIO_IDLE);
    }

    #[test]
    fn test_highest_follows_scattered_removals() {
        let mut table = PrioTable::new();
        for p in [24u8, 3, 17, 9] {
            table.insert(p);
        }

        let mut drained = Vec::new();
        while !table.is_empty() {
            let p = table.get_highest();
            drained.push(p);
            table.remove(p);
        }
        assert_eq!(drained, vec![3, 9, 17, 24]);
    }

    #[test]
    fn test_no_per_priority_counting() {
        // a second insert of the same priority is absorbed and a single
        // remove clears the bit; multiplicity belongs to the ready list
        let mut table = PrioTable::new();
        table.insert(7);
        table.insert(7);
        table.remove(7);
        assert!(!table.is_set(7));
        assert!(table.is_empty());
    }

    #[test]
    fn test_init_clears_everything() {
        let mut table = PrioTable::new();
        for p in 0..CFG_PRIO_MAX as u8 {
            table.insert(p);
        }

        table.init();
        assert!(table.is_empty());
        assert_eq!(table.get_highest(), CFG_PRIO_IDLE);
    }
}

#[cfg(test)]
mod error_tests {
    use corten::error::{OsError, OsResult};

    #[test]
    fn test_only_none_counts_as_ok() {
        // the set is closed: every code other than None is a failure
        let all = [
            OsError::None,
            OsError::Timeout,
            OsError::Overflow,
            OsError::WrongContext,
            OsError::WrongState,
            OsError::WrongParam,
            OsError::InvalidObj,
            OsError::IllegalUse,
            OsError::Deleted,
            OsError::Internal,
        ];
        for code in all {
            assert_eq!(code.is_ok(), code == OsError::None, "{:?}", code);
            assert_eq!(code.is_err(), code != OsError::None, "{:?}", code);
        }
    }

    #[test]
    fn test_question_mark_propagation() {
        fn poll() -> OsResult<u32> {
            Err(OsError::Timeout)
        }
        fn caller() -> OsResult<u32> {
            let v = poll()?;
            Ok(v + 1)
        }
        assert_eq!(caller(), Err(OsError::Timeout));
    }
}

#[cfg(test)]
mod state_tests {
    use corten::types::OsTaskState;

    #[test]
    fn test_state_bits() {
        let mut state = OsTaskState::RUNNABLE;
        assert!(state.is_runnable());
        assert!(!state.is_waiting());

        state = OsTaskState::WAIT;
        assert!(state.is_waiting());
        assert!(!state.is_suspended());

        // WAIT | SUSPEND is a legal combination
        state.insert(OsTaskState::SUSPEND);
        assert!(state.is_waiting());
        assert!(state.is_suspended());

        state.remove(OsTaskState::SUSPEND);
        assert!(state.is_waiting());
        assert!(!state.is_suspended());
    }

    #[test]
    fn test_dormant_exclusive() {
        let state = OsTaskState::DORMANT;
        assert!(state.is_dormant());
        assert!(!state.is_runnable());
        assert!(!state.is_waiting());
        assert!(!state.is_suspended());
    }

    #[test]
    fn test_tcb_defaults() {
        use corten::task::OsTcb;
        use corten::types::WAIT_INFINITE;

        let tcb = OsTcb::new();
        assert!(tcb.is_dormant());
        assert_eq!(tcb.tick_remain, WAIT_INFINITE);
        assert_eq!(tcb.wakeup_count, 0);
        assert_eq!(tcb.activate_count, 0);
    }
}

#[cfg(test)]
mod types_tests {
    use corten::types::opt::*;
    use corten::types::*;

    #[test]
    fn test_pend_on_enum() {
        assert_ne!(OsPendOn::Sleep, OsPendOn::Sem);
        assert_ne!(OsPendOn::MutexInherit, OsPendOn::MutexCeiling);
    }

    #[test]
    fn test_option_flags() {
        assert_eq!(NONE, 0);

        // wait mode flags are distinct from the consume flag
        assert_eq!(EVENT_WAIT_ALL & EVENT_WAIT_ANY, 0);
        assert_eq!((EVENT_WAIT_ALL | EVENT_WAIT_ANY) & EVENT_CONSUME, 0);

        let combined = EVENT_WAIT_ANY | EVENT_CONSUME;
        assert_eq!(combined & EVENT_CONSUME, EVENT_CONSUME);
    }

    #[test]
    fn test_infinite_sentinel() {
        assert_eq!(WAIT_INFINITE, u32::MAX);
    }
}

#[cfg(test)]
mod config_tests {
    use corten::config::*;
    use corten::port::CPU_CLOCK_HZ;

    #[test]
    fn test_priorities_fit_one_bitmap_word() {
        assert!(CFG_PRIO_MAX >= 8, "too few priority levels to be useful");
        assert!(CFG_PRIO_MAX <= 32, "ready bitmap is a single u32 word");
        assert_eq!(CFG_PRIO_IDLE as usize, CFG_PRIO_MAX - 1);
    }

    #[test]
    fn test_tick_reload_fits_systick() {
        // the tick rate must divide the core clock exactly, and the
        // resulting reload value must fit SysTick's 24-bit counter
        assert_eq!(CPU_CLOCK_HZ % CFG_TICK_RATE_HZ, 0);
        let reload = CPU_CLOCK_HZ / CFG_TICK_RATE_HZ - 1;
        assert!(reload < (1 << 24));
    }

    #[test]
    fn test_stack_minimum_covers_context_frame() {
        // the port parks 17 words of context plus alignment slack
        assert!(CFG_STK_SIZE_MIN >= 32);
    }

    #[test]
    fn test_time_slice_sentinel_disables() {
        assert_eq!(NO_TIME_SLICE, 0);
    }
}

#[cfg(test)]
mod sem_tests {
    use corten::error::OsError;
    use corten::sem::Semaphore;

    #[test]
    fn test_create_and_count() {
        let sem = Semaphore::new();
        sem.create(2, 4).unwrap();
        assert_eq!(sem.count(), 2);
    }

    #[test]
    fn test_create_validates() {
        let sem = Semaphore::new();
        assert_eq!(sem.create(1, 0), Err(OsError::WrongParam));
        assert_eq!(sem.create(5, 4), Err(OsError::WrongParam));

        sem.create(0, 1).unwrap();
        // no recreation of a live object
        assert_eq!(sem.create(0, 1), Err(OsError::WrongParam));
    }

    #[test]
    fn test_signal_and_poll() {
        let sem = Semaphore::new();
        sem.create(0, 2).unwrap();

        assert_eq!(sem.polling(), Err(OsError::Timeout));

        sem.signal().unwrap();
        assert_eq!(sem.count(), 1);

        sem.polling().unwrap();
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_signal_overflow() {
        let sem = Semaphore::new();
        sem.create(1, 1).unwrap();

        assert_eq!(sem.signal(), Err(OsError::Overflow));
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn test_signal_then_acquire_is_noop_on_count() {
        let sem = Semaphore::new();
        sem.create(1, 4).unwrap();

        sem.signal().unwrap();
        sem.polling().unwrap();
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn test_delete_invalidates() {
        let sem = Semaphore::new();
        sem.create(0, 1).unwrap();
        sem.delete().unwrap();

        assert_eq!(sem.polling(), Err(OsError::InvalidObj));
        assert_eq!(sem.signal(), Err(OsError::InvalidObj));
        assert_eq!(sem.delete(), Err(OsError::InvalidObj));

        // the storage can be created again after deletion
        sem.create(0, 1).unwrap();
    }
}

#[cfg(test)]
mod queue_tests {
    use corten::error::OsError;
    use corten::queue::DataQueue;
    use corten::types::OsMsgPtr;

    fn leak_slots(n: usize) -> &'static mut [OsMsgPtr] {
        Box::leak(vec![core::ptr::null_mut::<()>() as OsMsgPtr; n].into_boxed_slice())
    }

    #[test]
    fn test_send_receive_round_trip() {
        let q = DataQueue::new();
        q.create(leak_slots(2)).unwrap();

        let p = 0xBEEF as OsMsgPtr;
        q.send_polling(p).unwrap();
        assert_eq!(q.filled(), 1);
        assert_eq!(q.receive_polling(), Ok(p));
        assert_eq!(q.filled(), 0);
    }

    #[test]
    fn test_full_and_empty_polling() {
        let q = DataQueue::new();
        q.create(leak_slots(1)).unwrap();

        q.send_polling(1 as OsMsgPtr).unwrap();
        assert_eq!(q.send_polling(2 as OsMsgPtr), Err(OsError::Timeout));

        assert_eq!(q.receive_polling(), Ok(1 as OsMsgPtr));
        assert_eq!(q.receive_polling(), Err(OsError::Timeout));
    }

    #[test]
    fn test_zero_capacity_queue() {
        let q = DataQueue::new();
        q.create(leak_slots(0)).unwrap();

        // no buffer, no parked peer: polling cannot complete
        assert_eq!(q.send_polling(1 as OsMsgPtr), Err(OsError::Timeout));
        assert_eq!(q.receive_polling(), Err(OsError::Timeout));
    }

    #[test]
    fn test_delete_invalidates() {
        let q = DataQueue::new();
        q.create(leak_slots(1)).unwrap();
        q.delete().unwrap();
        assert_eq!(q.send_polling(1 as OsMsgPtr), Err(OsError::InvalidObj));
    }
}

#[cfg(test)]
mod event_tests {
    use corten::error::OsError;
    use corten::event::EventGroup;
    use corten::types::opt;
    use corten::types::{OsEventAttr, OsEventOp};

    #[test]
    fn test_and_wait_poll() {
        let evf = EventGroup::new();
        evf.create(0b0001, OsEventAttr::Multi).unwrap();

        // 0b0110 not yet together
        assert_eq!(
            evf.wait_polling(0b0110, opt::EVENT_WAIT_ALL),
            Err(OsError::Timeout)
        );

        evf.modify(OsEventOp::Set, 0b0100).unwrap();
        assert_eq!(
            evf.wait_polling(0b0110, opt::EVENT_WAIT_ALL),
            Err(OsError::Timeout)
        );

        evf.modify(OsEventOp::Set, 0b0010).unwrap();
        assert_eq!(evf.wait_polling(0b0110, opt::EVENT_WAIT_ALL), Ok(0b0111));
    }

    #[test]
    fn test_set_clear_is_noop_on_pattern() {
        let evf = EventGroup::new();
        evf.create(0b1000, OsEventAttr::Multi).unwrap();

        evf.modify(OsEventOp::Set, 0b0011).unwrap();
        evf.modify(OsEventOp::Clear, 0b0011).unwrap();
        assert_eq!(evf.pattern(), 0b1000);
    }

    #[test]
    fn test_consume_clears_waiter_bits() {
        let evf = EventGroup::new();
        evf.create(0b0111, OsEventAttr::Multi).unwrap();

        assert_eq!(
            evf.wait_polling(0b0011, opt::EVENT_WAIT_ALL | opt::EVENT_CONSUME),
            Ok(0b0111)
        );
        assert_eq!(evf.pattern(), 0b0100);
    }

    #[test]
    fn test_delete_invalidates() {
        let evf = EventGroup::new();
        evf.create(0, OsEventAttr::Multi).unwrap();
        evf.delete().unwrap();
        assert_eq!(
            evf.modify(OsEventOp::Set, 1),
            Err(OsError::InvalidObj)
        );
    }
}

#[cfg(test)]
mod mutex_tests {
    use corten::error::OsError;
    use corten::mutex::Mutex;
    use corten::types::OsMutexAttr;

    #[test]
    fn test_create_and_delete() {
        let m = Mutex::new();
        m.create(OsMutexAttr::Inherit, 0).unwrap();
        assert!(!m.is_locked());

        m.delete().unwrap();
        assert_eq!(m.delete(), Err(OsError::InvalidObj));
    }

    #[test]
    fn test_lock_requires_running_kernel() {
        // locking records an owner, which only exists once the kernel runs
        let m = Mutex::new();
        m.create(OsMutexAttr::Inherit, 0).unwrap();
        assert_eq!(m.lock_polling(), Err(OsError::WrongContext));
    }

    #[test]
    fn test_no_recreation() {
        let m = Mutex::new();
        m.create(OsMutexAttr::Inherit, 0).unwrap();
        assert_eq!(m.create(OsMutexAttr::Inherit, 0), Err(OsError::WrongParam));
    }
}
