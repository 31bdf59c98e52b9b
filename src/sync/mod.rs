//! Synchronization primitives
//!
//! Counting semaphores, data queues, event groups and mutexes. All four
//! share the wait-list discipline implemented by the task module: FIFO
//! service, uniform hand-off through wait completion, and Deleted
//! notification when an object goes away.

#[cfg(feature = "sem")]
pub mod sem;

#[cfg(feature = "queue")]
pub mod queue;

#[cfg(feature = "event")]
pub mod event;

#[cfg(feature = "mutex")]
pub mod mutex;
