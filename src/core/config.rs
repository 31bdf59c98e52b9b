//! Compile-time configuration for the kernel
//!
//! These constants control the behavior and resource limits of the RTOS.

use crate::types::{OsStkElement, OsTick};

/// Number of priority levels; never larger than the ready-bitmap word width
pub const CFG_PRIO_MAX: usize = 32;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Minimum task stack size in words
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Enable parameter checking in API calls
pub const CFG_PARAM_CHECK_EN: bool = true;

/// Allow the mutex holder to lock the same mutex again; when disabled a
/// second lock by the holder fails with IllegalUse
pub const CFG_MUTEX_RECURSIVE_EN: bool = true;

/// Idle task priority; reserved, always the lowest
pub const CFG_PRIO_IDLE: u8 = (CFG_PRIO_MAX - 1) as u8;

/// Round-robin quantum value that disables time slicing for a priority
pub const NO_TIME_SLICE: OsTick = 0;

/// Stacks are pre-filled with this value at task creation so that the
/// high-water mark can be observed with a debugger
pub const CFG_STK_FILL_VAL: OsStkElement = 0xFFFF_FFFF;
