//! Error types for the kernel
//!
//! Uses Rust's Result pattern instead of C-style error pointers. The set of
//! codes is closed: every API call returns one of these, and nothing else.

/// RTOS error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsError {
    /// No error
    None = 0,
    /// Polling failure or timeout expiry
    Timeout = 1,
    /// Counter saturation (semaphore signal above max; activate/wakeup
    /// request already queued)
    Overflow = 2,
    /// Wrong context (task API in ISR, ISR API in task)
    WrongContext = 3,
    /// Wrong state (e.g. resume of a non-suspended task)
    WrongState = 4,
    /// Malformed argument (null, out-of-range priority, zero timeout where
    /// disallowed)
    WrongParam = 5,
    /// Object identity mismatch
    InvalidObj = 6,
    /// Illegal use (unlock of a mutex you do not hold; ceiling lock with
    /// base priority above the ceiling)
    IllegalUse = 7,
    /// Object deleted while the task waited on it
    Deleted = 8,
    /// Kernel invariant violated; should never escape in release builds
    Internal = 9,
}

/// Result type alias for RTOS operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    #[inline]
    pub fn is_ok(self) -> bool {
        self == OsError::None
    }

    #[inline]
    pub fn is_err(self) -> bool {
        self != OsError::None
    }
}
