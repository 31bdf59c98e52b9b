//! Kernel logging
//!
//! Level-named macros that forward to `defmt` when the `defmt` feature is
//! active and vanish entirely when it is not, so instrumented kernel paths
//! cost nothing on silent builds. The RTT transport and the tick-stamped
//! frames are wired up in `lang_items`.
//!
//! Each level is defined twice, the two arms side by side: the forwarding
//! form and the empty form the build falls back to without `defmt`.

/// Fine-grained scheduler/object activity (task creation, hand-offs)
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// Developer diagnostics
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

/// Kernel lifecycle milestones (start, shutdown of objects)
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { defmt::info!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {};
}

/// Recoverable anomalies worth surfacing
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

/// Failures on the way to the fatal-error hook
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { defmt::error!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {};
}
