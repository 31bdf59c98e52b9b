//! Panic handling and default exception hooks
//!
//! On ARM targets the crate owns the panic story. With the `defmt` feature
//! the RTT transport and `panic-probe` are linked in, so a panic is
//! reported over the probe before the fatal-error hook halts the core;
//! without it a panic goes straight to the hook. Hard faults end up in the
//! same place, giving the debugger a single symbol to break on.

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use defmt_rtt as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use panic_probe as _;

// panic-probe has already printed the panic message at this point
#[cfg(all(feature = "defmt", target_arch = "arm"))]
#[defmt::panic_handler]
fn defmt_panic() -> ! {
    crate::port::os_fatal_error()
}

#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    crate::port::os_fatal_error()
}

// A hard fault means kernel or application state is already gone; treat it
// exactly like an internal invariant violation.
#[cfg(target_arch = "arm")]
#[cortex_m_rt::exception]
unsafe fn HardFault(_frame: &cortex_m_rt::ExceptionFrame) -> ! {
    crate::port::os_fatal_error()
}

// Stamp defmt frames with the kernel tick so log output lines up with
// scheduler activity.
#[cfg(all(feature = "defmt", target_arch = "arm"))]
defmt::timestamp!("{=u32}", crate::core::kernel::KERNEL.tick_get());
