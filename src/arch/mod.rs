//! # Architecture Abstraction Layer
//!
//! The tick counter shared by every port, plus the [`Cpu`] port selected
//! for the build target: the Cortex-M4 port on bare-metal ARM, a host
//! stand-in everywhere else so the kernel builds and tests on a
//! development machine.

use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use cortex_m4::CortexM4 as Cpu;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub mod host;
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use host::HostCpu as Cpu;

/// Ticks since boot. Written only by the tick interrupt.
static TICKS: AtomicU32 = AtomicU32::new(0);

#[inline]
pub fn now_ticks() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

/// Count one tick and return the new value. Wraps at `u32::MAX`.
#[inline]
pub fn advance_tick() -> u32 {
    TICKS.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}
