//! # Synchronization Primitives
//!
//! Interrupt-safe critical sections and the cell type used for the
//! kernel's few pieces of global state. Every mutation of scheduler state
//! happens inside a critical section, so the tick handler can never see a
//! half-updated ready set or sleep queue.
//!
//! On the firmware the critical section masks interrupts (the
//! `critical-section-single-core` implementation from `cortex-m`); host
//! tests use the `std` implementation.

use core::cell::RefCell;

pub use critical_section::CriticalSection;
use critical_section::Mutex;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit, ensuring
/// atomicity of the enclosed operation.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
///
/// Keep critical sections short: the tick interrupt is held off for
/// their whole duration.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// A global that is initialized once at runtime and then only touched
/// inside critical sections.
pub struct Global<T> {
    inner: Mutex<RefCell<Option<T>>>,
}

impl<T> Global<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Store `value`, returning the previous one.
    pub fn init(&self, value: T) -> Option<T> {
        critical_section(|cs| self.inner.borrow(cs).replace(Some(value)))
    }

    pub fn is_initialized(&self) -> bool {
        critical_section(|cs| {
            self.inner
                .borrow(cs)
                .try_borrow()
                .map(|v| v.is_some())
                .unwrap_or(true)
        })
    }

    /// Run `f` on the value inside a critical section.
    ///
    /// `None` if the global is not initialized, or if it is already
    /// borrowed further up the call stack.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        critical_section(|cs| {
            let mut slot = self.inner.borrow(cs).try_borrow_mut().ok()?;
            slot.as_mut().map(f)
        })
    }
}

impl<T> Default for Global<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_global() {
        let global: Global<u32> = Global::new();
        assert!(!global.is_initialized());
        assert_eq!(global.with(|v| *v), None);
    }

    #[test]
    fn test_init_and_mutate() {
        let global = Global::new();
        assert_eq!(global.init(5u32), None);
        assert_eq!(global.with(|v| {
            *v += 1;
            *v
        }), Some(6));
        assert_eq!(global.init(1), Some(6));
        assert!(global.is_initialized());
    }

    #[test]
    fn test_reentrant_access_is_refused() {
        let global = Global::new();
        global.init(0u32);
        let inner = global.with(|_| global.with(|v| *v));
        assert_eq!(inner, Some(None));
    }

    #[test]
    fn test_critical_section_returns_value() {
        assert_eq!(critical_section(|_cs| 42), 42);
    }
}
