//! # Kernel Errors
//!
//! Task-level failures are always recoverable: the caller gets an error
//! and the registry is left untouched. Corruption of scheduler state is
//! not recoverable and goes through [`fatal`].

use core::fmt;

/// Errors surfaced by task creation and the global kernel API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Bad creation parameters (missing entry, empty name, stack size
    /// outside the accepted range).
    InvalidArgument,
    /// No free TCB slot, stack arena exhausted, or task ids used up.
    OutOfMemory,
    /// The global kernel was used before `kernel::init`.
    NotInitialized,
}

impl KernelError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            KernelError::InvalidArgument => "invalid argument",
            KernelError::OutOfMemory => "out of memory",
            KernelError::NotInitialized => "kernel not initialized",
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

/// Halt the system after an invariant violation.
///
/// Scheduling against corrupted state is worse than stopping, so this
/// never returns. On the firmware the panic handler parks the core.
#[cold]
pub(crate) fn fatal(reason: &str) -> ! {
    log::error!("kernel halted: {}", reason);
    panic!("kernel halted: {}", reason);
}
