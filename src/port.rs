//! # Hardware Port
//!
//! What the scheduling core needs from the processor it runs on. The core
//! decides *when* to switch; the port decides *how*.

/// Processor services used by [`crate::scheduler::Scheduler`].
pub trait Port {
    /// Monotonic tick counter, incremented once per timer interrupt and
    /// starting at 0. Wraps at `u32::MAX`.
    fn now_ticks(&self) -> u32;

    /// Arm the deferred context switch (PendSV on Cortex-M). The switch
    /// itself runs later, with interrupts masked, and calls back into
    /// `Scheduler::switch_context`.
    fn request_context_switch(&mut self);

    /// Return address placed in every new task's frame, reached if the
    /// task's entry function returns.
    fn task_exit_address(&self) -> u32;

    /// Resume address of the idle context.
    fn idle_entry_address(&self) -> u32;
}
