//! # TickOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time; nothing is allocated dynamically.

/// Maximum number of tasks the registry can hold simultaneously.
/// This bounds the TCB slot array and every per-task queue.
pub const MAX_TASKS: usize = 8;

/// SysTick frequency in Hz. One tick is the kernel's unit of time.
pub const TICK_HZ: u32 = 1000;

/// Default time slice in ticks. A task runs for this many ticks before
/// it is rotated behind its same-priority peers.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Smallest stack a task may request, in bytes.
pub const MIN_STACK_SIZE: usize = 512;

/// Stack size used by the demo firmware and `TaskBuilder` when none is given.
pub const DEFAULT_STACK_SIZE: usize = 1024;

/// Largest stack a task may request, in bytes.
pub const MAX_STACK_SIZE: usize = 8192;

/// Total bytes of RAM reserved for task stacks (including the idle context).
pub const STACK_ARENA_SIZE: usize = 32 * 1024;

/// Same arena expressed in 32-bit words.
pub const STACK_ARENA_WORDS: usize = STACK_ARENA_SIZE / 4;

/// Stack reserved for the kernel's idle context. It only ever holds its
/// own initial frame plus one nested exception frame.
pub const IDLE_STACK_SIZE: usize = 256;

/// Longest task name kept; longer names are truncated.
pub const MAX_NAME_LEN: usize = 15;

/// Longest sleep accepted, in ticks. Deadlines are compared through a
/// signed difference, so anything beyond half the counter range would
/// look like it is already in the past.
pub const MAX_SLEEP_TICKS: u32 = i32::MAX as u32;

/// Word written over every freshly allocated stack. Words still holding
/// it were never touched by the task.
pub const STACK_PAINT: u32 = 0xCDCD_CDCD;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
