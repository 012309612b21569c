//! # Task Control Block
//!
//! Defines the task model for TickOS: identities, priorities, the state
//! enum driven by [`crate::state`], creation parameters, and the TCB the
//! registry stores for every live task.
//!
//! Tasks are referred to from outside the kernel through a [`TaskHandle`],
//! a `(slot, id)` pair. Slots are recycled after deletion but ids never
//! are, so a handle to a deleted task stays harmless forever: every query
//! on it returns a sentinel.

use core::fmt;

use heapless::String;

use crate::config::{DEFAULT_STACK_SIZE, DEFAULT_TIME_SLICE, MAX_NAME_LEN};
use crate::error::KernelResult;
use crate::port::Port;
use crate::scheduler::Scheduler;
use crate::stack::StackRegion;

/// Task entry point. A task that returns is cleaned up by the
/// port's task-exit trampoline.
pub type TaskEntry = extern "C" fn();

/// Bounded, truncated task label. Purely diagnostic.
pub type TaskName = String<MAX_NAME_LEN>;

// ---------------------------------------------------------------------------
// Task state
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///                 schedule()
///   ┌─────────┐ ───────────► ┌─────────┐  sleep()   ┌──────────┐
///   │  Ready  │              │ Running │ ─────────► │ Sleeping │
///   └─────────┘ ◄─────────── └─────────┘            └──────────┘
///     ▲     ▲   yield/slice       │                      │
///     │     └─────────────────────┼──────────────────────┘
///     │                           │ suspend()    wake (tick)
///     │ resume()                  ▼
///     │                     ┌───────────┐
///     └──────────────────── │ Suspended │
///                           └───────────┘
///
///   any state ──delete()──► Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible for selection, waiting in its priority bucket.
    Ready,
    /// Owns the CPU.
    Running,
    /// Parked until its wake tick.
    Sleeping,
    /// Reserved for synchronization primitives built on top of the kernel.
    Blocked,
    /// Removed from scheduling until resumed.
    Suspended,
    /// Deleted. Terminal.
    Terminated,
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Static task priority. Higher variants always win the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Idle = 0,
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    /// Number of priority levels (one ready bucket each).
    pub const COUNT: usize = 5;

    /// All levels, most important first.
    pub const DESCENDING: [Priority; Priority::COUNT] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Idle,
    ];

    /// Bucket index of this level.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique task identifier. Assigned monotonically from 1, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    /// Returned by queries on null, deleted or stale handles.
    pub const INVALID: TaskId = TaskId(0);

    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-side reference to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    slot: usize,
    id: TaskId,
}

impl TaskHandle {
    /// The null handle. Never resolves to a task.
    pub const INVALID: TaskHandle = TaskHandle {
        slot: usize::MAX,
        id: TaskId::INVALID,
    };

    pub(crate) const fn new(slot: usize, id: TaskId) -> Self {
        Self { slot, id }
    }

    #[inline]
    pub(crate) const fn slot(&self) -> usize {
        self.slot
    }

    /// Id this handle was issued for. Use `Scheduler::get_id` to learn
    /// whether the task is still alive.
    #[inline]
    pub const fn raw_id(&self) -> TaskId {
        self.id
    }
}

/// Copy `name` into a bounded label, cutting at a character boundary.
pub(crate) fn truncate_name(name: &str) -> TaskName {
    let mut label = TaskName::new();
    for ch in name.chars() {
        if label.push(ch).is_err() {
            break;
        }
    }
    label
}

// ---------------------------------------------------------------------------
// Creation parameters
// ---------------------------------------------------------------------------

/// Parameters for a new task, validated by `Scheduler::spawn`.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Entry point. `None` is rejected with `InvalidArgument`.
    pub entry: Option<TaskEntry>,
    /// Fixed for the task's lifetime.
    pub priority: Priority,
    /// Requested stack in bytes, rounded up to 8.
    pub stack_size: usize,
    /// Time slice in ticks. If 0, uses `DEFAULT_TIME_SLICE`.
    pub time_slice: u32,
}

impl TaskConfig {
    /// Returns the effective time slice, falling back to the system default.
    #[inline]
    pub const fn effective_time_slice(&self) -> u32 {
        if self.time_slice > 0 {
            self.time_slice
        } else {
            DEFAULT_TIME_SLICE
        }
    }
}

/// Fluent front end for [`TaskConfig`].
///
/// ```ignore
/// let blinker = TaskBuilder::new("blinker")
///     .entry(blink)
///     .priority(Priority::High)
///     .stack_size(2048)
///     .spawn(&mut scheduler)?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TaskBuilder<'n> {
    name: &'n str,
    config: TaskConfig,
}

impl<'n> TaskBuilder<'n> {
    pub fn new(name: &'n str) -> Self {
        Self {
            name,
            config: TaskConfig {
                entry: None,
                priority: Priority::Normal,
                stack_size: DEFAULT_STACK_SIZE,
                time_slice: 0,
            },
        }
    }

    pub fn entry(mut self, entry: TaskEntry) -> Self {
        self.config.entry = Some(entry);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.config.priority = priority;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = bytes;
        self
    }

    pub fn time_slice(mut self, ticks: u32) -> Self {
        self.config.time_slice = ticks;
        self
    }

    pub fn name(&self) -> &'n str {
        self.name
    }

    pub fn config(&self) -> TaskConfig {
        self.config
    }

    /// Register the task with `scheduler`.
    pub fn spawn<P: Port>(self, scheduler: &mut Scheduler<'_, P>) -> KernelResult<TaskHandle> {
        scheduler.spawn(self.name, self.config)
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Per-task record owned by the registry.
///
/// `saved_sp` is only meaningful while the task's registers are not live
/// on the CPU; the context switch refreshes it every time the task is
/// switched out.
pub(crate) struct TaskControlBlock {
    pub(crate) id: TaskId,
    pub(crate) name: TaskName,
    /// Written only by `state::transition`.
    pub(crate) state: TaskState,
    pub(crate) priority: Priority,
    pub(crate) entry: TaskEntry,

    /// Exclusively owned stack, allocated once at creation.
    pub(crate) stack: StackRegion,
    /// Address of the saved register frame inside `stack`.
    pub(crate) saved_sp: usize,

    /// Tick at which a sleeping task becomes Ready.
    pub(crate) wake_time: u32,

    /// Configured slice length in ticks.
    pub(crate) time_slice: u32,
    /// Ticks left in the current slice.
    pub(crate) slice_remaining: u32,
    /// Ticks charged to the task while Running.
    pub(crate) time_used: u32,
    /// Times the task was switched in.
    pub(crate) context_switches: u32,
    /// Ticks elapsed while dispatched, measured at scheduling points.
    pub(crate) total_runtime: u32,
    /// Tick of the last accounting update while dispatched.
    pub(crate) dispatched_at: u32,

    /// Next live task in the registry list.
    pub(crate) next: Option<usize>,
}

impl TaskControlBlock {
    /// Build a Ready TCB. The stack frame must already be synthesized.
    pub(crate) fn new(
        id: TaskId,
        name: &str,
        entry: TaskEntry,
        config: &TaskConfig,
        stack: StackRegion,
        saved_sp: usize,
    ) -> Self {
        let time_slice = config.effective_time_slice();
        Self {
            id,
            name: truncate_name(name),
            state: TaskState::Ready,
            priority: config.priority,
            entry,
            stack,
            saved_sp,
            wake_time: 0,
            time_slice,
            slice_remaining: time_slice,
            time_used: 0,
            context_switches: 0,
            total_runtime: 0,
            dispatched_at: 0,
            next: None,
        }
    }

    /// Start a fresh slice.
    #[inline]
    pub(crate) fn reset_slice(&mut self) {
        self.slice_remaining = self.time_slice;
    }
}

/// Diagnostic snapshot of one task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: TaskName,
    pub state: TaskState,
    pub priority: Priority,
    pub wake_time: u32,
    pub time_slice: u32,
    pub time_used: u32,
    pub context_switches: u32,
    pub total_runtime: u32,
    /// Stack size in bytes after rounding.
    pub stack_size: usize,
    /// Bytes at the bottom of the stack the task has never written.
    pub stack_unused: usize,
    /// Address of the entry function.
    pub entry: usize,
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
