//! # TickOS: a priority round-robin RTOS kernel
//!
//! A minimal preemptive real-time kernel for ARM Cortex-M4
//! microcontrollers. Tasks have a fixed priority; the highest-priority
//! Ready task always runs, and tasks of equal priority share the CPU in
//! strict round-robin, rotated by time-slice expiry or by yielding.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                   │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                 │
//! │   init · create_task · sleep · yield_task · delete     │
//! ├────────────────────────────────────────────────────────┤
//! │              Scheduler (scheduler.rs)                  │
//! │   tick · schedule · switch_context · accounting        │
//! ├──────────────┬──────────────┬──────────────┬───────────┤
//! │ Registry     │ Ready set    │ Sleep queue  │ Stacks    │
//! │ registry.rs  │ ready.rs     │ sleep.rs     │ stack.rs  │
//! ├──────────────┴──────────────┴──────────────┴───────────┤
//! │   Task Model (task.rs) · State Machine (state.rs)      │
//! │   Context Frames (context.rs)                          │
//! ├────────────────────────────────────────────────────────┤
//! │   Port trait (port.rs) · Sync (sync.rs)                │
//! │   Console logger (console.rs)                          │
//! ├────────────────────────────────────────────────────────┤
//! │   Arch Port (arch/cortex_m4.rs, arch/host.rs)          │
//! │   PendSV · SysTick · First-task launch · Idle          │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all kernel state is statically sized
//! - **Fixed TCB slots**: `MAX_TASKS`, recycled through a free list
//! - **Stack arena**: one block of RAM handed to `kernel::init`, carved
//!   into per-task stacks and returned on deletion
//! - **Critical sections**: `critical_section::with()` for shared state
//!
//! The scheduling core ([`scheduler::Scheduler`]) holds no statics and is
//! generic over a [`port::Port`], so it runs unchanged in host unit tests.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod console;
pub mod context;
pub mod error;
pub mod kernel;
pub mod port;
mod ready;
mod registry;
pub mod scheduler;
pub mod sleep;
pub mod stack;
pub mod state;
pub mod sync;
pub mod task;

pub use error::{KernelError, KernelResult};
pub use scheduler::{Scheduler, SchedulerStats};
pub use task::{Priority, TaskBuilder, TaskConfig, TaskHandle, TaskId, TaskInfo, TaskState};
