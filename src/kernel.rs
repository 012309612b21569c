//! # Kernel
//!
//! The single global kernel instance and the free-function task API that
//! firmware and task code call. Every function enters a critical section
//! around the scheduler, so task code and the tick interrupt never
//! interleave inside a scheduling operation.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► console::init()       ← Logger on ITM port 0
//!         ├─► kernel::init()        ← Build the kernel over the stack arena
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Set interrupt priorities
//!               ├─► Configure SysTick
//!               └─► Start first context via arch::start_first_task()
//! ```
//!
//! Until `init` has run, the fallible calls return
//! `KernelError::NotInitialized` and the rest do nothing.

use crate::arch::Cpu;
use crate::error::{KernelError, KernelResult};
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::sync::Global;
use crate::task::{Priority, TaskBuilder, TaskEntry, TaskHandle, TaskId, TaskInfo, TaskState};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

static KERNEL: Global<Scheduler<'static, Cpu>> = Global::new();

fn with<R>(f: impl FnOnce(&mut Scheduler<'static, Cpu>) -> R) -> KernelResult<R> {
    KERNEL.with(f).ok_or(KernelError::NotInitialized)
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel with `memory` as the stack arena.
///
/// Must run before any other kernel function. Calling it again replaces
/// the kernel and forgets every task.
pub fn init(memory: &'static mut [u32]) -> KernelResult<()> {
    let scheduler = Scheduler::new(Cpu::new(), memory)?;
    let free = scheduler.free_stack_bytes();
    if KERNEL.init(scheduler).is_some() {
        log::warn!("kernel re-initialized");
    }
    log::info!("kernel initialized, {} bytes of stack memory free", free);
    Ok(())
}

pub fn is_initialized() -> bool {
    KERNEL.is_initialized()
}

/// Create a new task and register it with the scheduler.
///
/// # Example
/// ```ignore
/// let blinky = kernel::create_task("blinky", Some(blink), Priority::Normal, 1024)?;
/// ```
pub fn create_task(
    name: &str,
    entry: Option<TaskEntry>,
    priority: Priority,
    stack_size: usize,
) -> KernelResult<TaskHandle> {
    with(|k| k.create(name, entry, priority, stack_size))?
}

/// Create a task from a [`TaskBuilder`].
pub fn spawn(builder: TaskBuilder<'_>) -> KernelResult<TaskHandle> {
    with(|k| builder.spawn(k))?
}

pub fn delete_task(handle: TaskHandle) {
    let _ = with(|k| k.delete(handle));
}

pub fn suspend(handle: TaskHandle) {
    let _ = with(|k| k.suspend(handle));
}

pub fn resume(handle: TaskHandle) {
    let _ = with(|k| k.resume(handle));
}

/// Put the calling task to sleep for `ticks` ticks.
pub fn sleep(ticks: u32) {
    let _ = with(|k| k.sleep(ticks));
}

pub fn sleep_ms(ms: u32) {
    let _ = with(|k| k.sleep_ms(ms));
}

/// Voluntarily yield the CPU from the current task.
pub fn yield_task() {
    let _ = with(|k| k.yield_now());
}

/// Delete the calling task. Reached when a task's entry function returns.
pub fn exit_current() {
    let _ = with(|k| k.exit_current());
}

pub fn current_task() -> Option<TaskHandle> {
    with(|k| k.current_task()).ok().flatten()
}

pub fn task_state(handle: TaskHandle) -> TaskState {
    with(|k| k.get_state(handle)).unwrap_or(TaskState::Terminated)
}

pub fn task_priority(handle: TaskHandle) -> Priority {
    with(|k| k.get_priority(handle)).unwrap_or(Priority::Idle)
}

pub fn task_id(handle: TaskHandle) -> TaskId {
    with(|k| k.get_id(handle)).unwrap_or(TaskId::INVALID)
}

pub fn task_info(handle: TaskHandle) -> Option<TaskInfo> {
    with(|k| k.task_info(handle)).ok().flatten()
}

pub fn task_count() -> usize {
    with(|k| k.task_count()).unwrap_or(0)
}

pub fn stats() -> Option<SchedulerStats> {
    with(|k| k.stats()).ok()
}

/// Run `f` for every live task.
pub fn for_each_task(mut f: impl FnMut(TaskInfo)) {
    let _ = with(|k| {
        for handle in k.handles() {
            if let Some(info) = k.task_info(handle) {
                f(info);
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Port entry points
// ---------------------------------------------------------------------------

/// Tick interrupt entry. The port has already advanced the tick counter.
pub fn on_tick() {
    let _ = with(|k| k.tick());
}

/// Deferred context switch entry. Returns the stack pointer to resume;
/// before `init` the outgoing one is resumed unchanged.
pub fn switch_context(outgoing_sp: usize) -> usize {
    with(|k| k.switch_context(outgoing_sp)).unwrap_or(outgoing_sp)
}

/// Mark the scheduler started and return the first stack pointer to run.
pub fn launch() -> KernelResult<usize> {
    with(|k| k.start())
}

/// Start the scheduler. **Does not return.**
///
/// Configures SysTick and exception priorities, then launches the first
/// context. With no task Ready, that is the idle context.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    use crate::arch::cortex_m4;

    cortex_m::interrupt::disable();
    cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB);
    cortex_m4::configure_systick(&mut core_peripherals.SYST);

    match launch() {
        // SAFETY: interrupts are masked and `sp` is a synthesized frame
        Ok(sp) => unsafe { cortex_m4::start_first_task(sp) },
        Err(e) => crate::error::fatal(e.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;
    use crate::config::{DEFAULT_STACK_SIZE, STACK_ARENA_WORDS};
    use crate::stack::StackMemory;

    extern "C" fn worker() {}

    fn service() {
        let pending = with(|k| k.switch_pending()).unwrap();
        if pending {
            switch_context(0x2000_0000);
        }
    }

    // The kernel is a process-wide global, so its whole lifecycle is
    // exercised in one test.
    #[test]
    fn test_global_kernel_lifecycle() {
        assert!(!is_initialized());
        assert_eq!(
            create_task("early", Some(worker), Priority::Normal, DEFAULT_STACK_SIZE),
            Err(KernelError::NotInitialized)
        );
        assert_eq!(launch(), Err(KernelError::NotInitialized));
        assert_eq!(task_state(TaskHandle::INVALID), TaskState::Terminated);
        assert_eq!(switch_context(0x1234), 0x1234);
        assert!(stats().is_none());
        on_tick();

        let memory = Box::leak(Box::new(StackMemory::<STACK_ARENA_WORDS>::new()));
        init(memory.as_mut_slice()).unwrap();
        assert!(is_initialized());

        let low = create_task("low", Some(worker), Priority::Low, DEFAULT_STACK_SIZE).unwrap();
        let high = spawn(
            TaskBuilder::new("high")
                .entry(worker)
                .priority(Priority::High),
        )
        .unwrap();
        assert_eq!(
            create_task("bad", None, Priority::Low, DEFAULT_STACK_SIZE),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(task_count(), 2);
        assert_eq!(task_id(low).as_u32(), 1);
        assert_eq!(task_priority(high), Priority::High);

        launch().unwrap();
        assert_eq!(current_task(), Some(high));

        // high sleeps two ticks, low runs meanwhile
        let base = arch::now_ticks();
        sleep(2);
        assert_eq!(with(|k| k.port().switch_requests()), Ok(1));
        service();
        assert_eq!(task_state(high), TaskState::Sleeping);
        assert_eq!(current_task(), Some(low));
        while arch::now_ticks().wrapping_sub(base) < 2 {
            arch::advance_tick();
            on_tick();
            service();
        }
        assert_eq!(current_task(), Some(high));

        let mut names = Vec::new();
        for_each_task(|info| names.push(info.name));
        assert_eq!(names.len(), 2);

        exit_current();
        service();
        assert_eq!(task_state(high), TaskState::Terminated);
        assert_eq!(current_task(), Some(low));
        assert_eq!(task_count(), 1);
        assert!(stats().unwrap().context_switches >= 3);
    }
}
