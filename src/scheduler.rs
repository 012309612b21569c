//! # Scheduler
//!
//! The kernel context. A [`Scheduler`] owns the task registry, the ready
//! buckets, the sleep queue and the stack arena, and implements every
//! task operation on top of them. It holds no global state of its own:
//! the firmware keeps exactly one instance behind `kernel`, tests create
//! as many as they like.
//!
//! ## Scheduling Algorithm
//!
//! Runs on every tick, yield, sleep, suspend and self-delete:
//! 1. **Account**: charge elapsed ticks to the dispatched task
//! 2. **Slice** (tick only): decrement the Running task's slice; on expiry
//!    it goes Ready, behind its same-priority peers
//! 3. **Select**: the front of the highest non-empty ready bucket
//! 4. **Switch**: a still-Running task is only displaced by a strictly
//!    higher priority; otherwise the selection becomes Running and, if
//!    its registers are not the ones on the CPU, a context switch is
//!    requested from the port
//! 5. **Idle**: with nothing Ready the idle context runs until a tick
//!    makes something Ready
//!
//! ## Context Switch Protocol
//!
//! The decision is made synchronously; the register swap happens later
//! in the port's deferred handler, which calls [`Scheduler::switch_context`]
//! with the outgoing stack pointer and resumes whatever it returns.
//! Between the two, `current` (the logical Running task) and `on_cpu`
//! (whose registers are live) may differ.
//!
//! A task deleted while its registers are live keeps its slot and stack
//! until that handler has switched away from it.

use crate::config::{IDLE_STACK_SIZE, MAX_STACK_SIZE, MIN_STACK_SIZE, TICK_HZ};
use crate::context::{self, OnCpu, FRAME_WORDS};
use crate::error::{fatal, KernelError, KernelResult};
use crate::port::Port;
use crate::ready::ReadyQueue;
use crate::registry::TaskRegistry;
use crate::sleep::{self, SleepQueue};
use crate::stack::{StackArena, StackRegion};
use crate::state;
use crate::task::{
    Priority, TaskConfig, TaskControlBlock, TaskEntry, TaskHandle, TaskId, TaskInfo, TaskState,
};

/// Aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Ticks delivered to the scheduler.
    pub total_ticks: u64,
    /// Register swaps performed by `switch_context`.
    pub context_switches: u64,
    /// Ticks that found no task Running.
    pub idle_ticks: u64,
    /// Scheduling decisions taken.
    pub schedule_calls: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Tick,
    Yield,
    Block,
}

/// The kernel context object.
pub struct Scheduler<'a, P: Port> {
    port: P,
    registry: TaskRegistry,
    stacks: StackArena<'a>,
    ready: ReadyQueue,
    sleepers: SleepQueue,

    /// Task in state Running, if any.
    current: Option<usize>,
    /// Context whose registers are on the CPU.
    on_cpu: OnCpu,
    idle_stack: StackRegion,
    idle_sp: usize,

    started: bool,
    switch_pending: bool,
    stats: SchedulerStats,
}

impl<'a, P: Port> Scheduler<'a, P> {
    /// Initialize a kernel over `memory`, which becomes the stack arena.
    ///
    /// Fails with `OutOfMemory` if not even the idle context fits.
    pub fn new(port: P, memory: &'a mut [u32]) -> KernelResult<Self> {
        let mut stacks = StackArena::new(memory);
        let idle_stack = stacks.alloc(IDLE_STACK_SIZE).ok_or(KernelError::OutOfMemory)?;
        let frame = context::init_frame(
            stacks.region_mut(idle_stack),
            port.idle_entry_address(),
            port.idle_entry_address(),
        );
        let idle_sp = stacks.address_of(idle_stack.start() + frame);

        Ok(Self {
            port,
            registry: TaskRegistry::new(),
            stacks,
            ready: ReadyQueue::new(),
            sleepers: SleepQueue::new(),
            current: None,
            on_cpu: OnCpu::Boot,
            idle_stack,
            idle_sp,
            started: false,
            switch_pending: false,
            stats: SchedulerStats::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Task Registry
    // -----------------------------------------------------------------------

    /// Create a Ready task.
    ///
    /// # Errors
    /// - `InvalidArgument`: `entry` is `None`, `name` is empty, or
    ///   `stack_size` is outside `MIN_STACK_SIZE..=MAX_STACK_SIZE`.
    /// - `OutOfMemory`: no free TCB slot or not enough stack memory.
    pub fn create(
        &mut self,
        name: &str,
        entry: Option<TaskEntry>,
        priority: Priority,
        stack_size: usize,
    ) -> KernelResult<TaskHandle> {
        self.spawn(
            name,
            TaskConfig {
                entry,
                priority,
                stack_size,
                time_slice: 0,
            },
        )
    }

    /// Create a Ready task from a full [`TaskConfig`].
    pub fn spawn(&mut self, name: &str, config: TaskConfig) -> KernelResult<TaskHandle> {
        let Some(entry) = config.entry else {
            log::warn!("task '{}' rejected: no entry point", name);
            return Err(KernelError::InvalidArgument);
        };
        if name.is_empty() {
            log::warn!("task rejected: empty name");
            return Err(KernelError::InvalidArgument);
        }
        if !(MIN_STACK_SIZE..=MAX_STACK_SIZE).contains(&config.stack_size) {
            log::warn!(
                "task '{}' rejected: stack size {} outside {}..={}",
                name,
                config.stack_size,
                MIN_STACK_SIZE,
                MAX_STACK_SIZE
            );
            return Err(KernelError::InvalidArgument);
        }
        if !self.registry.has_free_slot() {
            log::warn!("task '{}' rejected: all {} slots in use", name, crate::config::MAX_TASKS);
            return Err(KernelError::OutOfMemory);
        }

        let Some(stack) = self.stacks.alloc(config.stack_size) else {
            log::warn!(
                "task '{}' rejected: no {} byte stack (largest free {})",
                name,
                config.stack_size,
                self.stacks.largest_free()
            );
            return Err(KernelError::OutOfMemory);
        };
        let Some(id) = self.registry.allocate_id() else {
            self.stacks.free(stack);
            log::warn!("task '{}' rejected: task ids exhausted", name);
            return Err(KernelError::OutOfMemory);
        };

        let exit = self.port.task_exit_address();
        let frame = context::init_frame(self.stacks.region_mut(stack), entry as usize as u32, exit);
        let saved_sp = self.stacks.address_of(stack.start() + frame);

        let tcb = TaskControlBlock::new(id, name, entry, &config, stack, saved_sp);
        let priority = tcb.priority;
        let slot = match self.registry.insert(tcb) {
            Ok(slot) => slot,
            Err(_) => fatal("registry lost a free slot"),
        };
        self.ready.push_back(slot, priority);

        log::info!(
            "task '{}' created (id {}, priority {:?}, stack {})",
            name,
            id,
            priority,
            stack.size_bytes()
        );
        Ok(TaskHandle::new(slot, id))
    }

    /// Delete a task. No-op for null, stale or already deleted handles.
    ///
    /// The slot and stack are reused right away unless the task's
    /// registers are live on the CPU; then they are released by the next
    /// `switch_context`.
    pub fn delete(&mut self, handle: TaskHandle) {
        let Some(slot) = self.resolve(handle) else {
            return;
        };
        let Some(tcb) = self.registry.get_mut(slot) else {
            return;
        };

        let was = tcb.state;
        let priority = tcb.priority;
        state::transition(tcb, TaskState::Terminated);
        log::info!("task '{}' deleted", tcb.name);

        match was {
            TaskState::Ready => {
                self.ready.remove(slot, priority);
            }
            TaskState::Sleeping => {
                self.sleepers.remove(slot);
            }
            _ => {}
        }
        self.registry.unlink(slot);

        if self.on_cpu != OnCpu::Task(slot) {
            self.reclaim(slot);
        }
        if self.current == Some(slot) {
            self.current = None;
            self.schedule(Reason::Block);
        }
    }

    /// Delete the calling task. Reached from the task-exit trampoline.
    pub fn exit_current(&mut self) {
        if let Some(handle) = self.current_task() {
            self.delete(handle);
        }
    }

    fn reclaim(&mut self, slot: usize) {
        if let Some(tcb) = self.registry.release(slot) {
            self.stacks.free(tcb.stack);
        }
    }

    /// Slot behind `handle` if it names a task that has not been deleted.
    fn resolve(&self, handle: TaskHandle) -> Option<usize> {
        let tcb = self.registry.get(handle.slot())?;
        (tcb.id == handle.raw_id() && tcb.state != TaskState::Terminated).then_some(handle.slot())
    }

    fn tcb(&self, handle: TaskHandle) -> Option<&TaskControlBlock> {
        self.resolve(handle).and_then(|slot| self.registry.get(slot))
    }

    /// State of the task, or `Terminated` for a null or deleted handle.
    pub fn get_state(&self, handle: TaskHandle) -> TaskState {
        self.tcb(handle).map_or(TaskState::Terminated, |t| t.state)
    }

    /// Priority of the task, or `Idle` for a null or deleted handle.
    pub fn get_priority(&self, handle: TaskHandle) -> Priority {
        self.tcb(handle).map_or(Priority::Idle, |t| t.priority)
    }

    /// Id of the task, or `TaskId::INVALID` for a null or deleted handle.
    pub fn get_id(&self, handle: TaskHandle) -> TaskId {
        self.tcb(handle).map_or(TaskId::INVALID, |t| t.id)
    }

    /// Diagnostic snapshot of a live task.
    pub fn task_info(&self, handle: TaskHandle) -> Option<TaskInfo> {
        let tcb = self.tcb(handle)?;
        Some(TaskInfo {
            id: tcb.id,
            name: tcb.name.clone(),
            state: tcb.state,
            priority: tcb.priority,
            wake_time: tcb.wake_time,
            time_slice: tcb.time_slice,
            time_used: tcb.time_used,
            context_switches: tcb.context_switches,
            total_runtime: tcb.total_runtime,
            stack_size: tcb.stack.size_bytes(),
            stack_unused: self.stacks.unused_bytes(tcb.stack),
            entry: tcb.entry as usize,
        })
    }

    /// Handles of all live tasks, newest first.
    pub fn handles(&self) -> impl Iterator<Item = TaskHandle> + '_ {
        self.registry
            .iter()
            .map(|(slot, tcb)| TaskHandle::new(slot, tcb.id))
    }

    /// The Running task.
    pub fn current_task(&self) -> Option<TaskHandle> {
        let slot = self.current?;
        self.registry.get(slot).map(|t| TaskHandle::new(slot, t.id))
    }

    /// Live (not deleted) tasks.
    pub fn task_count(&self) -> usize {
        self.registry.len()
    }

    /// Tasks waiting in the ready set (the Running task excluded).
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    pub fn sleeping_count(&self) -> usize {
        self.sleepers.len()
    }

    pub fn free_stack_bytes(&self) -> usize {
        self.stacks.free_bytes()
    }

    /// Idle context stack bytes never touched.
    pub fn idle_stack_unused(&self) -> usize {
        self.stacks.unused_bytes(self.idle_stack)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// A context switch has been requested and not yet performed.
    pub fn switch_pending(&self) -> bool {
        self.switch_pending
    }

    pub fn now(&self) -> u32 {
        self.port.now_ticks()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// The saved register frame of a task that is not on the CPU.
    pub fn saved_frame(&self, handle: TaskHandle) -> Option<&[u32]> {
        let slot = self.resolve(handle)?;
        if self.on_cpu == OnCpu::Task(slot) {
            return None;
        }
        let tcb = self.registry.get(slot)?;
        self.stacks.words_at(tcb.saved_sp, FRAME_WORDS)
    }

    // -----------------------------------------------------------------------
    // State requests
    // -----------------------------------------------------------------------

    /// Take the Running task out of scheduling. No-op in any other state.
    pub fn suspend(&mut self, handle: TaskHandle) {
        let Some(slot) = self.resolve(handle) else {
            return;
        };
        let Some(tcb) = self.registry.get_mut(slot) else {
            return;
        };

        if !state::transition(tcb, TaskState::Suspended) {
            return;
        }
        log::info!("task '{}' suspended", tcb.name);
        self.schedule(Reason::Block);
    }

    /// Return a Suspended task to Ready. Never preempts by itself.
    pub fn resume(&mut self, handle: TaskHandle) {
        let Some(slot) = self.resolve(handle) else {
            return;
        };
        let Some(tcb) = self.registry.get_mut(slot) else {
            return;
        };
        if tcb.state != TaskState::Suspended || !state::transition(tcb, TaskState::Ready) {
            return;
        }
        log::info!("task '{}' resumed", tcb.name);
        let priority = tcb.priority;
        self.ready.push_back(slot, priority);
    }

    /// Park the Running task for `ticks` ticks.
    ///
    /// It becomes Ready on the first tick at or after `now + ticks`;
    /// `sleep(0)` therefore wakes on the very next tick.
    pub fn sleep(&mut self, ticks: u32) {
        let now = self.port.now_ticks();
        let Some(slot) = self.current else {
            return;
        };
        let Some(tcb) = self.registry.get_mut(slot) else {
            return;
        };
        if !state::transition(tcb, TaskState::Sleeping) {
            return;
        }

        let wake_time = sleep::wake_time_for(now, ticks);
        tcb.wake_time = wake_time;
        log::debug!("task '{}' sleeping {} ticks until {}", tcb.name, ticks, wake_time);
        self.sleepers.insert(slot, wake_time);
        self.schedule(Reason::Block);
    }

    /// `sleep` measured in milliseconds, rounded up to whole ticks.
    pub fn sleep_ms(&mut self, ms: u32) {
        self.sleep(sleep::ms_to_ticks(ms));
    }

    /// Give up the CPU to the next Ready task of equal or higher priority.
    pub fn yield_now(&mut self) {
        let Some(slot) = self.current else {
            return;
        };
        let Some(tcb) = self.registry.get_mut(slot) else {
            return;
        };
        if !state::transition(tcb, TaskState::Ready) {
            return;
        }
        log::debug!("task '{}' yielding", tcb.name);
        tcb.reset_slice();
        let priority = tcb.priority;
        self.ready.push_back(slot, priority);
        self.schedule(Reason::Yield);
    }

    // -----------------------------------------------------------------------
    // Tick handling and scheduling
    // -----------------------------------------------------------------------

    /// Timer interrupt entry. The port has already advanced `now_ticks`.
    pub fn tick(&mut self) {
        self.stats.total_ticks += 1;
        let now = self.port.now_ticks();
        if now % TICK_HZ == 0 {
            log::trace!("tick {} ({} tasks, {} ready)", now, self.task_count(), self.ready_count());
        }

        self.wake_expired(now);

        if !self.started {
            return;
        }
        if self.current.is_none() {
            self.stats.idle_ticks += 1;
        }
        self.schedule(Reason::Tick);
    }

    /// Move every sleeper whose deadline has passed to Ready.
    fn wake_expired(&mut self, now: u32) {
        while let Some(slot) = self.sleepers.pop_expired(now) {
            let Some(tcb) = self.registry.get_mut(slot) else {
                fatal("sleeper without a task");
            };
            if state::transition(tcb, TaskState::Ready) {
                tcb.wake_time = 0;
                let priority = tcb.priority;
                self.ready.push_back(slot, priority);
            }
        }
    }

    /// Launch scheduling. Returns the stack pointer of the first context
    /// to run, which the port restores without going through
    /// `switch_context`.
    pub fn start(&mut self) -> usize {
        self.schedule(Reason::Block);
        self.started = true;

        self.on_cpu = match self.current {
            Some(slot) => OnCpu::Task(slot),
            None => OnCpu::Idle,
        };
        self.switch_pending = false;
        log::info!("scheduler started with {} tasks", self.task_count());
        self.context_sp(self.on_cpu)
    }

    fn schedule(&mut self, reason: Reason) {
        self.stats.schedule_calls += 1;
        let now = self.port.now_ticks();

        // 1. Accounting for the dispatched task
        let mut running = None;
        if let Some(slot) = self.current {
            let Some(tcb) = self.registry.get_mut(slot) else {
                fatal("current task vanished");
            };
            tcb.total_runtime = tcb.total_runtime.wrapping_add(now.wrapping_sub(tcb.dispatched_at));
            tcb.dispatched_at = now;
            if tcb.state == TaskState::Running {
                running = Some(slot);
            }
        }

        // 2. Time slice
        if reason == Reason::Tick {
            if let Some(slot) = running {
                if let Some(tcb) = self.registry.get_mut(slot) {
                    tcb.time_used = tcb.time_used.wrapping_add(1);
                    tcb.slice_remaining = tcb.slice_remaining.saturating_sub(1);
                    if tcb.slice_remaining == 0 && state::transition(tcb, TaskState::Ready) {
                        tcb.reset_slice();
                        let priority = tcb.priority;
                        self.ready.push_back(slot, priority);
                        running = None;
                    }
                }
            }
        }

        // 3. Only a strictly higher priority displaces a Running task
        if let Some(slot) = running {
            let Some(tcb) = self.registry.get_mut(slot) else {
                fatal("current task vanished");
            };
            let priority = tcb.priority;
            match self.ready.highest_priority() {
                Some(best) if best > priority => {
                    state::transition(tcb, TaskState::Ready);
                    self.ready.push_front(slot, priority);
                }
                _ => return,
            }
        }

        // 4. Dispatch
        let previous = self.current;
        self.current = self.ready.pop_highest();
        if let Some(slot) = self.current {
            let Some(tcb) = self.registry.get_mut(slot) else {
                fatal("ready set holds a free slot");
            };
            if !state::transition(tcb, TaskState::Running) {
                fatal("ready set holds a task that is not Ready");
            }
            if tcb.slice_remaining == 0 {
                tcb.reset_slice();
            }
            tcb.dispatched_at = now;
            if previous != Some(slot) {
                tcb.context_switches = tcb.context_switches.wrapping_add(1);
                log::debug!("dispatch '{}' ({:?})", tcb.name, reason);
            }
        } else if previous.is_some() {
            log::debug!("nothing ready, idling ({:?})", reason);
        }

        self.request_switch();
    }

    fn request_switch(&mut self) {
        if !self.started {
            return;
        }
        let target = match self.current {
            Some(slot) => OnCpu::Task(slot),
            None => OnCpu::Idle,
        };
        if target != self.on_cpu && !self.switch_pending {
            self.switch_pending = true;
            self.port.request_context_switch();
        }
    }

    fn context_sp(&self, context: OnCpu) -> usize {
        match context {
            OnCpu::Task(slot) => match self.registry.get(slot) {
                Some(tcb) => tcb.saved_sp,
                None => fatal("switching to a free slot"),
            },
            OnCpu::Idle | OnCpu::Boot => self.idle_sp,
        }
    }

    // -----------------------------------------------------------------------
    // Context switch
    // -----------------------------------------------------------------------

    /// Deferred half of a context switch, run with interrupts masked.
    ///
    /// `outgoing_sp` is the stack pointer of the context that was on the
    /// CPU, with its registers already pushed. Returns the stack pointer
    /// of the context to restore.
    pub fn switch_context(&mut self, outgoing_sp: usize) -> usize {
        match self.on_cpu {
            OnCpu::Boot => {}
            OnCpu::Idle => self.idle_sp = outgoing_sp,
            OnCpu::Task(slot) => {
                let Some(tcb) = self.registry.get_mut(slot) else {
                    fatal("on-cpu task vanished");
                };
                if tcb.state == TaskState::Terminated {
                    self.reclaim(slot);
                } else {
                    tcb.saved_sp = outgoing_sp;
                }
            }
        }

        let next = match self.current {
            Some(slot) => OnCpu::Task(slot),
            None => OnCpu::Idle,
        };
        if next != self.on_cpu {
            self.stats.context_switches += 1;
        }
        self.on_cpu = next;
        self.switch_pending = false;
        self.context_sp(next)
    }

    /// Stack pointer the context now on the CPU was last saved with.
    #[cfg(test)]
    fn live_sp(&self) -> usize {
        self.context_sp(self.on_cpu)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
