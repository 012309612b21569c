//! # TickOS Demo Firmware
//!
//! Three tasks on one Cortex-M4:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `DemoTask1` | Normal | Counts, sleeps 1 s |
//! | `DemoTask2` | Normal | Counts, sleeps 2 s |
//! | `Monitor` | High | Every 5 s logs scheduler statistics and per-task stack use |
//!
//! Logs go to ITM stimulus port 0.

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std, no_main)]

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use core::ptr::addr_of_mut;

    use cortex_m_rt::entry;
    use log::LevelFilter;
    use panic_halt as _;

    use tickos::arch::cortex_m4;
    use tickos::config::{DEFAULT_STACK_SIZE, STACK_ARENA_WORDS, TICK_HZ};
    use tickos::stack::StackMemory;
    use tickos::{console, kernel, Priority, TaskBuilder};

    static mut STACKS: StackMemory<STACK_ARENA_WORDS> = StackMemory::new();

    const BANNER: &str = concat!(
        "\n========================================\n",
        "         TickOS v",
        env!("CARGO_PKG_VERSION"),
        "\n  Priority round-robin RTOS kernel\n",
        "========================================\n\n",
    );

    // -----------------------------------------------------------------------
    // Task entry points
    // -----------------------------------------------------------------------

    extern "C" fn demo_task_1() {
        let mut counter: u32 = 0;
        loop {
            log::info!("Demo Task 1: counter = {}", counter);
            counter = counter.wrapping_add(1);
            kernel::sleep_ms(1000);
        }
    }

    extern "C" fn demo_task_2() {
        let mut counter: u32 = 0;
        loop {
            log::info!("Demo Task 2: counter = {}", counter);
            counter = counter.wrapping_add(1);
            kernel::sleep_ms(2000);
        }
    }

    extern "C" fn monitor_task() {
        loop {
            kernel::sleep(5 * TICK_HZ);
            if let Some(stats) = kernel::stats() {
                log::info!(
                    "ticks {} switches {} idle {}",
                    stats.total_ticks,
                    stats.context_switches,
                    stats.idle_ticks
                );
            }
            kernel::for_each_task(|info| {
                log::info!(
                    "  {:<15} {:?} {:?} run {} stack {}/{}",
                    info.name.as_str(),
                    info.priority,
                    info.state,
                    info.total_runtime,
                    info.stack_size - info.stack_unused,
                    info.stack_size
                );
            });
        }
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Firmware entry point. Initializes the kernel, creates tasks and
    /// starts the scheduler. Does not return.
    #[entry]
    fn main() -> ! {
        let Some(cp) = cortex_m::Peripherals::take() else {
            panic!("core peripherals already taken");
        };

        if console::init(cortex_m4::itm_write, LevelFilter::Info).is_err() {
            panic!("logger already set");
        }
        console::write_bytes(BANNER.as_bytes());

        // SAFETY: the only reference ever taken to the arena
        let memory = unsafe { (*addr_of_mut!(STACKS)).as_mut_slice() };
        if let Err(e) = kernel::init(memory) {
            panic!("kernel init failed: {}", e);
        }

        let tasks = [
            TaskBuilder::new("DemoTask1").entry(demo_task_1),
            TaskBuilder::new("DemoTask2").entry(demo_task_2),
            TaskBuilder::new("Monitor")
                .entry(monitor_task)
                .priority(Priority::High)
                .stack_size(DEFAULT_STACK_SIZE * 2),
        ];
        for builder in tasks {
            if let Err(e) = kernel::spawn(builder) {
                log::error!("failed to create {}: {}", builder.name(), e);
            }
        }
        log::info!("kernel initialization complete, {} tasks", kernel::task_count());

        // Start the scheduler, does not return
        kernel::start(cp)
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn main() {}
