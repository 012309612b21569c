//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, SysTick timer configuration,
//! first-task launch and the two code addresses every new stack frame
//! points at (task exit trampoline and idle loop).
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by boot code and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by tasks and the idle context
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11, which completes the full context save/restore. The
//! choice of the next context is made by the scheduler before PendSV is
//! pended; PendSV only asks which stack pointer to resume.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0xE0, above PendSV so a tick is never held up by a switch
//! - PendSV: 0xFF (lowest), runs only when no other ISR is active

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{itm, ITM, SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel;
use crate::port::Port;

const PENDSV_PRIORITY: u8 = 0xFF;
const SYSTICK_PRIORITY: u8 = 0xE0;

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// The Cortex-M4 [`Port`]. Stateless: everything it drives is a core
/// peripheral register.
#[derive(Debug, Default)]
pub struct CortexM4;

impl CortexM4 {
    pub const fn new() -> Self {
        CortexM4
    }
}

impl Port for CortexM4 {
    fn now_ticks(&self) -> u32 {
        super::now_ticks()
    }

    fn request_context_switch(&mut self) {
        SCB::set_pendsv();
    }

    fn task_exit_address(&self) -> u32 {
        task_exit as usize as u32
    }

    fn idle_entry_address(&self) -> u32 {
        idle_loop as usize as u32
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the scheduler tick.
///
/// Sets up SysTick to fire at `TICK_HZ` frequency using the processor
/// clock. Each tick triggers `SysTick` which calls `kernel::on_tick()`.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Put PendSV below every other exception, SysTick just above it.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: called before the scheduler starts, with interrupts masked
    unsafe {
        scb.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, SYSTICK_PRIORITY);
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first context by switching to PSP and branching to it.
///
/// `psp` points at a synthetic frame (see `context::init_frame`). The
/// frame is unwound by hand since there is no exception to return from.
///
/// # Safety
/// Must only be called once, from thread mode with interrupts masked,
/// with the stack pointer returned by `kernel::launch`.
pub unsafe fn start_first_task(psp: usize) -> ! {
    asm!(
        // Skip the software-saved R4-R11 (8×4 = 32 bytes)
        "adds r0, #32",
        "msr psp, r0",

        // Thread mode runs on PSP from here on (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Unwind the hardware frame
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",          // LR: task exit trampoline
        "pop {{r5}}",          // PC: entry point
        "pop {{r6}}",          // xPSR: discarded
        "mov lr, r4",
        "orr r5, r5, #1",      // Thumb bit for bx

        "cpsie i",
        "bx r5",

        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler. Performs the register swap decided by the
/// scheduler.
///
/// ## Sequence
/// 1. Mask interrupts so no tick can observe a half-saved context
/// 2. Save R4–R11 onto the outgoing process stack
/// 3. Hand the outgoing PSP to the kernel, get the incoming one back
/// 4. Restore R4–R11 from the incoming stack and load PSP
/// 5. Unmask and return to thread mode on PSP
///
/// # Safety
/// Called by the NVIC only; follows the exception entry/exit convention.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",

        "bl {switch}",

        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "cpsie i",

        // EXC_RETURN: thread mode, process stack, no FP frame
        "ldr r0, =0xFFFFFFFD",
        "bx r0",

        switch = sym pendsv_switch,
    );
}

/// Swap bookkeeping for PendSV. Takes the outgoing PSP (R4–R11 already
/// pushed) and returns the PSP to restore.
extern "C" fn pendsv_switch(psp: usize) -> usize {
    kernel::switch_context(psp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler, the scheduler tick entry point.
///
/// Called at `TICK_HZ` frequency. Advances the tick counter, then lets
/// the kernel wake sleepers and pend PendSV if the selection changed.
#[no_mangle]
pub extern "C" fn SysTick() {
    super::advance_tick();
    kernel::on_tick();
}

// ---------------------------------------------------------------------------
// Code every fresh frame points at
// ---------------------------------------------------------------------------

/// Return address of every task. A task whose entry function returns
/// deletes itself and waits here for the switch away from it.
extern "C" fn task_exit() -> ! {
    kernel::exit_current();
    loop {
        cortex_m::asm::wfi();
    }
}

/// Body of the idle context.
extern "C" fn idle_loop() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Console sink: ITM stimulus port 0. Bytes are dropped while no
/// debugger has enabled the port.
pub fn itm_write(bytes: &[u8]) {
    // SAFETY: ITM registers are memory-mapped; port 0 is written only here,
    // inside a critical section
    crate::sync::critical_section(|_cs| unsafe {
        let itm = &mut *(ITM::PTR as *mut itm::RegisterBlock);
        if itm.tcr.read() & 1 == 0 || itm.ter[0].read() & 1 == 0 {
            return;
        }
        cortex_m::itm::write_all(&mut itm.stim[0], bytes);
    });
}
