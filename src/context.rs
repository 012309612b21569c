//! # Context Frames
//!
//! A task that has never run must look exactly like one that was
//! interrupted, so the first switch into it can use the same restore
//! path as every later one. This module writes that synthetic frame.
//!
//! ## Stack Layout (top = high address, growing down)
//!
//! ```text
//! [Hardware stacked frame]   popped by exception return
//!   xPSR  (Thumb bit set)
//!   PC    (task entry point)
//!   LR    (task exit trampoline)
//!   R12   (0)
//!   R3    (0)
//!   R2    (0)
//!   R1    (0)
//!   R0    (0)
//! [Software saved context]   popped by PendSV
//!   R11   (0)
//!   ...
//!   R4    (0)              <- saved stack pointer after init
//! ```

/// Registers PendSV saves by hand (R4–R11).
pub const SOFTWARE_FRAME_WORDS: usize = 8;

/// Registers the core stacks on exception entry (R0–R3, R12, LR, PC, xPSR).
pub const HARDWARE_FRAME_WORDS: usize = 8;

/// Full saved context.
pub const FRAME_WORDS: usize = SOFTWARE_FRAME_WORDS + HARDWARE_FRAME_WORDS;

/// xPSR with only the Thumb bit set.
pub const INITIAL_XPSR: u32 = 0x0100_0000;

/// Word offsets inside a saved frame, from the saved stack pointer up.
pub mod offset {
    pub const R4: usize = 0;
    pub const R11: usize = 7;
    pub const R0: usize = 8;
    pub const R12: usize = 12;
    pub const LR: usize = 13;
    pub const PC: usize = 14;
    pub const XPSR: usize = 15;
}

/// Whose registers are currently live on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnCpu {
    /// Boot code, before the first task is launched.
    Boot,
    /// The kernel's idle loop.
    Idle,
    /// The task in this registry slot.
    Task(usize),
}

/// Write the initial frame at the top of `stack`.
///
/// `entry` becomes the resume address and `exit` the return address used
/// if the entry function ever returns. Returns the word offset of the
/// frame inside `stack`, i.e. the initial saved stack pointer.
///
/// `stack` must hold at least [`FRAME_WORDS`] words and have an even
/// length so the frame stays 8-byte aligned.
pub fn init_frame(stack: &mut [u32], entry: u32, exit: u32) -> usize {
    debug_assert!(stack.len() >= FRAME_WORDS);
    debug_assert!(stack.len() % 2 == 0);

    let base = stack.len() - FRAME_WORDS;
    let frame = &mut stack[base..];
    frame.fill(0);
    frame[offset::LR] = exit;
    // Exception return wants the PC without the Thumb marker bit
    frame[offset::PC] = entry & !1;
    frame[offset::XPSR] = INITIAL_XPSR;
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let mut stack = [0xFFFF_FFFFu32; 64];
        let base = init_frame(&mut stack, 0x0800_1235, 0x0800_2001);

        assert_eq!(base, 64 - FRAME_WORDS);
        let frame = &stack[base..];
        assert!(frame[offset::R4..=offset::R11].iter().all(|&w| w == 0));
        assert!(frame[offset::R0..=offset::R12].iter().all(|&w| w == 0));
        assert_eq!(frame[offset::LR], 0x0800_2001);
        assert_eq!(frame[offset::PC], 0x0800_1234);
        assert_eq!(frame[offset::XPSR], INITIAL_XPSR);
    }

    #[test]
    fn test_frame_leaves_lower_stack_alone() {
        let mut stack = [0xAAAA_AAAAu32; 32];
        let base = init_frame(&mut stack, 0x100, 0x200);
        assert!(stack[..base].iter().all(|&w| w == 0xAAAA_AAAA));
    }
}
