//! # State Machine
//!
//! The only code that writes `TaskControlBlock::state`. Requests for a
//! transition missing from the table are ignored rather than reported:
//! tasks manage their own state cooperatively, so a stale or repeated
//! request must not take the kernel down.
//!
//! | From                 | To         | Trigger                         |
//! |----------------------|------------|---------------------------------|
//! | Ready                | Running    | scheduler selection             |
//! | Running              | Ready      | slice expiry, yield, preemption |
//! | Running              | Sleeping   | `sleep()`                       |
//! | Sleeping             | Ready      | wake deadline reached           |
//! | Running              | Suspended  | `suspend()`                     |
//! | Suspended            | Ready      | `resume()`                      |
//! | any but Terminated   | Terminated | `delete()`                      |
//!
//! `Blocked` has no transitions yet; it is reserved for IPC primitives.

use crate::task::{TaskControlBlock, TaskState};

/// Whether `from → to` is in the transition table.
pub fn is_legal(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;

    matches!(
        (from, to),
        (Ready, Running)
            | (Running, Ready)
            | (Running, Sleeping)
            | (Sleeping, Ready)
            | (Running, Suspended)
            | (Suspended, Ready)
            | (Ready | Running | Sleeping | Blocked | Suspended, Terminated)
    )
}

/// Move `tcb` to `to` if legal. Returns whether the state changed.
pub(crate) fn transition(tcb: &mut TaskControlBlock, to: TaskState) -> bool {
    let from = tcb.state;
    if !is_legal(from, to) {
        log::trace!("task {}: ignored {:?} -> {:?}", tcb.id, from, to);
        return false;
    }
    log::trace!("task {}: {:?} -> {:?}", tcb.id, from, to);
    tcb.state = to;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackRegion;
    use crate::task::{Priority, TaskConfig, TaskId};
    use TaskState::*;

    const ALL: [TaskState; 6] = [Ready, Running, Sleeping, Blocked, Suspended, Terminated];

    extern "C" fn noop() {}

    fn tcb() -> TaskControlBlock {
        let config = TaskConfig {
            entry: Some(noop),
            priority: Priority::Normal,
            stack_size: 512,
            time_slice: 0,
        };
        TaskControlBlock::new(TaskId::new(1), "t", noop, &config, StackRegion::new(0, 128), 0)
    }

    #[test]
    fn test_terminated_is_terminal() {
        for to in ALL {
            assert!(!is_legal(Terminated, to), "Terminated -> {:?}", to);
        }
    }

    #[test]
    fn test_every_live_state_can_terminate() {
        for from in [Ready, Running, Sleeping, Blocked, Suspended] {
            assert!(is_legal(from, Terminated));
        }
    }

    #[test]
    fn test_sleeping_only_wakes_to_ready() {
        assert!(is_legal(Sleeping, Ready));
        assert!(!is_legal(Sleeping, Running));
        assert!(!is_legal(Sleeping, Suspended));
        assert!(!is_legal(Ready, Sleeping));
    }

    #[test]
    fn test_blocked_has_no_scheduling_transitions() {
        for state in [Ready, Running, Sleeping, Suspended] {
            assert!(!is_legal(state, Blocked));
            assert!(!is_legal(Blocked, state));
        }
    }

    #[test]
    fn test_only_running_can_be_suspended() {
        assert!(is_legal(Running, Suspended));
        for from in [Ready, Sleeping, Blocked, Terminated] {
            assert!(!is_legal(from, Suspended), "{:?} -> Suspended", from);
        }
    }

    #[test]
    fn test_resume_goes_to_ready_only() {
        assert!(is_legal(Suspended, Ready));
        assert!(!is_legal(Suspended, Running));
    }

    #[test]
    fn test_transition_applies_legal_moves() {
        let mut tcb = tcb();
        assert!(transition(&mut tcb, Running));
        assert!(transition(&mut tcb, Sleeping));
        assert!(transition(&mut tcb, Ready));
        assert_eq!(tcb.state, Ready);
    }

    #[test]
    fn test_transition_ignores_illegal_moves() {
        let mut tcb = tcb();
        assert!(!transition(&mut tcb, Sleeping));
        assert_eq!(tcb.state, Ready);

        assert!(transition(&mut tcb, Terminated));
        assert!(!transition(&mut tcb, Ready));
        assert_eq!(tcb.state, Terminated);
    }
}
