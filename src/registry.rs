//! # Task Registry
//!
//! Owns every TCB. Storage is a fixed array of slots:
//!
//! - free slots form a singly-linked free list, so deletion makes a slot
//!   available again instead of leaking it;
//! - occupied, live slots form an unordered singly-linked list through
//!   `TaskControlBlock::next`, newest first.
//!
//! A deleted task that is still live on the CPU stays occupied (in state
//! `Terminated`) but off the live list until the scheduler releases it
//! at the next context switch.

use crate::config::MAX_TASKS;
use crate::task::{TaskControlBlock, TaskId};

enum Slot {
    Free { next_free: Option<usize> },
    Occupied(TaskControlBlock),
}

pub(crate) struct TaskRegistry {
    slots: [Slot; MAX_TASKS],
    free_head: Option<usize>,
    live_head: Option<usize>,
    live_count: usize,
    next_id: u32,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: core::array::from_fn(|i| Slot::Free {
                next_free: (i + 1 < MAX_TASKS).then_some(i + 1),
            }),
            free_head: if MAX_TASKS > 0 { Some(0) } else { None },
            live_head: None,
            live_count: 0,
            next_id: 1,
        }
    }

    #[inline]
    pub(crate) fn has_free_slot(&self) -> bool {
        self.free_head.is_some()
    }

    /// Hand out the next id. `None` once the id space is used up.
    pub(crate) fn allocate_id(&mut self) -> Option<TaskId> {
        let id = self.next_id;
        if id == 0 {
            return None;
        }
        // Wrapping to 0 marks exhaustion
        self.next_id = id.wrapping_add(1);
        Some(TaskId::new(id))
    }

    /// Store `tcb` in a free slot and link it into the live list.
    /// Returns `tcb` back if every slot is taken.
    pub(crate) fn insert(&mut self, mut tcb: TaskControlBlock) -> Result<usize, TaskControlBlock> {
        let Some(slot) = self.free_head else {
            return Err(tcb);
        };
        self.free_head = match self.slots[slot] {
            Slot::Free { next_free } => next_free,
            Slot::Occupied(_) => crate::error::fatal("free list points at an occupied slot"),
        };

        tcb.next = self.live_head;
        self.slots[slot] = Slot::Occupied(tcb);
        self.live_head = Some(slot);
        self.live_count += 1;
        Ok(slot)
    }

    /// Remove `slot` from the live list. The TCB stays in place.
    pub(crate) fn unlink(&mut self, slot: usize) -> bool {
        let successor = match self.get(slot) {
            Some(tcb) => tcb.next,
            None => return false,
        };

        if self.live_head == Some(slot) {
            self.live_head = successor;
        } else {
            let mut cursor = self.live_head;
            loop {
                let Some(index) = cursor else {
                    return false;
                };
                let Some(tcb) = self.get_mut(index) else {
                    return false;
                };
                if tcb.next == Some(slot) {
                    tcb.next = successor;
                    break;
                }
                cursor = tcb.next;
            }
        }

        if let Some(tcb) = self.get_mut(slot) {
            tcb.next = None;
        }
        self.live_count -= 1;
        true
    }

    /// Free `slot` and return its TCB. The slot must already be unlinked.
    pub(crate) fn release(&mut self, slot: usize) -> Option<TaskControlBlock> {
        if !matches!(self.slots.get(slot), Some(Slot::Occupied(_))) {
            return None;
        }
        let vacated = core::mem::replace(
            &mut self.slots[slot],
            Slot::Free {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(slot);
        match vacated {
            Slot::Occupied(tcb) => Some(tcb),
            Slot::Free { .. } => None,
        }
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&TaskControlBlock> {
        match self.slots.get(slot) {
            Some(Slot::Occupied(tcb)) => Some(tcb),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut TaskControlBlock> {
        match self.slots.get_mut(slot) {
            Some(Slot::Occupied(tcb)) => Some(tcb),
            _ => None,
        }
    }

    /// Live tasks, newest first.
    pub(crate) fn iter(&self) -> LiveTasks<'_> {
        LiveTasks {
            registry: self,
            cursor: self.live_head,
        }
    }

    /// Number of live (linked) tasks.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.live_count
    }
}

pub(crate) struct LiveTasks<'r> {
    registry: &'r TaskRegistry,
    cursor: Option<usize>,
}

impl<'r> Iterator for LiveTasks<'r> {
    type Item = (usize, &'r TaskControlBlock);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let tcb = self.registry.get(slot)?;
        self.cursor = tcb.next;
        Some((slot, tcb))
    }
}
