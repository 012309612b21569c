//! # Ready Set
//!
//! One FIFO bucket per priority. Tasks join at the back when they become
//! Ready and the scheduler takes from the front of the highest non-empty
//! bucket, which makes equal-priority selection strict round-robin.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::error::fatal;
use crate::task::Priority;

type Bucket = Vec<usize, MAX_TASKS>;

pub(crate) struct ReadyQueue {
    buckets: [Bucket; Priority::COUNT],
}

impl ReadyQueue {
    pub(crate) const fn new() -> Self {
        Self {
            buckets: [Bucket::new(), Bucket::new(), Bucket::new(), Bucket::new(), Bucket::new()],
        }
    }

    /// Queue `slot` behind its peers.
    pub(crate) fn push_back(&mut self, slot: usize, priority: Priority) {
        if self.buckets[priority.index()].push(slot).is_err() {
            fatal("ready bucket overflow");
        }
    }

    /// Queue `slot` ahead of its peers (it was preempted mid-slice).
    pub(crate) fn push_front(&mut self, slot: usize, priority: Priority) {
        if self.buckets[priority.index()].insert(0, slot).is_err() {
            fatal("ready bucket overflow");
        }
    }

    /// Drop `slot` from its bucket. Returns whether it was queued.
    pub(crate) fn remove(&mut self, slot: usize, priority: Priority) -> bool {
        let bucket = &mut self.buckets[priority.index()];
        match bucket.iter().position(|&s| s == slot) {
            Some(pos) => {
                bucket.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Highest priority with a waiting task.
    pub(crate) fn highest_priority(&self) -> Option<Priority> {
        Priority::DESCENDING
            .into_iter()
            .find(|p| !self.buckets[p.index()].is_empty())
    }

    /// Take the longest-waiting task of the highest non-empty bucket.
    pub(crate) fn pop_highest(&mut self) -> Option<usize> {
        let priority = self.highest_priority()?;
        Some(self.buckets[priority.index()].remove(0))
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, slot: usize) -> bool {
        self.buckets.iter().any(|b| b.contains(&slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_bucket_wins() {
        let mut ready = ReadyQueue::new();
        ready.push_back(0, Priority::Low);
        ready.push_back(1, Priority::High);
        ready.push_back(2, Priority::Normal);

        assert_eq!(ready.highest_priority(), Some(Priority::High));
        assert_eq!(ready.pop_highest(), Some(1));
        assert_eq!(ready.pop_highest(), Some(2));
        assert_eq!(ready.pop_highest(), Some(0));
        assert_eq!(ready.pop_highest(), None);
    }

    #[test]
    fn test_fifo_within_bucket() {
        let mut ready = ReadyQueue::new();
        for slot in [3, 1, 2] {
            ready.push_back(slot, Priority::Normal);
        }
        assert_eq!(ready.pop_highest(), Some(3));
        ready.push_back(3, Priority::Normal);
        assert_eq!(ready.pop_highest(), Some(1));
        assert_eq!(ready.pop_highest(), Some(2));
        assert_eq!(ready.pop_highest(), Some(3));
    }

    #[test]
    fn test_push_front_jumps_queue() {
        let mut ready = ReadyQueue::new();
        ready.push_back(1, Priority::Normal);
        ready.push_front(2, Priority::Normal);
        assert_eq!(ready.pop_highest(), Some(2));
    }

    #[test]
    fn test_remove() {
        let mut ready = ReadyQueue::new();
        ready.push_back(1, Priority::Idle);
        ready.push_back(2, Priority::Idle);

        assert!(ready.remove(1, Priority::Idle));
        assert!(!ready.remove(1, Priority::Idle));
        assert!(!ready.contains(1));
        assert!(ready.contains(2));
        assert_eq!(ready.len(), 1);
    }
}
