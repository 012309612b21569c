//! # Stack Arena
//!
//! All task stacks (and the idle context's) are carved out of one block
//! of RAM handed to the kernel at initialization. Regions are allocated
//! first-fit and returned on deletion; neighbouring free extents are
//! merged so a long-running system does not fragment into unusable
//! slivers.
//!
//! Regions are whole multiples of 8 bytes and start on an 8-byte
//! boundary, so every initial stack pointer satisfies AAPCS alignment.
//! Fresh regions are painted with [`STACK_PAINT`] to measure how much of
//! each stack a task has actually touched.

use heapless::Vec;

use crate::config::{MAX_TASKS, STACK_PAINT};
use crate::error::fatal;

/// One free extent per allocated region plus one is the worst case
/// (tasks and the idle context, alternating with holes).
const FREE_EXTENTS: usize = MAX_TASKS + 2;

/// Backing storage for the arena with the alignment the stacks need.
#[repr(C, align(8))]
pub struct StackMemory<const WORDS: usize>([u32; WORDS]);

impl<const WORDS: usize> StackMemory<WORDS> {
    pub const fn new() -> Self {
        Self([0; WORDS])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.0
    }
}

impl<const WORDS: usize> Default for StackMemory<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

/// A stack owned by exactly one task. Word-indexed into the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    start: usize,
    words: usize,
}

impl StackRegion {
    pub(crate) const fn new(start: usize, words: usize) -> Self {
        Self { start, words }
    }

    #[inline]
    pub(crate) const fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub(crate) const fn end(&self) -> usize {
        self.start + self.words
    }

    #[inline]
    pub const fn words(&self) -> usize {
        self.words
    }

    #[inline]
    pub const fn size_bytes(&self) -> usize {
        self.words * 4
    }
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    start: usize,
    words: usize,
}

/// First-fit allocator over the kernel's stack memory.
pub struct StackArena<'a> {
    memory: &'a mut [u32],
    /// Sorted by `start`, never adjacent.
    free: Vec<Extent, FREE_EXTENTS>,
}

impl<'a> StackArena<'a> {
    /// Take over `memory`. A leading word is skipped if the slice is only
    /// 4-byte aligned.
    pub fn new(memory: &'a mut [u32]) -> Self {
        let skip = if memory.as_ptr() as usize % 8 == 0 { 0 } else { 1 };
        let usable = memory.len().saturating_sub(skip) & !1;

        let mut free = Vec::new();
        if usable > 0 {
            // Capacity is at least one
            let _ = free.push(Extent {
                start: skip,
                words: usable,
            });
        }
        Self { memory, free }
    }

    /// Words needed for a stack of `bytes`, rounded up to 8 bytes.
    #[inline]
    pub const fn words_for(bytes: usize) -> usize {
        bytes.div_ceil(8) * 2
    }

    /// Allocate and paint a region of at least `bytes`.
    pub fn alloc(&mut self, bytes: usize) -> Option<StackRegion> {
        let words = Self::words_for(bytes);
        if words == 0 {
            return None;
        }

        let pos = self.free.iter().position(|e| e.words >= words)?;
        let extent = &mut self.free[pos];
        let region = StackRegion::new(extent.start, words);
        if extent.words == words {
            self.free.remove(pos);
        } else {
            extent.start += words;
            extent.words -= words;
        }

        self.memory[region.start()..region.end()].fill(STACK_PAINT);
        Some(region)
    }

    /// Return `region` to the free list, merging with its neighbours.
    pub fn free(&mut self, region: StackRegion) {
        let pos = self
            .free
            .iter()
            .position(|e| e.start > region.start())
            .unwrap_or(self.free.len());

        let joins_prev = pos > 0 && {
            let prev = self.free[pos - 1];
            prev.start + prev.words == region.start()
        };
        let joins_next = pos < self.free.len() && self.free[pos].start == region.end();

        match (joins_prev, joins_next) {
            (true, true) => {
                let next = self.free.remove(pos);
                self.free[pos - 1].words += region.words() + next.words;
            }
            (true, false) => self.free[pos - 1].words += region.words(),
            (false, true) => {
                self.free[pos].start = region.start();
                self.free[pos].words += region.words();
            }
            (false, false) => {
                let extent = Extent {
                    start: region.start(),
                    words: region.words(),
                };
                if self.free.insert(pos, extent).is_err() {
                    fatal("stack free list overflow");
                }
            }
        }
    }

    pub(crate) fn region(&self, region: StackRegion) -> &[u32] {
        &self.memory[region.start()..region.end()]
    }

    pub(crate) fn region_mut(&mut self, region: StackRegion) -> &mut [u32] {
        &mut self.memory[region.start()..region.end()]
    }

    /// Physical address of word `index`.
    #[inline]
    pub fn address_of(&self, index: usize) -> usize {
        self.memory.as_ptr() as usize + index * 4
    }

    /// Word index of `addr`, if it points into the arena.
    pub fn index_of(&self, addr: usize) -> Option<usize> {
        let base = self.memory.as_ptr() as usize;
        let offset = addr.checked_sub(base)?;
        if offset % 4 != 0 || offset / 4 > self.memory.len() {
            return None;
        }
        Some(offset / 4)
    }

    /// `count` words starting at address `addr`.
    pub fn words_at(&self, addr: usize, count: usize) -> Option<&[u32]> {
        let start = self.index_of(addr)?;
        self.memory.get(start..start.checked_add(count)?)
    }

    /// Bytes at the bottom of `region` still carrying the paint.
    pub fn unused_bytes(&self, region: StackRegion) -> usize {
        self.region(region)
            .iter()
            .take_while(|&&word| word == STACK_PAINT)
            .count()
            * 4
    }

    pub fn free_bytes(&self) -> usize {
        self.free.iter().map(|e| e.words * 4).sum()
    }

    pub fn largest_free(&self) -> usize {
        self.free.iter().map(|e| e.words * 4).max().unwrap_or(0)
    }
}
