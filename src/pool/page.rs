use std::ptr::NonNull;

use crate::PAGE_SIZE;
use crate::bitmap::StaticBitmap;

/// One mapped page plus its occupancy and mark state. `Copy` plain data:
/// the pool storing the entry owns the page and runs the unmapping.
#[derive(Clone, Copy)]
pub struct PageTableEntry<const SLOTS: usize, const BLOCKS: usize> {
    pub base: NonNull<u8>,
    /// Bit i set iff slot i holds a live allocation.
    pub occupied: StaticBitmap<SLOTS, BLOCKS>,
    /// Bit i set iff slot i was reached in the current mark phase.
    pub marks: StaticBitmap<SLOTS, BLOCKS>,
}

impl<const SLOTS: usize, const BLOCKS: usize> PageTableEntry<SLOTS, BLOCKS> {
    pub const SLOT_SIZE: usize = PAGE_SIZE / SLOTS;

    pub fn new(base: NonNull<u8>) -> Self {
        Self {
            base,
            occupied: StaticBitmap::new(),
            marks: StaticBitmap::new(),
        }
    }

    #[inline(always)]
    pub fn slot(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < SLOTS);
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(index * Self::SLOT_SIZE)) }
    }

    #[inline(always)]
    pub fn contains(&self, p: *const u8) -> bool {
        let base = self.base.as_ptr() as usize;
        (p as usize) >= base && (p as usize) < base + PAGE_SIZE
    }

    /// Slot index of an interior or base pointer into this page.
    #[inline(always)]
    pub fn slot_index_of(&self, p: *const u8) -> Option<usize> {
        if !self.contains(p) {
            return None;
        }
        Some((p as usize - self.base.as_ptr() as usize) / Self::SLOT_SIZE)
    }
}
