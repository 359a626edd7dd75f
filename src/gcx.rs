use std::os::raw::c_void;
use std::ptr::{self, NonNull};

use crate::paged_vec::PagedVec;
use crate::pool::matrix::PoolMatrix;
use crate::{BlockInfo, GcError, GcStats};

/// A registered address range the mark phase will treat as a root region.
#[derive(Debug, Clone, Copy)]
pub struct Range {
    pub bot: *mut u8,
    pub top: *mut u8,
    pub ti: *const c_void,
}

/// One allocator instance: the pool matrix plus the root and range bags and
/// the collection disable depth. The global and the thread-local allocators
/// are both this type under different synchronization.
pub struct Gcx {
    pub(crate) pools: PoolMatrix,
    roots: PagedVec<*mut u8>,
    ranges: PagedVec<Range>,
    disabled: u32,
}

impl Gcx {
    pub const fn new(table_hint: usize) -> Self {
        Self {
            pools: PoolMatrix::new(table_hint),
            roots: PagedVec::new(),
            ranges: PagedVec::new(),
            disabled: 0,
        }
    }

    pub fn malloc(
        &mut self,
        size: usize,
        attr: u32,
        _ti: *const c_void,
    ) -> Result<NonNull<u8>, GcError> {
        let info = self.pools.qalloc(size, attr)?;
        // qalloc never returns a null base.
        Ok(unsafe { NonNull::new_unchecked(info.base) })
    }

    pub fn qalloc(&mut self, size: usize, attr: u32) -> Result<BlockInfo, GcError> {
        self.pools.qalloc(size, attr)
    }

    /// qalloc, then zero the whole class-sized slot. Fresh pages arrive
    /// zeroed from the OS but recycled slots carry old bytes.
    pub fn calloc(
        &mut self,
        size: usize,
        attr: u32,
        _ti: *const c_void,
    ) -> Result<NonNull<u8>, GcError> {
        let info = self.pools.qalloc(size, attr)?;
        unsafe {
            ptr::write_bytes(info.base, 0, info.size);
            Ok(NonNull::new_unchecked(info.base))
        }
    }

    /// Conservative free: clear the slot's occupancy bit when the block can
    /// be located, otherwise a no-op. Slab pointers never reach a foreign
    /// allocator.
    pub fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        let _ = self.pools.free(p);
    }

    pub fn add_root(&mut self, root: *mut u8) -> Result<(), GcError> {
        self.roots.push(root)
    }

    /// Removing a root that was never added is a caller bug and aborts.
    pub fn remove_root(&mut self, root: *mut u8) {
        let Some(index) = self.roots.iter().position(|&r| r == root) else {
            GcError::InvalidMemoryOperation.log_and_abort(root, "removing unknown root", None);
        };
        self.bag_remove_root(index);
    }

    pub fn add_range(&mut self, bot: *mut u8, top: *mut u8, ti: *const c_void) -> Result<(), GcError> {
        debug_assert!(bot <= top);
        self.ranges.push(Range { bot, top, ti })
    }

    /// Ranges are identified by their base pointer, matching `add_range`.
    pub fn remove_range(&mut self, bot: *mut u8) {
        let Some(index) = self.ranges.iter().position(|r| r.bot == bot) else {
            GcError::InvalidMemoryOperation.log_and_abort(bot, "removing unknown range", None);
        };
        match self.ranges.pop_back() {
            Some(back) if index < self.ranges.len() => self.ranges[index] = back,
            _ => {}
        }
    }

    fn bag_remove_root(&mut self, index: usize) {
        // Overwrite with the back entry and pop; order is not part of the
        // bag contract.
        match self.roots.pop_back() {
            Some(back) if index < self.roots.len() => self.roots[index] = back,
            _ => {}
        }
    }

    pub fn roots(&self) -> &[*mut u8] {
        &self.roots
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn disable(&mut self) {
        self.disabled += 1;
    }

    pub fn enable(&mut self) {
        debug_assert!(self.disabled > 0);
        self.disabled = self.disabled.saturating_sub(1);
    }

    /// Collection is suppressed while the disable depth is positive.
    pub fn collection_disabled(&self) -> bool {
        self.disabled > 0
    }

    pub fn stats(&self) -> GcStats {
        GcStats::default()
    }

    /// Start-of-mark-phase hook: every mark bitmap goes back to zero.
    pub fn reset_marks(&mut self) {
        self.pools.reset_marks();
    }

    /// Post-sweep hook: pool cursors move back to their earliest free slot.
    pub fn reset_cursors(&mut self) {
        self.pools.reset_cursors();
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::null_mut;

    use super::*;
    use crate::ATTR_NO_SCAN;

    #[test]
    fn root_bag_add_remove() {
        let mut gcx = Gcx::new(0);
        let r1 = 0x1000 as *mut u8;
        let r2 = 0x2000 as *mut u8;

        gcx.add_root(r1).unwrap();
        gcx.add_root(r2).unwrap();
        assert_eq!(gcx.roots(), &[r1, r2]);

        gcx.remove_root(r1);
        assert_eq!(gcx.roots(), &[r2]);

        gcx.remove_root(r2);
        assert!(gcx.roots().is_empty());
    }

    #[test]
    fn duplicate_roots_are_kept_and_removed_one_at_a_time() {
        let mut gcx = Gcx::new(0);
        let r = 0x3000 as *mut u8;
        gcx.add_root(r).unwrap();
        gcx.add_root(r).unwrap();
        assert_eq!(gcx.roots().len(), 2);

        gcx.remove_root(r);
        assert_eq!(gcx.roots(), &[r]);
    }

    #[test]
    fn range_bag_matches_by_base() {
        let mut gcx = Gcx::new(0);
        let bot = 0x4000 as *mut u8;
        let top = 0x5000 as *mut u8;

        gcx.add_range(bot, top, null_mut()).unwrap();
        assert_eq!(gcx.ranges().len(), 1);
        assert_eq!(gcx.ranges()[0].bot, bot);
        assert_eq!(gcx.ranges()[0].top, top);

        gcx.remove_range(bot);
        assert!(gcx.ranges().is_empty());
    }

    #[test]
    fn disable_depth_nests() {
        let mut gcx = Gcx::new(0);
        assert!(!gcx.collection_disabled());
        gcx.disable();
        gcx.disable();
        gcx.enable();
        assert!(gcx.collection_disabled());
        gcx.enable();
        assert!(!gcx.collection_disabled());
    }

    #[test]
    fn calloc_zeroes_a_recycled_slot() {
        let mut gcx = Gcx::new(0);
        let info = gcx.qalloc(16, ATTR_NO_SCAN).unwrap();
        unsafe { ptr::write_bytes(info.base, 0xAB, info.size) };

        gcx.free(info.base);
        gcx.reset_cursors();

        let fresh = gcx.calloc(16, ATTR_NO_SCAN, null_mut()).unwrap();
        assert_eq!(fresh.as_ptr(), info.base);
        let bytes = unsafe { std::slice::from_raw_parts(fresh.as_ptr(), 16) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn free_of_foreign_pointer_is_a_no_op() {
        let mut gcx = Gcx::new(0);
        gcx.qalloc(8, 0).unwrap();
        let mut local = 0u8;
        gcx.free(&raw mut local);
        gcx.free(null_mut());
        assert!(gcx.pools.owner_of(&raw const local).is_none());
    }

    #[test]
    fn stats_read_zero() {
        let gcx = Gcx::new(0);
        assert_eq!(gcx.stats(), GcStats::default());
    }
}
