use crate::pool::{ceil_class, slot_blocks, small::SmallPool};
use crate::{ATTR_NO_SCAN, BlockInfo, GcError, PAGE_SIZE};

macro_rules! pool_ty {
    ($size:literal) => {
        SmallPool<$size, { PAGE_SIZE / $size }, { slot_blocks(PAGE_SIZE / $size) }>
    };
}

// One field pair and one dispatch arm per size class, so every arm calls a
// concrete pool with the class constant inlined into the slot arithmetic
// and bitmap indexing.
macro_rules! pool_matrix {
    ($( $size:literal => $scan:ident, $noscan:ident; )+) => {
        /// One pool per (size class, scanned-ness) pair.
        pub struct PoolMatrix {
            $(
                pub(crate) $scan: pool_ty!($size),
                pub(crate) $noscan: pool_ty!($size),
            )+
        }

        impl PoolMatrix {
            pub const fn new(table_hint: usize) -> Self {
                Self {
                    $(
                        $scan: SmallPool::new(table_hint),
                        $noscan: SmallPool::new(table_hint),
                    )+
                }
            }

            pub fn set_table_hint(&mut self, entries: usize) {
                $(
                    self.$scan.set_table_hint(entries);
                    self.$noscan.set_table_hint(entries);
                )+
            }

            /// Ceil the size, pick scanned vs unscanned by the NO_SCAN bit,
            /// allocate. An oversize request fails before any page is
            /// mapped; the attribute bits come back verbatim.
            pub fn qalloc(&mut self, size: usize, attr: u32) -> Result<BlockInfo, GcError> {
                let class = ceil_class(size).ok_or(GcError::OutOfMemory)?;
                let unscanned = attr & ATTR_NO_SCAN != 0;
                let base = match (class, unscanned) {
                    $(
                        ($size, false) => self.$scan.allocate_next()?,
                        ($size, true) => self.$noscan.allocate_next()?,
                    )+
                    _ => unreachable!(),
                };
                Ok(BlockInfo {
                    base: base.as_ptr(),
                    size: class,
                    attr,
                })
            }

            /// Conservative free: clear the occupancy bit when some pool
            /// recognizes the pointer.
            pub fn free(&mut self, p: *const u8) -> bool {
                $(
                    if self.$scan.clear_occupied(p) {
                        return true;
                    }
                    if self.$noscan.clear_occupied(p) {
                        return true;
                    }
                )+
                false
            }

            pub fn reset_marks(&mut self) {
                $(
                    self.$scan.reset_marks();
                    self.$noscan.reset_marks();
                )+
            }

            /// Move every pool's cursor back to its earliest free slot, the
            /// post-sweep hook that lets freed slots be handed out again.
            pub fn reset_cursors(&mut self) {
                $(
                    if let Some((page, slot)) = self.$scan.find_free_slot() {
                        self.$scan.reset_cursor(page, slot);
                    }
                    if let Some((page, slot)) = self.$noscan.find_free_slot() {
                        self.$noscan.reset_cursor(page, slot);
                    }
                )+
            }

            /// Which (class, unscanned) pool owns `p`, if any.
            pub fn owner_of(&self, p: *const u8) -> Option<(usize, bool)> {
                $(
                    if self.$scan.entries().iter().any(|entry| entry.contains(p)) {
                        return Some(($size, false));
                    }
                    if self.$noscan.entries().iter().any(|entry| entry.contains(p)) {
                        return Some(($size, true));
                    }
                )+
                None
            }

            pub fn page_count_total(&self) -> usize {
                let mut pages = 0;
                $(
                    pages += self.$scan.page_count();
                    pages += self.$noscan.page_count();
                )+
                pages
            }
        }
    };
}

pool_matrix! {
    8 => scan_8, noscan_8;
    16 => scan_16, noscan_16;
    32 => scan_32, noscan_32;
    64 => scan_64, noscan_64;
    128 => scan_128, noscan_128;
    256 => scan_256, noscan_256;
    512 => scan_512, noscan_512;
    1024 => scan_1024, noscan_1024;
    2048 => scan_2048, noscan_2048;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{LARGEST_CLASS, SMALLEST_CLASS};

    #[test]
    fn dispatch_matches_ceiling_for_every_request() {
        let mut matrix = PoolMatrix::new(0);
        for n in (1..=LARGEST_CLASS).step_by(7) {
            let info = matrix.qalloc(n, 0).unwrap();
            let want = n.max(SMALLEST_CLASS).next_power_of_two();
            assert_eq!(info.size, want, "request of {n} bytes");
            assert_eq!(matrix.owner_of(info.base), Some((want, false)));
            assert_eq!(info.base as usize % want, 0);
        }
    }

    #[test]
    fn no_scan_requests_use_the_unscanned_pool() {
        let mut matrix = PoolMatrix::new(0);
        let scanned = matrix.qalloc(64, 0).unwrap();
        let unscanned = matrix.qalloc(64, ATTR_NO_SCAN).unwrap();

        assert_eq!(matrix.owner_of(scanned.base), Some((64, false)));
        assert_eq!(matrix.owner_of(unscanned.base), Some((64, true)));
        assert_eq!(unscanned.attr, ATTR_NO_SCAN);
    }

    #[test]
    fn attribute_bits_pass_through_verbatim() {
        let mut matrix = PoolMatrix::new(0);
        let attr = crate::ATTR_FINALIZE | crate::ATTR_NO_MOVE | crate::ATTR_APPENDABLE;
        let info = matrix.qalloc(100, attr).unwrap();
        assert_eq!(info.attr, attr);
        assert_eq!(info.size, 128);
    }

    #[test]
    fn oversize_request_maps_nothing() {
        let mut matrix = PoolMatrix::new(0);
        assert_eq!(matrix.qalloc(5000, 0), Err(GcError::OutOfMemory));
        assert_eq!(matrix.page_count_total(), 0);
    }

    #[test]
    fn free_and_cursor_reset_recycle_a_slot() {
        let mut matrix = PoolMatrix::new(0);
        let first = matrix.qalloc(32, 0).unwrap();
        let _second = matrix.qalloc(32, 0).unwrap();

        assert!(matrix.free(first.base));
        assert!(!matrix.free(first.base));

        matrix.reset_cursors();
        let recycled = matrix.qalloc(32, 0).unwrap();
        assert_eq!(recycled.base, first.base);
    }
}
