use rustix::io::Errno;

use crate::{GcError, PAGE_SIZE, internals::once::Once};

mod syscall_unix;

pub const EINVAL: i32 = Errno::INVAL.raw_os_error();
pub const NOMEM: i32 = Errno::NOMEM.raw_os_error();

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SysErr {
    Oom,
    Unaligned,
    /// In-place remapping is not offered on this target.
    Unsupported,
    Other,
}

impl SysErr {
    pub const fn get_errno(&self) -> i32 {
        match self {
            Self::Oom => NOMEM,
            Self::Unaligned => EINVAL,
            Self::Unsupported | Self::Other => 0,
        }
    }
}

static PAGE_CHECK: Once = Once::new();

/// The pools and the paged vector bake `PAGE_SIZE` into their layout, so an
/// OS running with a different granule cannot be tolerated.
pub fn verify_page_size() {
    PAGE_CHECK.call_once(|| {
        let got = rustix::param::page_size();
        if got != PAGE_SIZE {
            GcError::PageSizeMismatch.log_and_abort(
                std::ptr::null_mut(),
                "OS page size differs from the compiled value",
                None,
            );
        }
    });
}

pub mod memory_system {
    use std::os::raw::c_void;

    use super::{SysErr, syscall_unix};
    use crate::PAGE_SIZE;

    pub const fn page_align(bytes: usize) -> usize {
        (bytes + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
    }

    /// Anonymous, zero-filled, read-write mapping rounded up to whole pages.
    pub unsafe fn map_pages(bytes: usize) -> Result<*mut u8, SysErr> {
        syscall_unix::map_memory(page_align(bytes)).map(<*mut c_void>::cast)
    }

    pub unsafe fn unmap_pages(base: *mut u8, bytes: usize) -> Result<(), SysErr> {
        debug_assert!(base as usize % PAGE_SIZE == 0);
        debug_assert!(bytes % PAGE_SIZE == 0);
        syscall_unix::munmap_memory(base.cast(), bytes)
    }

    /// Grow or shrink a mapping in place, relocating when the kernel must.
    /// `SysErr::Unsupported` tells the caller to fall back to
    /// map + copy + unmap.
    pub unsafe fn remap_pages(
        base: *mut u8,
        old_bytes: usize,
        new_bytes: usize,
    ) -> Result<*mut u8, SysErr> {
        debug_assert!(base as usize % PAGE_SIZE == 0);
        syscall_unix::mremap_memory(base.cast(), old_bytes, page_align(new_bytes))
            .map(<*mut c_void>::cast)
    }
}
