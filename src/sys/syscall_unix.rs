use std::os::raw::c_void;
use std::ptr::null_mut;

use rustix::mm::{MapFlags, ProtFlags, mmap_anonymous, munmap};

use crate::sys::{EINVAL, NOMEM, SysErr};

pub unsafe fn map_memory(len: usize) -> Result<*mut c_void, SysErr> {
    match mmap_anonymous(
        null_mut(),
        len,
        ProtFlags::READ | ProtFlags::WRITE,
        MapFlags::PRIVATE,
    ) {
        Ok(mapped_ptr) => Ok(mapped_ptr),
        Err(e) => match e.raw_os_error() {
            NOMEM => Err(SysErr::Oom),
            EINVAL => Err(SysErr::Unaligned),
            _ => Err(SysErr::Other),
        },
    }
}

pub unsafe fn munmap_memory(ptr: *mut c_void, len: usize) -> Result<(), SysErr> {
    match munmap(ptr, len) {
        Ok(()) => Ok(()),
        Err(e) => match e.raw_os_error() {
            NOMEM => Err(SysErr::Oom),
            EINVAL => Err(SysErr::Unaligned),
            _ => Err(SysErr::Other),
        },
    }
}

#[cfg(target_os = "linux")]
pub unsafe fn mremap_memory(
    ptr: *mut c_void,
    old_len: usize,
    new_len: usize,
) -> Result<*mut c_void, SysErr> {
    use rustix::mm::{MremapFlags, mremap};

    match mremap(ptr, old_len, new_len, MremapFlags::MAYMOVE) {
        Ok(moved_ptr) => Ok(moved_ptr),
        Err(e) => match e.raw_os_error() {
            NOMEM => Err(SysErr::Oom),
            EINVAL => Err(SysErr::Unaligned),
            _ => Err(SysErr::Other),
        },
    }
}

#[cfg(not(target_os = "linux"))]
pub unsafe fn mremap_memory(
    _ptr: *mut c_void,
    _old_len: usize,
    _new_len: usize,
) -> Result<*mut c_void, SysErr> {
    Err(SysErr::Unsupported)
}
