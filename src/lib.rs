#![warn(clippy::nursery, clippy::pedantic)]
#![allow(
    unsafe_op_in_unsafe_fn,
    clippy::inline_always,
    clippy::new_without_default,
    clippy::module_name_repetitions,
    clippy::missing_safety_doc,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation
)]

use std::fmt::Debug;
use std::os::raw::c_void;
use std::ptr::NonNull;

pub mod bitmap;
pub mod gcx;
pub mod global;
pub mod internals;
pub mod paged_vec;
pub mod pool;
pub mod sys;
pub mod thread_local;

/// Slots, pages and the paged vector all assume this page size; the OS value
/// is verified once at startup and a mismatch is fatal.
pub const PAGE_SIZE: usize = 4096;
pub const WORD_SIZE: usize = size_of::<usize>();

const _: () = assert!(PAGE_SIZE.is_power_of_two());

/// The collector implementation this crate answers to when the runtime
/// selects one by name.
pub const COLLECTOR_NAME: &[u8] = b"fastalloc";

// Allocation attribute bits. Only NO_SCAN is interpreted here; the rest
// travel through BlockInfo untouched.
pub const ATTR_FINALIZE: u32 = 0b0001;
pub const ATTR_NO_SCAN: u32 = 0b0010;
pub const ATTR_NO_MOVE: u32 = 0b0100;
pub const ATTR_APPENDABLE: u32 = 0b1000;

/// Result of a qualified allocation: slot base, the rounded-up size class in
/// bytes, and the request's attribute bits verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub base: *mut u8,
    pub size: usize,
    pub attr: u32,
}

/// Heap statistics snapshot. Accounting is not wired up in this core; every
/// field reads zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    pub pool_size: usize,
    pub used_size: usize,
    pub free_size: usize,
}

#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    OutOfMemory = 0x2000,
    InvalidMemoryOperation = 0x2001,
    PageSizeMismatch = 0x2002,
    ThreadCacheFailed = 0x2003,
}

impl Debug for GcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "OutOfMemory (0x2000)"),
            Self::InvalidMemoryOperation => write!(f, "InvalidMemoryOperation (0x2001)"),
            Self::PageSizeMismatch => write!(f, "PageSizeMismatch (0x2002)"),
            Self::ThreadCacheFailed => write!(f, "ThreadCacheFailed (0x2003)"),
        }
    }
}

impl GcError {
    pub fn log_and_abort(&self, ptr: *mut u8, extra: &str, errno: Option<i32>) -> ! {
        if let Some(errno) = errno {
            eprintln!(
                "[FASTALLOC FATAL] {:?} at ptr={:p} | {} | errno({})",
                self, ptr, extra, errno
            );
        } else {
            eprintln!("[FASTALLOC FATAL] {:?} at ptr={:p} | {}", self, ptr, extra);
        }
        std::process::abort();
    }
}

/// The operation set the runtime consumes through a collector handle. The
/// global instance serializes every call behind its lock; the thread-local
/// instance takes none and must stay on its owning thread.
pub trait Collector {
    fn malloc(&self, size: usize, attr: u32, ti: *const c_void) -> Result<NonNull<u8>, GcError>;
    fn qalloc(&self, size: usize, attr: u32) -> Result<BlockInfo, GcError>;
    fn calloc(&self, size: usize, attr: u32, ti: *const c_void) -> Result<NonNull<u8>, GcError>;
    fn free(&self, p: *mut u8);
    fn add_root(&self, root: *mut u8) -> Result<(), GcError>;
    fn remove_root(&self, root: *mut u8);
    fn add_range(&self, bot: *mut u8, top: *mut u8, ti: *const c_void) -> Result<(), GcError>;
    fn remove_range(&self, bot: *mut u8);
    fn enable(&self);
    fn disable(&self);
    fn in_finalizer(&self) -> bool;
    fn stats(&self) -> GcStats;
}
