//! Per-thread allocator instances. Each thread's `Gcx` lives in its own
//! mapping, registered under a pthread TLS key whose destructor unmaps every
//! page the instance owns. No locking anywhere on this path; a thread-local
//! instance must never be touched from another thread.

use std::cell::Cell;
use std::marker::PhantomData;
use std::os::raw::c_void;
use std::ptr::{self, NonNull, null_mut};
use std::sync::atomic::{AtomicU32, Ordering};

use libc::{pthread_getspecific, pthread_key_create, pthread_setspecific};

use crate::gcx::Gcx;
use crate::global::{DEFAULT_TABLE_HINT, finalizer_running};
use crate::internals::{env, once::Once};
use crate::sys::{self, memory_system};
use crate::{ATTR_NO_SCAN, BlockInfo, Collector, GcError, GcStats};

static THREAD_KEY: AtomicU32 = AtomicU32::new(0);
static KEY_ONCE: Once = Once::new();

std::thread_local! {
    static TLS: Cell<*mut Gcx> = const { Cell::new(null_mut()) };
}

#[inline(always)]
fn tls_gcx() -> *mut Gcx {
    // try_with: the std cell is gone during thread teardown, but the pthread
    // slot below still resolves the instance.
    let cached = TLS.try_with(Cell::get).unwrap_or(null_mut());
    if !cached.is_null() {
        return cached;
    }
    init_tls()
}

#[cold]
#[inline(never)]
fn init_tls() -> *mut Gcx {
    sys::verify_page_size();

    KEY_ONCE.call_once(|| {
        let mut key: libc::pthread_key_t = 0;
        let rc = unsafe { pthread_key_create(&mut key, Some(teardown_thread_gcx)) };
        if rc != 0 {
            GcError::ThreadCacheFailed.log_and_abort(
                null_mut(),
                "pthread key creation failed",
                Some(rc),
            );
        }
        THREAD_KEY.store(key as u32, Ordering::Release);
    });
    let key = THREAD_KEY.load(Ordering::Acquire) as libc::pthread_key_t;

    let mut gcx = unsafe { pthread_getspecific(key) } as *mut Gcx;
    if gcx.is_null() {
        let bytes = memory_system::page_align(size_of::<Gcx>());
        let raw = match unsafe { memory_system::map_pages(bytes) } {
            Ok(p) => p,
            Err(e) => GcError::ThreadCacheFailed.log_and_abort(
                null_mut(),
                "thread allocator mapping failed",
                Some(e.get_errno()),
            ),
        };

        let hint =
            unsafe { env::get_env_usize(b"GC_TABLE_PAGES") }.unwrap_or(DEFAULT_TABLE_HINT);
        gcx = raw.cast();
        unsafe {
            gcx.write(Gcx::new(hint));
            pthread_setspecific(key, gcx.cast());
        }
    }

    let _ = TLS.try_with(|slot| slot.set(gcx));
    gcx
}

unsafe extern "C" fn teardown_thread_gcx(raw: *mut c_void) {
    // The std TLS cell may already be gone during thread exit.
    let _ = TLS.try_with(|slot| slot.set(null_mut()));

    let gcx = raw as *mut Gcx;
    if gcx.is_null() {
        return;
    }
    // Dropping the instance unmaps every page and page table it owns; the
    // instance's own storage goes last.
    ptr::drop_in_place(gcx);
    let bytes = memory_system::page_align(size_of::<Gcx>());
    let _ = memory_system::unmap_pages(gcx.cast(), bytes);
}

/// Handle to the calling thread's allocator instance. `!Send`, so the
/// no-cross-thread rule is enforced by the type.
pub struct ThreadGc {
    _not_send: PhantomData<*mut Gcx>,
}

impl ThreadGc {
    pub const fn new() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }

    /// Start-of-mark-phase hook for this thread's pools.
    pub fn reset_marks(&self) {
        unsafe { (*tls_gcx()).reset_marks() }
    }

    /// Post-sweep hook for this thread's pools.
    pub fn reset_cursors(&self) {
        unsafe { (*tls_gcx()).reset_cursors() }
    }

    pub fn collection_disabled(&self) -> bool {
        unsafe { (*tls_gcx()).collection_disabled() }
    }
}

impl Collector for ThreadGc {
    fn malloc(&self, size: usize, attr: u32, ti: *const c_void) -> Result<NonNull<u8>, GcError> {
        unsafe { (*tls_gcx()).malloc(size, attr, ti) }
    }

    fn qalloc(&self, size: usize, attr: u32) -> Result<BlockInfo, GcError> {
        unsafe { (*tls_gcx()).qalloc(size, attr) }
    }

    fn calloc(&self, size: usize, attr: u32, ti: *const c_void) -> Result<NonNull<u8>, GcError> {
        unsafe { (*tls_gcx()).calloc(size, attr, ti) }
    }

    fn free(&self, p: *mut u8) {
        unsafe { (*tls_gcx()).free(p) }
    }

    fn add_root(&self, root: *mut u8) -> Result<(), GcError> {
        unsafe { (*tls_gcx()).add_root(root) }
    }

    fn remove_root(&self, root: *mut u8) {
        unsafe { (*tls_gcx()).remove_root(root) }
    }

    fn add_range(&self, bot: *mut u8, top: *mut u8, ti: *const c_void) -> Result<(), GcError> {
        unsafe { (*tls_gcx()).add_range(bot, top, ti) }
    }

    fn remove_range(&self, bot: *mut u8) {
        unsafe { (*tls_gcx()).remove_range(bot) }
    }

    fn enable(&self) {
        unsafe { (*tls_gcx()).enable() }
    }

    fn disable(&self) {
        unsafe { (*tls_gcx()).disable() }
    }

    fn in_finalizer(&self) -> bool {
        finalizer_running()
    }

    fn stats(&self) -> GcStats {
        unsafe { (*tls_gcx()).stats() }
    }
}

// One entry point per size class. Each body hits the concrete pool's
// allocate_next directly, skipping the dispatching switch entirely; this is
// the fast path that pays for the segregated-pool design.
macro_rules! class_fast_paths {
    ($( $name:ident => $size:literal, $scan:ident, $noscan:ident; )+) => {
        $(
            #[inline]
            pub fn $name(attr: u32) -> Result<NonNull<u8>, GcError> {
                let gcx = unsafe { &mut *tls_gcx() };
                let slot = if attr & ATTR_NO_SCAN != 0 {
                    gcx.pools.$noscan.allocate_next()?
                } else {
                    gcx.pools.$scan.allocate_next()?
                };
                debug_assert_eq!(slot.as_ptr() as usize % $size, 0);
                Ok(slot)
            }
        )+
    };
}

class_fast_paths! {
    alloc_8 => 8, scan_8, noscan_8;
    alloc_16 => 16, scan_16, noscan_16;
    alloc_32 => 32, scan_32, noscan_32;
    alloc_64 => 64, scan_64, noscan_64;
    alloc_128 => 128, scan_128, noscan_128;
    alloc_256 => 256, scan_256, noscan_256;
    alloc_512 => 512, scan_512, noscan_512;
    alloc_1024 => 1024, scan_1024, noscan_1024;
    alloc_2048 => 2048, scan_2048, noscan_2048;
}
