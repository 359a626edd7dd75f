use std::cell::UnsafeCell;
use std::os::raw::c_void;
use std::ptr::{NonNull, null_mut};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::gcx::Gcx;
use crate::internals::{
    env,
    lock::{LockGuard, SerialLock},
    once::Once,
};
use crate::{BlockInfo, COLLECTOR_NAME, Collector, GcError, GcStats, sys};

/// Page-table first-growth hint used until the environment override is read.
pub const DEFAULT_TABLE_HINT: usize = 32;

/// The shared allocator instance. Every entry point serializes on the
/// spinlock; the guard releases it on all paths including error
/// propagation.
pub struct GlobalGc {
    lock: SerialLock,
    gcx: UnsafeCell<Gcx>,
}

// All access to the inner Gcx goes through the lock.
unsafe impl Sync for GlobalGc {}

pub static GLOBAL_GC: GlobalGc = GlobalGc::new();

/// Set while a finalizer is on some thread's stack. Touching the global
/// allocator in that window would deadlock against the collector, so it is
/// reported instead.
static IN_FINALIZER: AtomicBool = AtomicBool::new(false);

static INIT: Once = Once::new();

pub fn enter_finalizer() {
    IN_FINALIZER.store(true, Ordering::Release);
}

pub fn leave_finalizer() {
    IN_FINALIZER.store(false, Ordering::Release);
}

pub fn finalizer_running() -> bool {
    IN_FINALIZER.load(Ordering::Acquire)
}

/// Whether the runtime's collector selection names this implementation.
/// Unset means the default applies and we run.
pub fn selected() -> bool {
    unsafe { env::env_matches(b"GC_COLLECTOR", COLLECTOR_NAME) }.unwrap_or(true)
}

impl GlobalGc {
    const fn new() -> Self {
        Self {
            lock: SerialLock::new(),
            gcx: UnsafeCell::new(Gcx::new(DEFAULT_TABLE_HINT)),
        }
    }

    fn lock(&self) -> LockGuard<'_> {
        if finalizer_running() {
            GcError::InvalidMemoryOperation.log_and_abort(
                null_mut(),
                "global allocator entered while a finalizer is running",
                None,
            );
        }

        let guard = self.lock.lock();
        INIT.call_once(|| {
            sys::verify_page_size();
            if let Some(hint) = unsafe { env::get_env_usize(b"GC_TABLE_PAGES") } {
                // Safe under the lock we already hold.
                unsafe { (*self.gcx.get()).pools.set_table_hint(hint) };
            }
        });
        guard
    }

    /// Start-of-mark-phase hook, serialized like every other entry point.
    pub fn reset_marks(&self) {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).reset_marks() }
    }

    /// Post-sweep hook: cursors return to the earliest free slots.
    pub fn reset_cursors(&self) {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).reset_cursors() }
    }

    pub fn collection_disabled(&self) -> bool {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).collection_disabled() }
    }
}

impl Collector for GlobalGc {
    fn malloc(&self, size: usize, attr: u32, ti: *const c_void) -> Result<NonNull<u8>, GcError> {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).malloc(size, attr, ti) }
    }

    fn qalloc(&self, size: usize, attr: u32) -> Result<BlockInfo, GcError> {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).qalloc(size, attr) }
    }

    fn calloc(&self, size: usize, attr: u32, ti: *const c_void) -> Result<NonNull<u8>, GcError> {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).calloc(size, attr, ti) }
    }

    fn free(&self, p: *mut u8) {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).free(p) }
    }

    fn add_root(&self, root: *mut u8) -> Result<(), GcError> {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).add_root(root) }
    }

    fn remove_root(&self, root: *mut u8) {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).remove_root(root) }
    }

    fn add_range(&self, bot: *mut u8, top: *mut u8, ti: *const c_void) -> Result<(), GcError> {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).add_range(bot, top, ti) }
    }

    fn remove_range(&self, bot: *mut u8) {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).remove_range(bot) }
    }

    fn enable(&self) {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).enable() }
    }

    fn disable(&self) {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).disable() }
    }

    fn in_finalizer(&self) -> bool {
        finalizer_running()
    }

    fn stats(&self) -> GcStats {
        let _guard = self.lock();
        unsafe { (*self.gcx.get()).stats() }
    }
}
