use std::{
    hint::spin_loop,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

/// Releases the lock on drop, so every exit path including error
/// propagation unlocks.
pub struct LockGuard<'a>(&'a AtomicBool);

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Contention-tolerant spinlock: a bounded burst of `spin_loop` hints, then
/// the holder's time slice is handed back to the scheduler.
pub struct SerialLock {
    state: AtomicBool,
}

impl SerialLock {
    const SPIN_LIMIT: u32 = 64;

    pub const fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    pub fn lock(&self) -> LockGuard<'_> {
        loop {
            if self
                .state
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return LockGuard(&self.state);
            }

            let mut spins = 0;
            while self.state.load(Ordering::Relaxed) {
                if spins < Self::SPIN_LIMIT {
                    spins += 1;
                    spin_loop();
                } else {
                    thread::yield_now();
                }
            }
        }
    }

    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        if self
            .state
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(LockGuard(&self.state))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let lock = SerialLock::new();
        {
            let _guard = lock.lock();
            assert!(lock.try_lock().is_none());
        }
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn serializes_counter_updates() {
        static LOCK: SerialLock = SerialLock::new();
        static HITS: AtomicUsize = AtomicUsize::new(0);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    for _ in 0..10_000 {
                        let _guard = LOCK.lock();
                        let seen = HITS.load(Ordering::Relaxed);
                        HITS.store(seen + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(HITS.load(Ordering::Relaxed), 80_000);
    }
}
