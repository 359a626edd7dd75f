use std::{
    hint::spin_loop,
    sync::atomic::{AtomicU8, Ordering},
};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

/// Spinlock-based once cell; no allocation, usable from const contexts.
pub struct Once {
    state: AtomicU8,
}

impl Once {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }

    pub fn call_once<F>(&self, f: F)
    where
        F: FnOnce(),
    {
        if self.state.load(Ordering::Acquire) == DONE {
            return;
        }

        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            f();
            self.state.store(DONE, Ordering::Release);
        }

        while self.state.load(Ordering::Acquire) != DONE {
            spin_loop();
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn runs_exactly_once() {
        static ONCE: Once = Once::new();
        static RUNS: AtomicUsize = AtomicUsize::new(0);

        let threads: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    ONCE.call_once(|| {
                        RUNS.fetch_add(1, Ordering::Relaxed);
                    });
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(RUNS.load(Ordering::Relaxed), 1);
        assert!(ONCE.is_completed());
    }
}
