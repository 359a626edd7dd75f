use std::hint::black_box;
use std::thread;

use fastalloc::Collector;
use fastalloc::global::GLOBAL_GC;
use fastalloc::thread_local::{ThreadGc, alloc_64};

#[test]
fn sustained_mixed_class_load_on_the_global_instance() {
    let num_thread = thread::available_parallelism().unwrap();
    let mut threads = Vec::new();

    for _ in 0..num_thread.get() {
        threads.push(thread::spawn(|| {
            let thread_id = thread::current().id();
            let classes = [8usize, 32, 128, 512, 2048];

            for i in 0..10_000 {
                let size = classes[i % classes.len()];
                let info = black_box(GLOBAL_GC.qalloc(size, 0).unwrap());
                assert!(!info.base.is_null());
                unsafe { info.base.write_bytes(0xC3, 1) };
            }

            println!("Global stress, ID: {thread_id:?}, 10000 allocations, no failure");
        }));
    }

    for t in threads {
        t.join().unwrap();
    }
}

#[test]
fn fast_path_churn_reuses_slots_after_cursor_reset() {
    let mut threads = Vec::new();

    for _ in 0..4 {
        threads.push(thread::spawn(|| {
            let tl = ThreadGc::new();
            let mut baseline = None;

            for _ in 0..200 {
                let mut ptrs = Vec::with_capacity(512);
                for _ in 0..512 {
                    ptrs.push(alloc_64(0).unwrap().as_ptr());
                }

                // Free everything and rewind the cursors; the next round
                // must land in the same slots instead of mapping new pages.
                match baseline {
                    None => baseline = Some(ptrs[0]),
                    Some(first) => assert_eq!(ptrs[0], first),
                }
                for p in ptrs {
                    tl.free(p);
                }
                tl.reset_cursors();
            }
        }));
    }

    for t in threads {
        t.join().unwrap();
    }
}

#[test]
fn random_burst_sizes_on_the_global_instance() {
    let num_thread = thread::available_parallelism().unwrap();
    let mut threads = Vec::new();

    for _ in 0..num_thread.get() {
        threads.push(thread::spawn(|| {
            let bursts = rand::random_range(16..64);
            for _ in 0..bursts {
                for _ in 0..128 {
                    let size = rand::random_range(1..=2048);
                    let info = black_box(GLOBAL_GC.qalloc(size, 0).unwrap());
                    assert!(info.size >= size);
                    GLOBAL_GC.free(black_box(info.base));
                }
                GLOBAL_GC.reset_cursors();
            }
        }));
    }

    for t in threads {
        t.join().unwrap();
    }
}
