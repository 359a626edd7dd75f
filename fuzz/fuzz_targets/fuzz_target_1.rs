#![no_main]

use fastalloc::thread_local::ThreadGc;
use fastalloc::{ATTR_NO_SCAN, Collector};
use libfuzzer_sys::fuzz_target;

// Drives arbitrary allocate/free/rewind sequences through one thread-local
// instance. Oversize requests must error cleanly, everything else must hand
// out writable class-sized slots.
fuzz_target!(|data: &[u8]| {
    let tl = ThreadGc::new();
    let mut live: Vec<*mut u8> = Vec::new();

    for chunk in data.chunks(3) {
        let op = chunk[0] % 4;
        let size = usize::from(chunk.get(1).copied().unwrap_or(1)) * 16 + 1;
        let attr = if chunk.get(2).copied().unwrap_or(0) & 1 != 0 {
            ATTR_NO_SCAN
        } else {
            0
        };

        match op {
            0 | 1 => match tl.qalloc(size, attr) {
                Ok(info) => {
                    assert!(!info.base.is_null());
                    assert!(info.size >= size);
                    assert_eq!(info.attr, attr);
                    unsafe { info.base.write_bytes(0x5A, info.size) };
                    live.push(info.base);
                }
                Err(_) => assert!(size > 2048),
            },
            2 => {
                if let Some(p) = live.pop() {
                    tl.free(p);
                }
            }
            _ => tl.reset_cursors(),
        }
    }

    for p in live.drain(..) {
        tl.free(p);
    }
    tl.reset_cursors();
});
