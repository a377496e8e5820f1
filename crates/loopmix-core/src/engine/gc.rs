//! Deferred deallocation for slot buffers
//!
//! Slot data sources are held in `basedrop::Shared` pointers. When
//! re-registration replaces a node ring, the old ring may still be referenced
//! by an in-flight render pass; whichever side drops the last reference only
//! enqueues the pointer, and the memory is freed here on a background thread.
//! The render thread therefore never calls into the allocator.
//!
//! ```ignore
//! use basedrop::Shared;
//! use crate::engine::gc::gc_handle;
//!
//! let ring = Shared::new(&gc_handle(), SampleRing::new(4096, 48_000.0));
//! drop(ring); // queued for the collector thread
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the collector thread frees queued buffers
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

/// Process-wide handle for creating `Shared<T>` allocations
///
/// The `Collector` itself lives on a dedicated thread.
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Start the collector thread and return its handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("loopmix-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it is created on the thread that owns it
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Mixer GC thread started");

            loop {
                let freed = collect_pending(&mut collector);
                if freed > 0 {
                    log::debug!("Freed {} replaced slot allocations", freed);
                }
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn mixer GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Free everything queued so far, returning how many allocations went
fn collect_pending(collector: &mut Collector) -> usize {
    let mut freed = 0;
    while collector.collect_one() {
        freed += 1;
    }
    freed
}

/// Handle for creating `Shared<T>` allocations; cheap to clone
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
