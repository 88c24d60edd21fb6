//! Demonstrates leak detection end to end: one resource is released
//! correctly, one is leaked, and the leak is reported on a later allocation.

use leak_tracker::{LeakDetector, Level, ResourceTracker};

/// A stand-in for a pooled, explicitly released resource.
struct PooledBuffer {
    payload: Vec<u8>,
    tracker: Option<ResourceTracker>,
}

impl PooledBuffer {
    fn new(detector: &LeakDetector, capacity: usize) -> Self {
        let payload = vec![0; capacity];
        // Track the heap payload: its address stays put even when the
        // owning handle moves around.
        let tracker = detector.track(payload.as_slice());
        Self { payload, tracker }
    }

    fn write(&mut self, byte: u8) {
        if let Some(tracker) = &self.tracker {
            tracker.record_with("write");
        }
        self.payload[0] = byte;
    }

    fn release(self) {
        if let Some(tracker) = &self.tracker {
            tracker.close_for(self.payload.as_slice());
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    // Track every allocation so the example is deterministic.
    LeakDetector::set_level(Level::Paranoid);

    let detector = LeakDetector::new("PooledBuffer");

    // Correctly released: nothing will be reported for this one.
    let mut released = PooledBuffer::new(&detector, 1024);
    released.write(1);
    released.release();

    // Leaked: dropped without release().
    {
        let mut leaked = PooledBuffer::new(&detector, 1024);
        leaked.write(2);
        leaked.write(3);
    }

    // Leak reports piggyback on later allocations; this one triggers the
    // reclaim-queue drain and the LEAK error event appears on stderr.
    let innocent = PooledBuffer::new(&detector, 16);
    innocent.release();

    println!("active trackers remaining: {}", detector.active_trackers());
}
