//! Thread-safety integration tests for `leak_tracker`.
//!
//! These verify that the public API types can be shared between threads and
//! that concurrent recording and closing preserve the trail accounting.

#![allow(
    clippy::cast_possible_truncation,
    reason = "tests favor succinct arithmetic and do not need to tick all the boxes"
)]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use leak_tracker::{
    LeakDetector, LeakDetectorBuilder, Level, ResourceTracker, TracingReporter,
};
use new_zealand::nz;
use static_assertions::assert_impl_all;

assert_impl_all!(LeakDetector: Send, Sync);
assert_impl_all!(LeakDetectorBuilder: Send);
assert_impl_all!(ResourceTracker: Send, Sync);
assert_impl_all!(Level: Send, Sync, Copy);
assert_impl_all!(TracingReporter: Send, Sync, Copy);

static LEVEL_LOCK: Mutex<()> = Mutex::new(());

fn set_level_locked(level: Level) -> MutexGuard<'static, ()> {
    let guard = LEVEL_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    LeakDetector::set_level(level);
    guard
}

#[test]
fn detectors_can_be_shared_across_threads() {
    let _level = set_level_locked(Level::Paranoid);

    let detector = Arc::new(
        LeakDetector::builder()
            .resource_type("SharedResource")
            .sampling_interval(nz!(1))
            .build(),
    );

    thread::scope(|scope| {
        for _ in 0..4 {
            let detector = Arc::clone(&detector);
            scope.spawn(move || {
                for _ in 0..100 {
                    let resource = vec![0_u8; 8];
                    let tracker = detector
                        .track(&resource)
                        .expect("paranoid level always tracks");
                    tracker.record();
                    assert!(tracker.close_for(&resource));
                }
            });
        }
    });

    assert_eq!(detector.active_trackers(), 0);
}

#[test]
fn concurrent_records_are_all_accounted_for() {
    let _level = set_level_locked(Level::Paranoid);

    let detector = LeakDetector::builder()
        .resource_type("SharedResource")
        .sampling_interval(nz!(1))
        .build();

    let resource = vec![0_u8; 8];
    let tracker = Arc::new(
        detector
            .track(&resource)
            .expect("paranoid level always tracks"),
    );

    let threads = 8;
    let records_per_thread = 500;

    thread::scope(|scope| {
        for worker in 0..threads {
            let tracker = Arc::clone(&tracker);
            scope.spawn(move || {
                for access in 0..records_per_thread {
                    if access % 2 == 0 {
                        tracker.record();
                    } else {
                        tracker.record_with(format_args!("worker-{worker}"));
                    }
                }
            });
        }
    });

    let total = tracker.trail_len() + tracker.dropped_records() as usize;
    assert_eq!(total, threads * records_per_thread);

    assert!(tracker.close_for(&resource));
}

#[test]
fn exclusions_can_be_registered_concurrently() {
    thread::scope(|scope| {
        for writer in 0..8 {
            scope.spawn(move || {
                let owner = format!("ConcurrentOwner{writer}");
                for batch in 0..10 {
                    let method = format!("method_{batch}");
                    leak_tracker::add_exclusions(&owner, &[&method]);
                }
            });
        }
    });
}

#[test]
fn trackers_can_migrate_between_threads() {
    let _level = set_level_locked(Level::Paranoid);

    let detector = LeakDetector::builder()
        .resource_type("SharedResource")
        .sampling_interval(nz!(1))
        .build();

    let resource = vec![0_u8; 8];
    let tracker = detector
        .track(&resource)
        .expect("paranoid level always tracks");

    let tracker = thread::spawn(move || {
        tracker.record();
        tracker
    })
    .join()
    .expect("recording thread panicked");

    assert_eq!(tracker.trail_len(), 1);
    assert!(tracker.close_for(&resource));
}
