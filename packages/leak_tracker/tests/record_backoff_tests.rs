//! Access-trail accounting under exponential back-off.

#![allow(
    clippy::cast_possible_truncation,
    reason = "tests favor succinct arithmetic and do not need to tick all the boxes"
)]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use leak_tracker::{LeakDetector, LeakReporter, Level};
use new_zealand::nz;

/// Serializes tests: both the detection level and the trail-depth target are
/// process-wide.
static CONFIG_LOCK: Mutex<()> = Mutex::new(());

fn lock_config(target_records: u32) -> MutexGuard<'static, ()> {
    let guard = CONFIG_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    LeakDetector::set_level(Level::Paranoid);
    LeakDetector::set_target_records(target_records);
    guard
}

fn tracked_pair() -> (LeakDetector, Vec<u8>) {
    let detector = LeakDetector::builder()
        .resource_type("BackoffResource")
        .sampling_interval(nz!(1))
        .build();
    let resource = vec![0_u8; 16];

    (detector, resource)
}

#[test]
fn every_record_is_either_retained_or_counted_dropped() {
    let _config = lock_config(4);

    let (detector, resource) = tracked_pair();
    let tracker = detector
        .track(&resource)
        .expect("paranoid level always tracks");

    for _ in 0..1000 {
        tracker.record();
    }

    let depth = tracker.trail_len();
    let dropped = tracker.dropped_records() as usize;

    assert_eq!(depth + dropped, 1000);
    assert!(tracker.close_for(&resource));
}

#[test]
fn trail_depth_stays_near_the_target() {
    let _config = lock_config(4);

    let (detector, resource) = tracked_pair();
    let tracker = detector
        .track(&resource)
        .expect("paranoid level always tracks");

    for _ in 0..1000 {
        tracker.record();
    }

    let depth = tracker.trail_len();

    // The keep probability halves per level beyond the target and bottoms
    // out at 1 in 2^30, so depth beyond target + 30 is vanishingly unlikely.
    assert!(depth >= 4, "depth {depth} fell below the target");
    assert!(depth <= 4 + 30, "depth {depth} exceeded the back-off bound");
    assert!(tracker.close_for(&resource));
}

#[test]
fn the_most_recent_access_is_always_retained() {
    let _config = lock_config(4);

    #[derive(Debug, Default)]
    struct TrailCapture {
        trails: Mutex<Vec<String>>,
    }

    impl LeakReporter for TrailCapture {
        fn traced(&self, _resource_type: &str, trail: &str) {
            self.trails
                .lock()
                .expect("capture lock poisoned")
                .push(trail.to_string());
        }

        fn untraced(&self, _resource_type: &str) {}
    }

    let capture = Arc::new(TrailCapture::default());
    let detector = LeakDetector::builder()
        .resource_type("BackoffResource")
        .sampling_interval(nz!(1))
        .reporter(Arc::clone(&capture))
        .build();

    {
        let resource = vec![0_u8; 16];
        let tracker = detector
            .track(&resource)
            .expect("paranoid level always tracks");

        // Far past the target, so plenty of records get dropped along the
        // way - but never the newest one.
        for access in 1..=50 {
            tracker.record_with(format_args!("access-{access}"));
        }
        // Dropped without close: leaked.
    }

    let probe = 0_u8;
    let tracker = detector.track(&probe).expect("paranoid level always tracks");
    assert!(tracker.close_for(&probe));

    let trails = capture.trails.lock().expect("capture lock poisoned");
    assert_eq!(trails.len(), 1);
    assert!(
        trails[0].contains("#1:\n\tHint: access-50\n"),
        "the most recent access is not at the top of the trail: {}",
        trails[0]
    );
    assert!(trails[0].contains("discarded because the leak record count is targeted to 4"));
}

#[test]
fn zero_target_disables_recording() {
    let _config = lock_config(0);

    let (detector, resource) = tracked_pair();
    let tracker = detector
        .track(&resource)
        .expect("paranoid level always tracks");

    for _ in 0..10 {
        tracker.record();
        tracker.record_with("ignored");
    }

    assert_eq!(tracker.trail_len(), 0);
    assert_eq!(tracker.dropped_records(), 0);
    assert!(tracker.close_for(&resource));
}

#[test]
fn a_target_of_one_keeps_only_a_sliver_of_the_trail() {
    let _config = lock_config(1);

    let (detector, resource) = tracked_pair();
    let tracker = detector
        .track(&resource)
        .expect("paranoid level always tracks");

    for _ in 0..200 {
        tracker.record();
    }

    let depth = tracker.trail_len();
    assert!(depth >= 1);
    assert!(depth <= 1 + 30, "depth {depth} exceeded the back-off bound");
    assert_eq!(depth + tracker.dropped_records() as usize, 200);
    assert!(tracker.close_for(&resource));
}
