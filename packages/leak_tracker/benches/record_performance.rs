//! Benchmarks for the tracker hot paths.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint;

use criterion::{Criterion, criterion_group, criterion_main};
use leak_tracker::{LeakDetector, Level};
use new_zealand::nz;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_performance");

    LeakDetector::set_level(Level::Paranoid);

    let detector = LeakDetector::builder()
        .resource_type("BenchResource")
        .sampling_interval(nz!(1))
        .build();

    // Steady-state recording: the trail is saturated, so most records are
    // back-off replacements rather than pushes.
    let resource = vec![0_u8; 64];
    let tracker = detector
        .track(&resource)
        .expect("paranoid level always tracks");

    group.bench_function("record_saturated", |b| {
        b.iter(|| {
            tracker.record();
        });
    });

    group.bench_function("record_with_hint", |b| {
        b.iter(|| {
            tracker.record_with(hint::black_box("decode"));
        });
    });

    assert!(tracker.close_for(&resource));

    group.bench_function("track_and_close", |b| {
        b.iter(|| {
            let resource = hint::black_box(0_u64);
            let tracker = detector
                .track(&resource)
                .expect("paranoid level always tracks");
            assert!(tracker.close_for(&resource));
        });
    });

    // The common production case: the sampling gate says no.
    LeakDetector::set_level(Level::Simple);

    let sampled_detector = LeakDetector::builder()
        .resource_type("BenchResource")
        .sampling_interval(nz!(1 << 20))
        .build();

    group.bench_function("track_sampling_miss", |b| {
        b.iter(|| {
            let resource = hint::black_box(0_u64);
            if let Some(tracker) = sampled_detector.track(&resource) {
                assert!(tracker.close_for(&resource));
            }
        });
    });

    group.finish();
}
