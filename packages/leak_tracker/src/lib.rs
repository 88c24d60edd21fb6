#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Sampling leak detection for resources that must be explicitly released.
//!
//! Reference-counted native resources - pooled buffers, file handles,
//! connections - leak when their owner drops the last reference without
//! calling the type's release operation first. This crate notices such leaks
//! after the fact and reports *where* the leaked resource was last touched,
//! at a cost low enough to stay enabled in production: only a sampled subset
//! of allocations is tracked, and each tracked resource keeps a bounded,
//! lock-free trail of its recent accesses.
//!
//! # Quick start
//!
//! Create one [`LeakDetector`] per resource type and ask it for a tracker
//! whenever a resource is created. Embed the tracker in the resource so that
//! dropping the resource also drops the tracker:
//!
//! ```
//! use leak_tracker::{LeakDetector, Level, ResourceTracker};
//!
//! // Paranoid tracks every allocation; production code typically leaves
//! // the default (sampled) level in place.
//! LeakDetector::set_level(Level::Paranoid);
//!
//! struct PooledBuffer {
//!     payload: Vec<u8>,
//!     tracker: Option<ResourceTracker>,
//! }
//!
//! impl PooledBuffer {
//!     fn new(detector: &LeakDetector, capacity: usize) -> Self {
//!         let payload = vec![0; capacity];
//!         // Track the heap payload: its address stays put even when the
//!         // owning handle moves around.
//!         let tracker = detector.track(payload.as_slice());
//!         Self { payload, tracker }
//!     }
//!
//!     fn read(&self) -> u8 {
//!         if let Some(tracker) = &self.tracker {
//!             tracker.record();
//!         }
//!         self.payload[0]
//!     }
//!
//!     fn release(self) {
//!         if let Some(tracker) = &self.tracker {
//!             tracker.close_for(self.payload.as_slice());
//!         }
//!         // ... return the payload to the pool ...
//!     }
//! }
//!
//! let detector = LeakDetector::new("PooledBuffer");
//!
//! let buffer = PooledBuffer::new(&detector, 4096);
//! buffer.read();
//! buffer.release();
//! ```
//!
//! A `PooledBuffer` dropped *without* `release()` ends up on the detector's
//! reclaim queue; the next allocation drains the queue and reports the leak
//! through the configured [`LeakReporter`] (by default a
//! [`tracing::error!`] event):
//!
//! ```text
//! LEAK: PooledBuffer.release() was not called before it's garbage-collected. See ...
//! Recent access records:
//! #1:
//!     Hint: decode
//!     my_host::codec::decode (codec.rs:128)
//!     ...
//! Created at:
//!     my_host::pool::PooledBuffer::new (pool.rs:17)
//!     ...
//! ```
//!
//! Each unique trail is reported exactly once per detector, so a leak in a
//! hot path does not flood the log.
//!
//! # Detection levels
//!
//! The process-wide [`Level`] is consulted on every
//! [`track()`][LeakDetector::track] call; see its documentation for the
//! cost/detail trade-off of each level. The level and the trail-depth target
//! can also be set through the environment:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `io.netty.leakDetection.level` | detection level, by name or ordinal | `simple` |
//! | `io.netty.leakDetectionLevel` | legacy alias of the above | - |
//! | `io.netty.noResourceLeakDetection` | legacy; truthy disables detection | - |
//! | `io.netty.leakDetection.targetRecords` | trail-depth target per tracker | `4` |
//!
//! The keys are kept verbatim from Netty's leak detector, which this crate
//! is a Rust rendition of, so existing deployment configuration carries
//! over.
//!
//! # Access trails
//!
//! Every [`ResourceTracker::record()`] captures the calling stack onto the
//! tracker's trail; [`ResourceTracker::record_with()`] attaches a
//! caller-supplied [`TrailHint`] as well. Trails are bounded: once the depth
//! target is reached, further records probabilistically replace the most
//! recent record instead of growing the trail, so the newest access is
//! always retained while memory stays bounded for heavily reused resources.
//!
//! Frames belonging to delegating wrapper layers can be elided from all
//! rendered trails via [`add_exclusions()`].

mod call_site;
mod config;
mod detector;
mod exclusions;
mod hint;
mod level;
mod record;
mod reporter;
mod tracker;

pub use detector::{LeakDetector, LeakDetectorBuilder};
pub use exclusions::add_exclusions;
pub use hint::TrailHint;
pub use level::Level;
pub use reporter::{LeakReporter, TracingReporter};
pub use tracker::ResourceTracker;
