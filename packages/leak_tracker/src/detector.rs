//! The per-resource-type detector facade.

use std::fmt;
use std::num::NonZero;
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use dashmap::{DashMap, DashSet};
use new_zealand::nz;
use rand::Rng;

use crate::reporter::TracingReporter;
use crate::tracker::{TrackerShared, identity_of};
use crate::{LeakReporter, Level, ResourceTracker, config};

/// State shared between the detector handle and its trackers.
pub(crate) struct DetectorShared {
    resource_type: String,
    sampling_interval: NonZero<u32>,

    /// All live trackers, keyed by tracker address. Holding the owning
    /// `Arc` here is what keeps a tracker's shared state alive for as long
    /// as it is neither closed nor disposed.
    pub(crate) active: DashMap<usize, Arc<TrackerShared>>,

    /// Trackers whose handle was dropped while still active, i.e. whose
    /// resource was reclaimed without a release.
    pub(crate) reclaim_queue: SegQueue<Arc<TrackerShared>>,

    /// Rendered trails that have already been reported. The insert-if-absent
    /// on this set is the one-shot token that makes each unique trail emit
    /// exactly once.
    reported_trails: DashSet<String>,

    reporter: Arc<dyn LeakReporter>,
}

impl DetectorShared {
    fn install(this: &Arc<Self>, tracked_hash: usize) -> ResourceTracker {
        let shared = Arc::new(TrackerShared::new(tracked_hash, Arc::downgrade(this)));

        this.active.insert(shared.key(), Arc::clone(&shared));

        ResourceTracker::new(shared)
    }

    /// Drains the reclaim queue, reporting each previously unseen trail.
    fn report_reclaimed(&self) {
        if !self.reporter.is_enabled() {
            // Nobody is listening; retire the trackers without paying for
            // symbol resolution.
            while let Some(tracker) = self.reclaim_queue.pop() {
                _ = tracker.dispose();
            }
            return;
        }

        while let Some(tracker) = self.reclaim_queue.pop() {
            if !tracker.dispose() {
                // Closed normally in the meantime; not a leak.
                continue;
            }

            let trail = tracker.render_trail();
            if self.reported_trails.insert(trail.clone()) {
                if trail.is_empty() {
                    self.reporter.untraced(&self.resource_type);
                } else {
                    self.reporter.traced(&self.resource_type, &trail);
                }
            }
        }
    }
}

/// Detects leaks of one type of resource.
///
/// A resource leaks when its owner drops the last reference without calling
/// the type's release operation first. The detector notices such leaks after
/// the fact and reports where the leaked resource was last touched.
///
/// # Tracking
///
/// At resource-creation time the host asks the detector for a tracker via
/// [`track()`][Self::track]. Whether one is installed is decided by the
/// process-wide [`Level`] and this detector's sampling interval, so the
/// returned [`Option`] being `None` is the common case and must be treated
/// as "tracking is off for this resource".
///
/// The host embeds the returned [`ResourceTracker`] in the resource (or its
/// owning wrapper), calls [`record()`][ResourceTracker::record] on
/// significant accesses, and calls
/// [`close_for()`][ResourceTracker::close_for] when the resource is released
/// correctly.
///
/// # Reclaim handling
///
/// Dropping a tracker handle that was never closed enqueues it on this
/// detector's reclaim queue. The queue is drained opportunistically on
/// subsequent [`track()`][Self::track] calls; each drained tracker that was
/// not closed is disposed and its rendered trail reported - once per unique
/// trail - through the configured [`LeakReporter`].
///
/// # Examples
///
/// ```
/// use leak_tracker::{LeakDetector, Level};
///
/// LeakDetector::set_level(Level::Paranoid);
///
/// let detector = LeakDetector::new("PooledBuffer");
///
/// let buffer = vec![0_u8; 4096];
/// let tracker = detector.track(&buffer).expect("paranoid level always tracks");
///
/// tracker.record();
///
/// // A correct release retires the tracker.
/// assert!(tracker.close_for(&buffer));
/// drop(buffer);
/// ```
pub struct LeakDetector {
    shared: Arc<DetectorShared>,
}

impl LeakDetector {
    /// The sampling interval used unless
    /// [`builder()`][Self::builder] overrides it. A power of two, which
    /// keeps the uniform draw cheap on the hot path.
    pub const DEFAULT_SAMPLING_INTERVAL: NonZero<u32> = nz!(128);

    /// Creates a builder for configuring and constructing a [`LeakDetector`].
    ///
    /// You must provide a resource-type label via `.resource_type()` or
    /// `.resource_type_of::<T>()` before calling `.build()`.
    #[must_use]
    pub fn builder() -> LeakDetectorBuilder {
        LeakDetectorBuilder::new()
    }

    /// Creates a detector for resources labeled `resource_type`, with the
    /// default sampling interval and reporter.
    ///
    /// # Panics
    ///
    /// Panics if `resource_type` is empty.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self::builder().resource_type(resource_type).build()
    }

    /// Creates a detector labeled with the simple name of `T`, with the
    /// default sampling interval and reporter.
    #[must_use]
    pub fn for_type<T: ?Sized>() -> Self {
        Self::builder().resource_type_of::<T>().build()
    }

    /// Asks the detector to start tracking `resource`.
    ///
    /// Returns `None` when detection is [disabled][Level::Disabled] or the
    /// sampling gate decides to skip this allocation; below
    /// [`Level::Paranoid`] one in `sampling_interval` allocations is
    /// tracked. Callers must treat `None` as a no-op, not as an error.
    ///
    /// The tracker remembers the referent's address so that
    /// [`close_for()`][ResourceTracker::close_for] can assert it is handed
    /// the same resource. Pass a reference whose target does not move while
    /// tracked - for a `Vec`-backed resource that is its heap payload (the
    /// slice), not the owning handle.
    ///
    /// Draining of previously reclaimed trackers piggybacks on the calls
    /// that do install a tracker, so leak reports surface as long as the
    /// host keeps allocating.
    #[must_use]
    pub fn track<T: ?Sized>(&self, resource: &T) -> Option<ResourceTracker> {
        let level = Self::level();
        if level == Level::Disabled {
            return None;
        }

        if level < Level::Paranoid
            && rand::rng().random_range(0..self.shared.sampling_interval.get()) != 0
        {
            return None;
        }

        self.shared.report_reclaimed();
        Some(DetectorShared::install(&self.shared, identity_of(resource)))
    }

    /// The label given to resources tracked by this detector.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.shared.resource_type
    }

    /// This detector's sampling interval.
    #[must_use]
    pub fn sampling_interval(&self) -> NonZero<u32> {
        self.shared.sampling_interval
    }

    /// Number of trackers that are currently neither closed nor disposed.
    #[must_use]
    pub fn active_trackers(&self) -> usize {
        self.shared.active.len()
    }

    /// The process-wide detection level.
    #[must_use]
    pub fn level() -> Level {
        config::level()
    }

    /// Replaces the process-wide detection level.
    ///
    /// Takes effect for subsequent [`track()`][Self::track] calls; a call
    /// racing the change may still observe the previous level, which is
    /// harmless.
    pub fn set_level(level: Level) {
        config::set_level(level);
    }

    /// Whether leak detection is enabled at all.
    #[must_use]
    pub fn is_enabled() -> bool {
        Self::level() > Level::Disabled
    }

    /// The process-wide trail-depth target beyond which access records are
    /// probabilistically collapsed.
    #[must_use]
    pub fn target_records() -> u32 {
        config::target_records()
    }

    /// Replaces the process-wide trail-depth target.
    ///
    /// Primarily an entry point for tests and benchmarks; production
    /// configurations set the corresponding environment variable instead.
    pub fn set_target_records(target: u32) {
        config::set_target_records(target);
    }
}

impl fmt::Debug for LeakDetector {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only, mutation is meaningless.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakDetector")
            .field("resource_type", &self.shared.resource_type)
            .field("sampling_interval", &self.shared.sampling_interval)
            .field("active_trackers", &self.shared.active.len())
            .finish()
    }
}

/// Builds a [`LeakDetector`]; see [`LeakDetector::builder()`].
pub struct LeakDetectorBuilder {
    resource_type: Option<String>,
    sampling_interval: NonZero<u32>,
    reporter: Arc<dyn LeakReporter>,
}

impl LeakDetectorBuilder {
    fn new() -> Self {
        Self {
            resource_type: None,
            sampling_interval: LeakDetector::DEFAULT_SAMPLING_INTERVAL,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Sets the label under which leaks of this resource type are reported.
    #[must_use]
    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    /// Labels resources with the simple name of `T` (the final path segment,
    /// keeping any generic arguments).
    #[must_use]
    pub fn resource_type_of<T: ?Sized>(self) -> Self {
        self.resource_type(simple_type_name::<T>())
    }

    /// Sets how many allocations are skipped for every tracked one at
    /// levels below [`Level::Paranoid`]. An interval of 1 tracks every
    /// allocation.
    #[must_use]
    pub fn sampling_interval(mut self, interval: NonZero<u32>) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Replaces the sink that leak reports are emitted through.
    #[must_use]
    pub fn reporter(mut self, reporter: impl LeakReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Creates the configured [`LeakDetector`].
    ///
    /// # Panics
    ///
    /// Panics if no resource type was provided or the provided label is
    /// empty.
    #[must_use]
    pub fn build(self) -> LeakDetector {
        let resource_type = self
            .resource_type
            .expect("a LeakDetector requires a resource type label");
        assert!(
            !resource_type.is_empty(),
            "the resource type label must not be empty"
        );

        LeakDetector {
            shared: Arc::new(DetectorShared {
                resource_type,
                sampling_interval: self.sampling_interval,
                active: DashMap::new(),
                reclaim_queue: SegQueue::new(),
                reported_trails: DashSet::new(),
                reporter: self.reporter,
            }),
        }
    }
}

impl fmt::Debug for LeakDetectorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakDetectorBuilder")
            .field("resource_type", &self.resource_type)
            .field("sampling_interval", &self.sampling_interval)
            .finish()
    }
}

/// The final path segment of a type name, keeping generic arguments intact.
fn simple_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let (path, generics) = full
        .find('<')
        .map_or((full, ""), |index| full.split_at(index));

    let simple = path.rsplit("::").next().unwrap_or(path);

    format!("{simple}{generics}")
}
