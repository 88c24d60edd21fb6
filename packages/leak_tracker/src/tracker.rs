//! Trackers observe one resource each and own its access trail.

use std::fmt;
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use foldhash::{HashSet, HashSetExt};
use rand::Rng;

use crate::config;
use crate::detector::DetectorShared;
use crate::record::AccessRecord;
use crate::TrailHint;

// Tracker lifecycle states; see the state diagram on `ResourceTracker`.
// CLOSED and DISPOSED are both terminal - the compare-and-swap from ACTIVE
// is what guarantees that close() and dispose() cannot both succeed.
const TRACKER_ACTIVE: u8 = 0;
const TRACKER_CLOSED: u8 = 1;
const TRACKER_DISPOSED: u8 = 2;

/// The cap on the back-off exponent. Beyond this depth the keep probability
/// stays at 1 in 2^30 instead of shrinking further.
const MAX_BACKOFF_FACTOR: i32 = 30;

/// The address-identity of a resource, captured when tracking begins and
/// asserted when the matching resource is closed.
pub(crate) fn identity_of<T: ?Sized>(resource: &T) -> usize {
    std::ptr::from_ref(resource).cast::<()>() as usize
}

/// State shared between the public handle, the detector's active set and the
/// reclaim queue.
pub(crate) struct TrackerShared {
    /// Top of the access-record chain. Empty means the tracker is closed or
    /// its trail has already been rendered; both are terminal.
    head: ArcSwapOption<AccessRecord>,

    /// Number of access records discarded by back-off.
    dropped_records: AtomicU32,

    /// ACTIVE / CLOSED / DISPOSED.
    state: AtomicU8,

    /// Address-identity of the tracked resource. Never dereferenced - kept
    /// only so `close_for()` can assert it was handed the same resource.
    tracked_hash: usize,

    /// The detector that installed this tracker. Weak so that trackers
    /// sitting in the reclaim queue of an abandoned detector do not keep its
    /// internals alive in a cycle.
    detector: Weak<DetectorShared>,
}

impl TrackerShared {
    pub(crate) fn new(tracked_hash: usize, detector: Weak<DetectorShared>) -> Self {
        Self {
            head: ArcSwapOption::new(Some(AccessRecord::bottom())),
            dropped_records: AtomicU32::new(0),
            state: AtomicU8::new(TRACKER_ACTIVE),
            tracked_hash,
            detector,
        }
    }

    /// The active-set key of this tracker. Address-based: the detector's
    /// map holds the owning `Arc`, so the address cannot be reused while
    /// the entry exists.
    pub(crate) fn key(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == TRACKER_ACTIVE
    }

    /// Appends an access record to the trail.
    ///
    /// Once the trail holds `target_records` entries, each further record
    /// replaces the current top with probability `1 - 1/2^n` (where `n` is
    /// the depth beyond the target, capped at 30) instead of growing the
    /// trail. Because the compare-and-swap drops the *previous* top rather
    /// than the record being pushed, the newest access is always retained
    /// and the trail depth grows only logarithmically with the access count,
    /// while contended retries can only occur at small depths where no drop
    /// decision is needed.
    #[inline(never)]
    pub(crate) fn record_inner(&self, hint: Option<String>) {
        let target = i32::try_from(config::target_records()).unwrap_or(i32::MAX);

        loop {
            let current = self.head.load();
            let Some(old_head) = &*current else {
                // Already closed.
                return;
            };

            if target == 0 {
                return;
            }

            let depth = old_head.pos() + 1;
            let mut dropped = false;

            let predecessor = if depth >= target {
                let backoff_factor = u32::try_from((depth - target).min(MAX_BACKOFF_FACTOR))
                    .expect("depth is at least target here");

                if rand::rng().random_range(0..1_u32 << backoff_factor) != 0 {
                    dropped = true;
                    Arc::clone(
                        old_head
                            .next()
                            .expect("a record at or above the target depth is not the sentinel"),
                    )
                } else {
                    Arc::clone(old_head)
                }
            } else {
                Arc::clone(old_head)
            };

            let new_head = Arc::new(AccessRecord::new(predecessor, hint.clone()));

            let previous = self.head.compare_and_swap(&*current, Some(new_head));
            if same_head(&previous, &current) {
                if dropped {
                    self.dropped_records.fetch_add(1, Ordering::Relaxed);
                }
                return;
            }
        }
    }

    /// Retires the tracker on behalf of a correct release.
    pub(crate) fn close(&self) -> bool {
        if self
            .state
            .compare_exchange(
                TRACKER_ACTIVE,
                TRACKER_CLOSED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        self.remove_from_active();
        self.head.store(None);
        true
    }

    /// Retires the tracker after its resource was reclaimed without a close.
    ///
    /// Returns `true` iff this call moved the tracker out of the active set,
    /// meaning the reclaim really was a leak.
    pub(crate) fn dispose(&self) -> bool {
        if self
            .state
            .compare_exchange(
                TRACKER_ACTIVE,
                TRACKER_DISPOSED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        self.remove_from_active();
        true
    }

    fn remove_from_active(&self) {
        if let Some(detector) = self.detector.upgrade() {
            _ = detector.active.remove(&self.key());
        }
    }

    pub(crate) fn trail_len(&self) -> usize {
        match &*self.head.load() {
            Some(head) => usize::try_from(head.pos() + 1).unwrap_or(0),
            None => 0,
        }
    }

    pub(crate) fn dropped_records(&self) -> u32 {
        self.dropped_records.load(Ordering::Relaxed)
    }

    pub(crate) fn tracked_hash(&self) -> usize {
        self.tracked_hash
    }

    /// Renders and consumes the access trail.
    ///
    /// The swap is atomic, so exactly one caller observes the chain; all
    /// others (and any tracker that was closed normally) get the empty
    /// string. Identical record renderings are collapsed and counted.
    pub(crate) fn render_trail(&self) -> String {
        let Some(head) = self.head.swap(None) else {
            return String::new();
        };

        // A trail that never recorded an access renders empty; that is what
        // routes the leak to the untraced report.
        if head.is_bottom() {
            return String::new();
        }

        let dropped = self.dropped_records();
        let present = usize::try_from(head.pos() + 1).unwrap_or(0);

        let mut out = String::with_capacity(present.saturating_mul(2048).max(64));
        out.push('\n');
        out.push_str("Recent access records: \n");

        let mut seen = HashSet::with_capacity(present);
        let mut index = 1_u32;
        let mut duped = 0_u32;

        let mut cursor: &Arc<AccessRecord> = &head;
        while !cursor.is_bottom() {
            let rendered = cursor.render();
            if seen.insert(rendered.clone()) {
                if cursor.is_chain_terminal() {
                    out.push_str("Created at:\n");
                } else {
                    _ = writeln!(out, "#{index}:");
                    index += 1;
                }
                out.push_str(&rendered);
            } else {
                duped += 1;
            }

            cursor = cursor.next().expect("non-sentinel record has a predecessor");
        }

        if duped > 0 {
            _ = writeln!(
                out,
                ": {duped} leak records were discarded because they were duplicates"
            );
        }

        if dropped > 0 {
            _ = writeln!(
                out,
                ": {dropped} leak records were discarded because the leak record \
                 count is targeted to {}. Use the environment variable {} to \
                 increase the limit.",
                config::target_records(),
                config::PROP_TARGET_RECORDS,
            );
        }

        if out.ends_with('\n') {
            out.pop();
        }

        out
    }
}

/// Compares two head observations by chain identity. Records are freshly
/// allocated on every push, so pointer equality is exact and ABA-free.
fn same_head(a: &Option<Arc<AccessRecord>>, b: &Option<Arc<AccessRecord>>) -> bool {
    let ptr_of =
        |head: &Option<Arc<AccessRecord>>| head.as_ref().map_or(std::ptr::null(), Arc::as_ptr);

    std::ptr::eq(ptr_of(a), ptr_of(b))
}

/// Observes one tracked resource and owns its access trail.
///
/// Handles are produced by [`LeakDetector::track()`][crate::LeakDetector::track]
/// and are meant to be embedded in the resource they observe (or in its
/// owning wrapper), so that dropping the resource also drops the handle.
/// The handle holds no reference to the resource itself and can never extend
/// its lifetime.
///
/// The lifecycle, from the detector's point of view:
///
/// ```text
///                track()
///   ┌─── (none) ──────────► ACTIVE ───────── close() ────────► CLOSED
///                                │
///                                │ handle dropped while active
///                                ▼
///                            ENQUEUED ── dispose() ──► REPORTED
/// ```
///
/// A correct release calls [`close_for()`][Self::close_for] (or
/// [`close()`][Self::close]) before the handle is dropped; dropping an
/// active handle is what marks the resource as leaked.
pub struct ResourceTracker {
    shared: Arc<TrackerShared>,
}

impl ResourceTracker {
    pub(crate) fn new(shared: Arc<TrackerShared>) -> Self {
        Self { shared }
    }

    /// Records the calling stack on the access trail.
    ///
    /// Does nothing if the tracker is already closed.
    #[inline(never)]
    pub fn record(&self) {
        self.shared.record_inner(None);
    }

    /// Records the calling stack on the access trail, annotated with `hint`.
    ///
    /// The hint is rendered immediately; a panicking hint is discarded and
    /// the access is recorded without one. Does nothing if the tracker is
    /// already closed.
    #[inline(never)]
    pub fn record_with<H>(&self, hint: H)
    where
        H: TrailHint,
    {
        // A misbehaving hint must not poison the tracker.
        let hint = panic::catch_unwind(AssertUnwindSafe(|| hint.to_hint_string())).ok();

        self.shared.record_inner(hint);
    }

    /// Retires the tracker because the resource was released correctly.
    ///
    /// Returns `true` exactly once across all callers; every later call
    /// (and a concurrent [`dispose`]-winning race) observes `false`. After
    /// a successful close the handle can no longer end up on the reclaim
    /// queue.
    ///
    /// [`dispose`]: crate::LeakDetector#reclaim-handling
    pub fn close(&self) -> bool {
        self.shared.close()
    }

    /// Like [`close()`][Self::close], additionally asserting that `resource`
    /// is the object this tracker was installed for.
    ///
    /// The identity is the referent's address, so the reference must target
    /// the same (unmoved) object that was handed to
    /// [`track()`][crate::LeakDetector::track]. In debug builds a mismatch
    /// panics; in release builds the close proceeds regardless, as the
    /// assertion is purely diagnostic.
    pub fn close_for<T: ?Sized>(&self, resource: &T) -> bool {
        debug_assert_eq!(
            identity_of(resource),
            self.shared.tracked_hash(),
            "close_for() was handed a different resource than the tracked one"
        );

        self.shared.close()
    }

    /// Current depth of the access trail. Zero once the tracker is closed.
    #[must_use]
    pub fn trail_len(&self) -> usize {
        self.shared.trail_len()
    }

    /// Number of access records discarded by back-off so far.
    #[must_use]
    pub fn dropped_records(&self) -> u32 {
        self.shared.dropped_records()
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        // Dropping an active handle means the resource was reclaimed without
        // a release. A stale read here is fine: dispose() re-checks under
        // compare-and-swap, so a racing close() still wins cleanly.
        if !self.shared.is_active() {
            return;
        }

        if let Some(detector) = self.shared.detector.upgrade() {
            detector.reclaim_queue.push(Arc::clone(&self.shared));
        }
    }
}

impl fmt::Debug for ResourceTracker {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only, mutation is meaningless.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("active", &self.shared.is_active())
            .field("trail_len", &self.trail_len())
            .field("dropped_records", &self.dropped_records())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::cast_possible_truncation,
    reason = "tests favor succinct arithmetic and do not need to tick all the boxes"
)]
mod tests {
    use super::*;

    /// A tracker with no detector behind it; close/dispose still work, the
    /// active-set removal just has nothing to do.
    fn orphan_tracker() -> ResourceTracker {
        ResourceTracker::new(Arc::new(TrackerShared::new(0, Weak::new())))
    }

    #[test]
    fn close_returns_true_exactly_once() {
        let tracker = orphan_tracker();

        assert!(tracker.close());
        assert!(!tracker.close());
        assert!(!tracker.close());
    }

    #[test]
    fn close_and_dispose_are_mutually_exclusive() {
        let tracker = orphan_tracker();

        assert!(tracker.shared.dispose());
        assert!(!tracker.close());

        let tracker = orphan_tracker();

        assert!(tracker.close());
        assert!(!tracker.shared.dispose());
    }

    #[test]
    fn close_for_verifies_the_resource_identity() {
        let resource = vec![1_u8, 2, 3];
        let tracker = ResourceTracker::new(Arc::new(TrackerShared::new(
            identity_of(&resource),
            Weak::new(),
        )));

        assert!(tracker.close_for(&resource));
        assert!(!tracker.close_for(&resource));
    }

    #[test]
    fn record_after_close_is_a_no_op() {
        let tracker = orphan_tracker();
        tracker.record();
        assert_eq!(tracker.trail_len(), 1);

        assert!(tracker.close());

        tracker.record();
        tracker.record_with("late");
        assert_eq!(tracker.trail_len(), 0);
    }

    #[test]
    fn recorded_accesses_are_never_lost_only_collapsed() {
        let tracker = orphan_tracker();

        for _ in 0..100 {
            tracker.record();
        }

        assert_eq!(
            tracker.trail_len() + tracker.dropped_records() as usize,
            100
        );
        assert!(tracker.close());
    }

    #[test]
    fn panicking_hints_are_swallowed() {
        struct ExplosiveHint;

        impl TrailHint for ExplosiveHint {
            fn to_hint_string(&self) -> String {
                panic!("refusing to render")
            }
        }

        let tracker = orphan_tracker();
        tracker.record_with(ExplosiveHint);

        assert_eq!(tracker.trail_len(), 1);

        let trail = tracker.shared.render_trail();
        assert!(!trail.contains("Hint:"));
    }

    #[test]
    fn trail_renders_newest_record_first() {
        let tracker = orphan_tracker();
        tracker.record_with("first");
        tracker.record_with("second");
        tracker.record_with("third");

        let trail = tracker.shared.render_trail();

        assert!(trail.starts_with("\nRecent access records: \n"));
        assert!(trail.contains("#1:"));
        assert!(trail.contains("Created at:"));

        let newest = trail.find("Hint: third").expect("newest hint missing");
        let oldest = trail.find("Hint: first").expect("oldest hint missing");
        assert!(newest < oldest);
    }

    #[test]
    fn trail_rendering_is_one_shot() {
        let tracker = orphan_tracker();
        tracker.record();

        assert!(!tracker.shared.render_trail().is_empty());
        assert!(tracker.shared.render_trail().is_empty());
    }

    #[test]
    fn recordless_trackers_render_an_empty_trail() {
        let tracker = orphan_tracker();

        assert!(tracker.shared.render_trail().is_empty());
    }

    #[test]
    fn closed_trackers_render_an_empty_trail() {
        let tracker = orphan_tracker();
        tracker.record();
        assert!(tracker.close());

        assert!(tracker.shared.render_trail().is_empty());
    }
}
