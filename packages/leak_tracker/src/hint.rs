use std::fmt;

/// Caller-supplied context attached to a single access record via
/// [`ResourceTracker::record_with()`][crate::ResourceTracker::record_with].
///
/// This is a narrow capability rather than a blanket formatting bound:
/// a type opts in by providing one method that renders the hint for
/// inclusion in a leak report. Implementations are provided for the plain
/// string types and for [`std::fmt::Arguments`], so ad-hoc context can be
/// recorded without defining a type:
///
/// ```
/// use leak_tracker::{LeakDetector, Level};
///
/// LeakDetector::set_level(Level::Paranoid);
///
/// let detector = LeakDetector::new("Connection");
/// let connection = String::from("db-7");
/// let tracker = detector.track(&connection).expect("paranoid always tracks");
///
/// tracker.record_with("handshake");
/// tracker.record_with(format_args!("query #{}", 42));
///
/// assert!(tracker.close_for(&connection));
/// ```
///
/// The hint is rendered eagerly when the record is created, so later
/// mutations of the hinted state cannot change what a leak report shows.
pub trait TrailHint {
    /// Renders this hint for inclusion in a leak report.
    fn to_hint_string(&self) -> String;
}

impl TrailHint for str {
    fn to_hint_string(&self) -> String {
        self.to_string()
    }
}

impl TrailHint for &str {
    fn to_hint_string(&self) -> String {
        (*self).to_string()
    }
}

impl TrailHint for String {
    fn to_hint_string(&self) -> String {
        self.clone()
    }
}

impl TrailHint for fmt::Arguments<'_> {
    fn to_hint_string(&self) -> String {
        fmt::format(*self)
    }
}
