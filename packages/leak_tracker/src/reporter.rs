//! Leak report sinks.

use std::sync::Arc;

use crate::config::PROP_LEVEL;

/// Where the reference-counting discipline is documented; included in every
/// report so the message is actionable on its own.
const RESOURCE_DOC_URL: &str = "http://netty.io/wiki/reference-counted-objects.html";

/// Sink for leak reports.
///
/// A [`LeakDetector`][crate::LeakDetector] emits each unique leak exactly
/// once through its reporter. The default, [`TracingReporter`], logs at
/// error severity; test suites typically substitute a recording
/// implementation to assert on emitted reports.
pub trait LeakReporter: Send + Sync {
    /// Whether reports would currently be observed at all.
    ///
    /// When this returns `false` the detector skips trail rendering
    /// entirely and merely retires reclaimed trackers.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Reports a leak whose tracker carried a rendered access trail.
    fn traced(&self, resource_type: &str, trail: &str);

    /// Reports a leak whose tracker carried no access trail.
    fn untraced(&self, resource_type: &str);
}

/// Reports leaks via [`tracing::error!`] events. This is the default
/// reporter.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl LeakReporter for TracingReporter {
    fn is_enabled(&self) -> bool {
        tracing::event_enabled!(tracing::Level::ERROR)
    }

    fn traced(&self, resource_type: &str, trail: &str) {
        tracing::error!("{}", traced_message(resource_type, trail));
    }

    fn untraced(&self, resource_type: &str) {
        tracing::error!("{}", untraced_message(resource_type));
    }
}

impl<R> LeakReporter for Arc<R>
where
    R: LeakReporter + ?Sized,
{
    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn traced(&self, resource_type: &str, trail: &str) {
        (**self).traced(resource_type, trail);
    }

    fn untraced(&self, resource_type: &str) {
        (**self).untraced(resource_type);
    }
}

pub(crate) fn traced_message(resource_type: &str, trail: &str) -> String {
    format!(
        "LEAK: {resource_type}.release() was not called before it's \
         garbage-collected. See {RESOURCE_DOC_URL} for more information.{trail}"
    )
}

pub(crate) fn untraced_message(resource_type: &str) -> String {
    format!(
        "LEAK: {resource_type}.release() was not called before it's \
         garbage-collected. Enable advanced leak reporting to find out where \
         the leak occurred. To enable advanced leak reporting, specify the \
         environment variable '{PROP_LEVEL}=advanced' or call \
         LeakDetector::set_level() See {RESOURCE_DOC_URL} for more information."
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn traced_message_carries_the_trail() {
        let message = traced_message("PooledBuffer", "\nRecent access records: ");

        assert!(message.starts_with(
            "LEAK: PooledBuffer.release() was not called before it's garbage-collected."
        ));
        assert!(message.ends_with("\nRecent access records: "));
    }

    #[test]
    fn untraced_message_explains_how_to_get_trails() {
        let message = untraced_message("PooledBuffer");

        assert!(message.contains("Enable advanced leak reporting"));
        assert!(message.contains("'io.netty.leakDetection.level=advanced'"));
        assert!(message.contains("LeakDetector::set_level()"));
    }
}
