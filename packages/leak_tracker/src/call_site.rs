//! Call-site capture for access records.
//!
//! Capturing has to be cheap because it happens on every recorded access of
//! every sampled resource, while rendering only happens for resources that
//! actually leaked. The capture therefore takes raw frame addresses only;
//! symbol resolution is deferred to rendering time.

use std::fmt::Write as _;

use backtrace::Backtrace;

use crate::exclusions;

/// Frames sitting on top of every captured trace that belong to this crate's
/// own record plumbing rather than to the caller: `CallSite::capture()`,
/// `AccessRecord::new()`, `TrackerShared::record_inner()` and the public
/// `record()` / `record_with()` wrapper. All four are `#[inline(never)]` so
/// this count stays meaningful across optimization levels.
const PLUMBING_FRAMES: usize = 4;

/// An opaque, lazily renderable capture of the calling stack.
pub(crate) struct CallSite {
    backtrace: Backtrace,
}

impl CallSite {
    /// Captures the calling stack without resolving symbols.
    ///
    /// Must be called at the moment being described - frames are not stable
    /// once the calling function returns.
    #[inline(never)]
    pub(crate) fn capture() -> Self {
        Self {
            backtrace: Backtrace::new_unresolved(),
        }
    }

    /// Appends the captured stack to `out`, one tab-prefixed line per frame.
    ///
    /// Frames belonging to the capture machinery and to this crate's record
    /// plumbing are skipped, as are frames whose (owner, method) pair is in
    /// the exclusion registry. Frames that cannot be symbolized are omitted
    /// rather than rendered as noise.
    pub(crate) fn render_into(&self, out: &mut String) {
        let mut resolved = self.backtrace.clone();
        resolved.resolve();

        let exclusions = exclusions::snapshot();
        let mut plumbing_remaining = PLUMBING_FRAMES;

        for frame in resolved.frames() {
            for symbol in frame.symbols() {
                let Some(name) = symbol.name().map(|name| name.to_string()) else {
                    continue;
                };
                let name = strip_hash_suffix(&name);

                // The backtrace crate's own capture frames sit below our
                // plumbing and are never interesting to anyone.
                if name.starts_with("backtrace::") {
                    continue;
                }

                if plumbing_remaining > 0 {
                    plumbing_remaining -= 1;
                    continue;
                }

                if exclusions.iter().any(|excluded| excluded.matches(name)) {
                    continue;
                }

                out.push('\t');
                out.push_str(name);
                if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                    if let Some(file_name) = file.file_name() {
                        _ = write!(out, " ({}:{line})", file_name.to_string_lossy());
                    }
                }
                out.push('\n');
            }
        }
    }
}

/// Strips the `::h0123456789abcdef` disambiguator that legacy symbol
/// mangling appends to every demangled name.
fn strip_hash_suffix(name: &str) -> &str {
    if let Some((prefix, last)) = name.rsplit_once("::") {
        let mut chars = last.chars();
        if last.len() == 17
            && chars.next() == Some('h')
            && chars.all(|c| c.is_ascii_hexdigit())
        {
            return prefix;
        }
    }

    name
}
