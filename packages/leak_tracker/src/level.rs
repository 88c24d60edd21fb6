use std::fmt;

/// How much effort the leak detection machinery puts into observing resources.
///
/// Levels are ordered; a comparison such as `level >= Level::Advanced` asks
/// whether at least that much detail is being collected.
///
/// | Level | Cost | What you get |
/// |-------|------|--------------|
/// | [`Disabled`][Level::Disabled] | none | nothing - [`track()`][crate::LeakDetector::track] always returns `None` |
/// | [`Simple`][Level::Simple] | small | a sampled subset of leaks is reported, without access trails |
/// | [`Advanced`][Level::Advanced] | high | sampled leaks are reported with the trail of recorded accesses |
/// | [`Paranoid`][Level::Paranoid] | highest | every allocation is tracked; intended for tests only |
///
/// Whether access trails carry useful content is up to the host: at
/// [`Simple`][Level::Simple] a host typically skips calling
/// [`record()`][crate::ResourceTracker::record], so leaks are reported
/// without trails.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Level {
    /// Disables resource leak detection entirely.
    Disabled,

    /// Samples allocations and reports whether a leak occurred, at the cost
    /// of a small overhead. This is the default.
    #[default]
    Simple,

    /// Samples allocations and reports where a leaked resource was recently
    /// accessed, at the cost of capturing a call site on every recorded
    /// access.
    Advanced,

    /// Tracks every single allocation and reports where leaked resources
    /// were recently accessed, at the highest possible overhead. Intended
    /// for test suites.
    Paranoid,
}

impl Level {
    /// All levels, in ordinal order.
    pub(crate) const ALL: [Self; 4] = [
        Self::Disabled,
        Self::Simple,
        Self::Advanced,
        Self::Paranoid,
    ];

    /// Parses a level from its name (any casing) or its ordinal rendered as
    /// decimal digits. Anything unrecognized falls back to the default level
    /// rather than failing - a misconfigured environment should degrade to
    /// the cheap default, not take the process down.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();

        for level in Self::ALL {
            if trimmed.eq_ignore_ascii_case(level.name())
                || trimmed == (level as u8).to_string()
            {
                return level;
            }
        }

        Self::default()
    }

    /// The canonical (variant) name of the level.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Simple => "simple",
            Self::Advanced => "advanced",
            Self::Paranoid => "paranoid",
        }
    }

    /// Reverses `level as u8`. Only ever fed values previously produced by
    /// that cast.
    pub(crate) fn from_ordinal(ordinal: u8) -> Self {
        match ordinal {
            0 => Self::Disabled,
            1 => Self::Simple,
            2 => Self::Advanced,
            3 => Self::Paranoid,
            _ => unreachable!("the level store only accepts valid ordinals"),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
