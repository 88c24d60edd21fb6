//! Process-wide detection tunables.
//!
//! Both tunables live in module-scoped atomics that are initialized from the
//! process environment on first use and may be changed at runtime. A write
//! racing a read is benign: at worst one sampling decision observes the
//! previous value.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use crate::Level;

/// Preferred environment key selecting the detection level.
pub(crate) const PROP_LEVEL: &str = "io.netty.leakDetection.level";

/// Legacy environment key selecting the detection level. Consulted only when
/// [`PROP_LEVEL`] is absent.
pub(crate) const PROP_LEVEL_LEGACY: &str = "io.netty.leakDetectionLevel";

/// Legacy boolean environment key; a truthy value forces
/// [`Level::Disabled`].
pub(crate) const PROP_NO_DETECTION: &str = "io.netty.noResourceLeakDetection";

/// Environment key bounding the access-trail depth per tracker.
pub(crate) const PROP_TARGET_RECORDS: &str = "io.netty.leakDetection.targetRecords";

const DEFAULT_TARGET_RECORDS: u32 = 4;

static LEVEL: LazyLock<AtomicU8> =
    LazyLock::new(|| AtomicU8::new(initial_level(property) as u8));

static TARGET_RECORDS: LazyLock<AtomicU32> =
    LazyLock::new(|| AtomicU32::new(initial_target_records(property)));

/// The current detection level.
pub(crate) fn level() -> Level {
    Level::from_ordinal(LEVEL.load(Ordering::Relaxed))
}

/// Replaces the detection level for the whole process.
pub(crate) fn set_level(level: Level) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// The trail depth beyond which recorded accesses start replacing the most
/// recent record instead of growing the trail.
pub(crate) fn target_records() -> u32 {
    TARGET_RECORDS.load(Ordering::Relaxed)
}

/// Replaces the target trail depth for the whole process.
pub(crate) fn set_target_records(target: u32) {
    TARGET_RECORDS.store(target, Ordering::Relaxed);
}

fn property(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Resolves the startup detection level from configuration properties.
///
/// The legacy disable switch is honored first and only shifts the default;
/// an explicit level always wins. The preferred key shadows the legacy key.
fn initial_level(lookup: impl Fn(&str) -> Option<String>) -> Level {
    let disabled = match lookup(PROP_NO_DETECTION) {
        Some(value) => {
            let disabled = parse_bool(&value, false);
            tracing::debug!("{PROP_NO_DETECTION}: {disabled}");
            tracing::warn!(
                "{PROP_NO_DETECTION} is deprecated. Use '{PROP_LEVEL}={}' instead.",
                Level::default(),
            );
            disabled
        }
        None => false,
    };

    let default_level = if disabled {
        Level::Disabled
    } else {
        Level::default()
    };

    let level_value = lookup(PROP_LEVEL)
        .or_else(|| lookup(PROP_LEVEL_LEGACY))
        .unwrap_or_else(|| default_level.to_string());

    let level = Level::parse(&level_value);
    tracing::debug!("{PROP_LEVEL}: {level}");
    level
}

fn initial_target_records(lookup: impl Fn(&str) -> Option<String>) -> u32 {
    let target = lookup(PROP_TARGET_RECORDS)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_TARGET_RECORDS);

    tracing::debug!("{PROP_TARGET_RECORDS}: {target}");
    target
}

/// Interprets a property value as a boolean the way the contractual keys
/// have historically been interpreted: the empty string, `true`, `yes` and
/// `1` are truthy; `false`, `no` and `0` are falsy; anything else yields the
/// provided default.
fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        _ => default,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn no_properties(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn level_defaults_to_simple() {
        assert_eq!(initial_level(no_properties), Level::Simple);
    }

    #[test]
    fn preferred_level_key_wins() {
        let lookup = |name: &str| match name {
            PROP_LEVEL => Some("paranoid".to_string()),
            PROP_LEVEL_LEGACY => Some("disabled".to_string()),
            _ => None,
        };

        assert_eq!(initial_level(lookup), Level::Paranoid);
    }

    #[test]
    fn legacy_level_key_applies_when_preferred_is_absent() {
        let lookup = |name: &str| {
            (name == PROP_LEVEL_LEGACY).then(|| "advanced".to_string())
        };

        assert_eq!(initial_level(lookup), Level::Advanced);
    }

    #[test]
    fn legacy_disable_switch_shifts_the_default() {
        let lookup = |name: &str| {
            (name == PROP_NO_DETECTION).then(|| "true".to_string())
        };

        assert_eq!(initial_level(lookup), Level::Disabled);
    }

    #[test]
    fn explicit_level_overrides_the_disable_switch() {
        let lookup = |name: &str| match name {
            PROP_NO_DETECTION => Some("true".to_string()),
            PROP_LEVEL => Some("simple".to_string()),
            _ => None,
        };

        assert_eq!(initial_level(lookup), Level::Simple);
    }

    #[test]
    fn unparseable_level_falls_back_to_simple() {
        let lookup = |name: &str| {
            (name == PROP_LEVEL).then(|| "shouting".to_string())
        };

        assert_eq!(initial_level(lookup), Level::Simple);
    }

    #[test]
    fn target_records_defaults_to_four() {
        assert_eq!(initial_target_records(no_properties), 4);
    }

    #[test]
    fn target_records_reads_the_property() {
        let lookup = |name: &str| {
            (name == PROP_TARGET_RECORDS).then(|| " 16 ".to_string())
        };

        assert_eq!(initial_target_records(lookup), 16);
    }

    #[test]
    fn garbage_target_records_keeps_the_default() {
        let lookup = |name: &str| {
            (name == PROP_TARGET_RECORDS).then(|| "lots".to_string())
        };

        assert_eq!(initial_target_records(lookup), 4);
    }

    #[test]
    fn boolean_properties_parse_leniently() {
        assert!(parse_bool("", false));
        assert!(parse_bool("true", false));
        assert!(parse_bool("YES", false));
        assert!(parse_bool("1", false));
        assert!(!parse_bool("false", true));
        assert!(!parse_bool("No", true));
        assert!(!parse_bool("0", true));
        assert!(parse_bool("maybe", true));
        assert!(!parse_bool("maybe", false));
    }
}
