//! Process-global registry of call sites elided from rendered access trails.
//!
//! Hosts that wrap every resource operation in a delegating layer end up with
//! that layer's frames on top of every captured trail, drowning out the
//! frames that actually identify the caller. Registering the wrapper's
//! (owner, method) pairs here removes them from all future renderings.
//!
//! The registry is append-only. Entries are published copy-on-write under a
//! compare-and-swap loop, so readers always observe an immutable snapshot and
//! writers never block readers.

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;

static EXCLUSIONS: LazyLock<ArcSwap<Vec<ExcludedCallSite>>> =
    LazyLock::new(|| ArcSwap::from_pointee(Vec::new()));

/// One (owner, method) pair elided from rendered trails.
#[derive(Clone, Debug)]
pub(crate) struct ExcludedCallSite {
    owner: String,
    method: String,
}

impl ExcludedCallSite {
    /// Whether a demangled symbol name refers to this call site.
    ///
    /// The method must be the final path segment and the owner must be the
    /// path immediately preceding it, either in full or as a trailing
    /// suffix - `matches("my_host::buffer::PooledBuffer::release")` holds
    /// for the pair `("PooledBuffer", "release")` as well as for
    /// `("buffer::PooledBuffer", "release")`.
    pub(crate) fn matches(&self, symbol: &str) -> bool {
        let Some((owner_path, method)) = symbol.rsplit_once("::") else {
            return false;
        };

        method == self.method
            && (owner_path == self.owner
                || owner_path
                    .strip_suffix(self.owner.as_str())
                    .is_some_and(|prefix| prefix.ends_with("::")))
    }
}

/// Registers methods of `owner` whose frames should never appear in rendered
/// access trails.
///
/// `owner` is a type or module path (a trailing suffix is enough to match)
/// and each entry of `methods` a plain method name. Without runtime
/// reflection the names cannot be validated against the owner, so they are
/// accepted verbatim; a misspelled entry silently never matches.
///
/// Entries cannot be removed.
///
/// # Panics
///
/// Panics if `owner` is empty, `methods` is empty or any method name is
/// empty.
///
/// # Examples
///
/// ```
/// leak_tracker::add_exclusions("PooledBuffer", &["touch", "checked_slice"]);
/// ```
pub fn add_exclusions(owner: &str, methods: &[&str]) {
    assert!(!owner.is_empty(), "exclusion owner must not be empty");
    assert!(
        !methods.is_empty(),
        "at least one method name must be provided"
    );
    assert!(
        methods.iter().all(|method| !method.is_empty()),
        "excluded method names must not be empty"
    );

    EXCLUSIONS.rcu(|current| {
        let mut next = Vec::with_capacity(current.len() + methods.len());
        next.extend(current.iter().cloned());
        next.extend(methods.iter().map(|method| ExcludedCallSite {
            owner: owner.to_string(),
            method: (*method).to_string(),
        }));
        next
    });
}

/// An immutable snapshot of the registry, consistent for the duration of one
/// trail rendering.
pub(crate) fn snapshot() -> Arc<Vec<ExcludedCallSite>> {
    EXCLUSIONS.load_full()
}
