//! Immutable access-record chains.

use std::sync::{Arc, LazyLock};

use crate::call_site::CallSite;

/// The shared chain terminator. Every tracker's trail ends here, so an empty
/// trail and a one-record trail are distinguishable from a closed tracker
/// (whose head slot holds nothing at all).
static BOTTOM: LazyLock<Arc<AccessRecord>> = LazyLock::new(|| {
    Arc::new(AccessRecord {
        hint: None,
        call_site: None,
        next: None,
        pos: -1,
    })
});

/// One node of a tracker's access trail.
///
/// Records are immutable once linked; the trail is only ever mutated by
/// swapping the tracker's head pointer. `pos` is the depth of this record
/// counted from the bottom sentinel, which keeps the current trail depth
/// readable in constant time from the head alone.
pub(crate) struct AccessRecord {
    hint: Option<String>,
    /// `None` only on the bottom sentinel.
    call_site: Option<CallSite>,
    /// `None` only on the bottom sentinel.
    next: Option<Arc<AccessRecord>>,
    pos: i32,
}

impl AccessRecord {
    /// The shared bottom sentinel.
    pub(crate) fn bottom() -> Arc<Self> {
        Arc::clone(&BOTTOM)
    }

    /// Creates a record on top of `next`, capturing the calling stack.
    ///
    /// The capture happens here even if the record is never rendered - the
    /// frames being described are only on the stack right now.
    #[inline(never)]
    pub(crate) fn new(next: Arc<Self>, hint: Option<String>) -> Self {
        let pos = next.pos + 1;

        Self {
            hint,
            call_site: Some(CallSite::capture()),
            next: Some(next),
            pos,
        }
    }

    pub(crate) fn pos(&self) -> i32 {
        self.pos
    }

    pub(crate) fn next(&self) -> Option<&Arc<Self>> {
        self.next.as_ref()
    }

    pub(crate) fn is_bottom(&self) -> bool {
        self.next.is_none()
    }

    /// Whether this record is the oldest real record of its trail.
    pub(crate) fn is_chain_terminal(&self) -> bool {
        self.next.as_ref().is_some_and(|next| next.is_bottom())
    }

    /// Renders the hint line (when present) followed by the captured frames,
    /// one tab-prefixed line each.
    pub(crate) fn render(&self) -> String {
        let mut out = String::with_capacity(512);

        if let Some(hint) = &self.hint {
            out.push_str("\tHint: ");
            out.push_str(hint);
            out.push('\n');
        }

        if let Some(call_site) = &self.call_site {
            call_site.render_into(&mut out);
        }

        out
    }
}
