//! Transparent resolution of chain aliases for ordinary operations.

use std::path::{Path, PathBuf};

use l2s_config::log_resolve_trace;
use tracing::field::display;

use crate::classify::{classify, ChainNode};
use crate::sys;

/// The backing file behind a chain alias, or `None` for any other path.
///
/// Hops alias → intermediate → final without touching anything else, so
/// content is read and written on the final node directly. Resolution is
/// best effort: a path that cannot be inspected is left as it is and the
/// real operation reports whatever is wrong with it.
pub fn resolve_transparent(path: &Path) -> Option<PathBuf> {
    let ChainNode::ChainEntry { intermediate } = classify(path).ok()? else {
        return None;
    };
    let final_node = sys::follow_once(&intermediate).ok()?;
    log_resolve_trace!(
        "Alias resolved",
        from = display(path.display()),
        to = display(final_node.display())
    );
    Some(final_node)
}
