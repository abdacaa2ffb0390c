//! Removal bookkeeping: drop one alias from a chain before the alias itself
//! is unlinked or renamed over.

use std::path::Path;

use l2s_config::{log_shrink_debug, log_shrink_info};
use tracing::field::display;
use tracing::instrument;

use crate::chain::Chain;
use crate::classify::{classify, is_probe_failure, ChainNode};
use crate::naming::LinkCount;
use crate::Result;

/// What a shrink did to the chain behind a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkOutcome {
    /// The path is not a chain alias; nothing to account for.
    Untouched,
    /// One alias fewer; the chain lives on with this count.
    Decremented(LinkCount),
    /// The last alias went away together with both hidden nodes.
    Dissolved,
}

/// Account for the removal of the alias at `path`.
///
/// Only chain entries are bookkept. Hidden nodes removed directly, plain
/// files, foreign symlinks and missing paths are left to the real syscall.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn shrink(path: &Path) -> Result<ShrinkOutcome> {
    let intermediate = match classify(path) {
        Ok(ChainNode::ChainEntry { intermediate }) => intermediate,
        Ok(_) => return Ok(ShrinkOutcome::Untouched),
        Err(e) if is_probe_failure(&e) => {
            log_shrink_debug!(
                "Removal target not inspectable",
                path = display(path.display()),
                error = display(e)
            );
            return Ok(ShrinkOutcome::Untouched);
        }
        Err(e) => return Err(e),
    };

    let mut chain = Chain::open(&intermediate)?;
    match chain.count().decrement() {
        Some(count) => {
            chain.set_count(count)?;
            log_shrink_debug!(
                "Chain shrunk",
                intermediate = display(intermediate.display()),
                count = display(count)
            );
            Ok(ShrinkOutcome::Decremented(count))
        }
        None => {
            chain.dissolve()?;
            log_shrink_info!(
                "Chain dissolved",
                intermediate = display(intermediate.display())
            );
            Ok(ShrinkOutcome::Dissolved)
        }
    }
}
