use std::path::{Path, PathBuf};

use tracing::field::display;

use crate::naming::{self, LinkCount};
use crate::sys;
use crate::Result;

/// A live chain as read from disk: its intermediate node, the final node
/// the intermediate currently points at, and the count parsed from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    intermediate: PathBuf,
    final_node: PathBuf,
    count: LinkCount,
}

impl Chain {
    /// Read a chain through its intermediate node (one `readlink`).
    pub fn open(intermediate: &Path) -> Result<Self> {
        let final_node = sys::follow_once(intermediate)?;
        let count = LinkCount::parse_final(&final_node)?;
        Ok(Self {
            intermediate: intermediate.to_path_buf(),
            final_node,
            count,
        })
    }

    pub fn intermediate(&self) -> &Path {
        &self.intermediate
    }

    pub fn final_node(&self) -> &Path {
        &self.final_node
    }

    pub fn count(&self) -> LinkCount {
        self.count
    }

    /// Rename the final node to carry `count` and re-point the intermediate.
    ///
    /// Three separate steps; a failure after the rename leaves the
    /// intermediate dangling and is reported as-is.
    pub fn set_count(&mut self, count: LinkCount) -> Result<()> {
        let renamed = naming::final_with_count(&self.final_node, count)?;
        sys::rename(&self.final_node, &renamed)?;
        self.final_node = renamed;
        sys::unlink(&self.intermediate)?;
        sys::symlink(&self.final_node, &self.intermediate)?;
        self.count = count;
        tracing::debug!(
            intermediate = display(self.intermediate.display()),
            count = display(count),
            "chain recounted"
        );
        Ok(())
    }

    /// Remove both hidden nodes.
    pub fn dissolve(self) -> Result<()> {
        sys::unlink(&self.intermediate)?;
        sys::unlink(&self.final_node)?;
        Ok(())
    }
}
