//! Chain classification.
//!
//! [`classify`] is the one place that decides what a path is with respect to
//! a chain. Growing, shrinking, stat patching and transparent resolution
//! all go through it.

use std::io;
use std::path::{Path, PathBuf};

use crate::naming::is_chain_internal;
use crate::{sys, ChainError, Result};

/// Where a path sits relative to a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainNode {
    /// Nothing at this path.
    Missing,
    /// A directory. Never chained.
    Directory,
    /// An ordinary file outside any chain.
    Plain,
    /// A symlink that does not lead into a chain.
    ForeignSymlink { target: PathBuf },
    /// A user-visible alias pointing at a chain's intermediate node.
    ChainEntry { intermediate: PathBuf },
    /// A chain's hidden symlink layer.
    Intermediate,
    /// A chain's backing file.
    Final,
}

impl ChainNode {
    /// Whether this node belongs to (or points into) a chain.
    pub fn is_chained(&self) -> bool {
        matches!(
            self,
            ChainNode::ChainEntry { .. } | ChainNode::Intermediate | ChainNode::Final
        )
    }
}

/// Classify `path` with one `lstat` and at most one `readlink`.
pub fn classify(path: &Path) -> Result<ChainNode> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if is_absent(&e) => return Ok(ChainNode::Missing),
        Err(e) => return Err(sys::io_error(sys::Op::Lstat, path, e)),
    };
    let file_type = meta.file_type();

    if file_type.is_dir() {
        return Ok(ChainNode::Directory);
    }

    if is_chain_internal(path) {
        return Ok(if file_type.is_symlink() {
            ChainNode::Intermediate
        } else {
            ChainNode::Final
        });
    }

    if !file_type.is_symlink() {
        return Ok(ChainNode::Plain);
    }

    let target = sys::follow_once(path)?;
    if is_chain_internal(&target) {
        Ok(ChainNode::ChainEntry {
            intermediate: target,
        })
    } else {
        Ok(ChainNode::ForeignSymlink { target })
    }
}

fn is_absent(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOENT) | Some(libc::ENOTDIR))
}

/// Classification errors that just mean "cannot look at this path".
///
/// Passive consumers (removal bookkeeping, stat patching, resolution) treat
/// those as "not a chain" and let the real syscall report its own error.
pub(crate) fn is_probe_failure(err: &ChainError) -> bool {
    matches!(
        err,
        ChainError::Io {
            op: sys::Op::Lstat,
            ..
        }
    )
}
