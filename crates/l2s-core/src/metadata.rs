//! Stat result patching.
//!
//! After a stat-family call succeeds on anything that belongs to a chain,
//! the result is replaced by the final node's metadata with the link count
//! taken from the final node's name. Every alias and both hidden nodes
//! then report the same identity (dev/ino) and the same count.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use l2s_config::log_stat_debug;
use tracing::field::display;

use crate::classify::{classify, is_probe_failure, ChainNode};
use crate::naming::LinkCount;
use crate::{sys, Result};

/// Platform-neutral stat result, as written back into the caller's buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatRecord {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: i64,
    pub atime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub ctime: i64,
    pub ctime_nsec: i64,
}

impl From<&Metadata> for StatRecord {
    fn from(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
            mode: meta.mode(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            size: meta.size(),
            blksize: meta.blksize(),
            blocks: meta.blocks(),
            atime: meta.atime(),
            atime_nsec: meta.atime_nsec(),
            mtime: meta.mtime(),
            mtime_nsec: meta.mtime_nsec(),
            ctime: meta.ctime(),
            ctime_nsec: meta.ctime_nsec(),
        }
    }
}

impl StatRecord {
    pub fn is_symlink(&self) -> bool {
        (self.mode & libc::S_IFMT as u32) == libc::S_IFLNK as u32
    }

    /// Overwrite a raw `struct stat`, e.g. one read out of a tracee.
    pub fn fill_stat(&self, buf: &mut libc::stat) {
        buf.st_dev = self.dev as _;
        buf.st_ino = self.ino as _;
        buf.st_mode = self.mode as _;
        buf.st_nlink = self.nlink as _;
        buf.st_uid = self.uid as _;
        buf.st_gid = self.gid as _;
        buf.st_rdev = self.rdev as _;
        buf.st_size = self.size as _;
        buf.st_blksize = self.blksize as _;
        buf.st_blocks = self.blocks as _;
        buf.st_atime = self.atime as _;
        buf.st_atime_nsec = self.atime_nsec as _;
        buf.st_mtime = self.mtime as _;
        buf.st_mtime_nsec = self.mtime_nsec as _;
        buf.st_ctime = self.ctime as _;
        buf.st_ctime_nsec = self.ctime_nsec as _;
    }
}

/// The final node behind `path`, or `None` if `path` has nothing to do with
/// a chain.
pub fn chain_final(path: &Path) -> Result<Option<PathBuf>> {
    let node = match classify(path) {
        Ok(node) => node,
        Err(e) if is_probe_failure(&e) => return Ok(None),
        Err(e) => return Err(e),
    };
    match node {
        ChainNode::Final => Ok(Some(path.to_path_buf())),
        ChainNode::Intermediate => sys::follow_once(path).map(Some),
        ChainNode::ChainEntry { intermediate } => sys::follow_once(&intermediate).map(Some),
        _ => Ok(None),
    }
}

/// Stat result `path` should report, or `None` to leave the real one alone.
pub fn patched_stat(path: &Path) -> Result<Option<StatRecord>> {
    let Some(final_node) = chain_final(path)? else {
        return Ok(None);
    };
    let count = LinkCount::parse_final(&final_node)?;
    let meta = sys::lstat(&final_node)?;

    let mut record = StatRecord::from(&meta);
    record.nlink = u64::from(count.get());

    log_stat_debug!(
        "Patched link count",
        path = display(path.display()),
        final_node = display(final_node.display()),
        nlink = record.nlink
    );
    Ok(Some(record))
}
