//! Filesystem primitives used by the chain operations.
//!
//! Every wrapper tags a failure with the operation and path that produced
//! it, so a partially applied mutation can be traced back to its step.

use std::fmt;
use std::fs::{self, Metadata};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;

use crate::naming::PATH_LIMIT;
use crate::{ChainError, Result};

/// The filesystem operation a [`ChainError::Io`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lstat,
    Stat,
    Readlink,
    Rename,
    Symlink,
    Unlink,
    Link,
    Open,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Op::Lstat => "lstat",
            Op::Stat => "stat",
            Op::Readlink => "readlink",
            Op::Rename => "rename",
            Op::Symlink => "symlink",
            Op::Unlink => "unlink",
            Op::Link => "link",
            Op::Open => "open",
        };
        f.write_str(name)
    }
}

pub(crate) fn errno_of(err: &io::Error) -> Errno {
    Errno::from_raw(err.raw_os_error().unwrap_or(libc::EIO))
}

pub(crate) fn io_error(op: Op, path: &Path, err: io::Error) -> ChainError {
    ChainError::io(op, path, errno_of(&err))
}

/// Reject names the kernel would refuse with ENAMETOOLONG.
pub(crate) fn check_length(path: &Path) -> Result<()> {
    // PATH_MAX counts the terminating NUL.
    if path.as_os_str().as_bytes().len() >= PATH_LIMIT {
        return Err(ChainError::NameTooLong {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

pub(crate) fn lstat(path: &Path) -> Result<Metadata> {
    fs::symlink_metadata(path).map_err(|e| io_error(Op::Lstat, path, e))
}

/// One `readlink`, bounded by the path limit.
pub(crate) fn read_link(path: &Path) -> Result<PathBuf> {
    let target = fs::read_link(path).map_err(|e| io_error(Op::Readlink, path, e))?;
    check_length(&target)?;
    Ok(target)
}

/// Follow exactly one symlink hop, anchoring a relative target at the
/// link's own directory.
pub(crate) fn follow_once(path: &Path) -> Result<PathBuf> {
    let target = read_link(path)?;
    if target.is_absolute() {
        return Ok(target);
    }
    let anchored = match path.parent() {
        Some(dir) => dir.join(target),
        None => target,
    };
    check_length(&anchored)?;
    Ok(anchored)
}

pub(crate) fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| io_error(Op::Rename, from, e))
}

/// Rename that fails with EEXIST instead of replacing `to`.
///
/// Falls back to a plain rename where the kernel or filesystem cannot
/// honour `RENAME_NOREPLACE`.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub(crate) fn rename_noreplace(from: &Path, to: &Path) -> Result<()> {
    use nix::fcntl::{renameat2, RenameFlags};

    match renameat2(None, from, None, to, RenameFlags::RENAME_NOREPLACE) {
        Ok(()) => Ok(()),
        Err(Errno::EINVAL) | Err(Errno::ENOSYS) => rename(from, to),
        Err(errno) => Err(ChainError::io(Op::Rename, from, errno)),
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub(crate) fn rename_noreplace(from: &Path, to: &Path) -> Result<()> {
    rename(from, to)
}

/// Create `link` pointing at `target`. Fails with EEXIST if `link` exists,
/// which makes it usable as an exclusive-create primitive.
pub(crate) fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| io_error(Op::Symlink, link, e))
}

pub(crate) fn unlink(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| io_error(Op::Unlink, path, e))
}

/// Path an open descriptor refers to, as the kernel reports it.
///
/// The name may carry a trailing [`crate::DELETED_SUFFIX`]; callers strip it.
#[cfg(target_os = "linux")]
pub(crate) fn descriptor_path(pid: Option<u32>, fd: i32) -> Result<PathBuf> {
    let link = match pid {
        Some(pid) => PathBuf::from(format!("/proc/{}/fd/{}", pid, fd)),
        None => PathBuf::from(format!("/proc/self/fd/{}", fd)),
    };
    read_link(&link)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn descriptor_path(_pid: Option<u32>, fd: i32) -> Result<PathBuf> {
    Err(ChainError::io(
        Op::Readlink,
        format!("fd:{}", fd),
        Errno::ENOSYS,
    ))
}
