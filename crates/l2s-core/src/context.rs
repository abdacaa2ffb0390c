//! The boundary between the emulation and whatever intercepts syscalls.

use std::path::{Path, PathBuf};

use crate::metadata::StatRecord;
use crate::Result;

/// Syscalls the emulation distinguishes. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syscall {
    /// `link(oldpath, newpath)`
    Link,
    /// `linkat(olddirfd, oldpath, newdirfd, newpath, flags)`
    LinkAt,
    /// `unlink(path)`
    Unlink,
    /// `unlinkat(dirfd, path, flags)`
    UnlinkAt,
    /// `rename(oldpath, newpath)`
    Rename,
    /// `renameat(olddirfd, oldpath, newdirfd, newpath)`
    RenameAt,
    /// `renameat2(olddirfd, oldpath, newdirfd, newpath, flags)`
    RenameAt2,
    /// `stat(path, buf)`
    Stat,
    /// `lstat(path, buf)`
    Lstat,
    /// `fstat(fd, buf)`
    Fstat,
    /// `fstatat(dirfd, path, buf, flags)`
    FstatAt,
    /// `statx(dirfd, path, flags, mask, buf)`
    Statx,
    /// `symlink(target, linkpath)`, what link requests are rewritten into
    Symlink,
    /// `open`/`openat` and friends
    Open,
    Other(i64),
}

/// Argument register of a pending syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgSlot {
    Arg1,
    Arg2,
    Arg3,
    Arg4,
    Arg5,
    Arg6,
}

impl ArgSlot {
    pub fn index(self) -> usize {
        match self {
            ArgSlot::Arg1 => 0,
            ArgSlot::Arg2 => 1,
            ArgSlot::Arg3 => 2,
            ArgSlot::Arg4 => 3,
            ArgSlot::Arg5 => 4,
            ArgSlot::Arg6 => 5,
        }
    }
}

/// `renameat2` flag: fail with EEXIST instead of replacing the destination.
pub const RENAME_NOREPLACE: u64 = 1 << 0;
/// `renameat2` flag: swap source and destination atomically.
pub const RENAME_EXCHANGE: u64 = 1 << 1;

/// Where a stat-family call names the object it queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatSource {
    Path(ArgSlot),
    Descriptor(ArgSlot),
}

impl Syscall {
    /// Syscalls that must see the unresolved alias or hidden node to keep
    /// chain bookkeeping right.
    pub fn is_link_management(self) -> bool {
        matches!(
            self,
            Syscall::Link
                | Syscall::LinkAt
                | Syscall::Unlink
                | Syscall::UnlinkAt
                | Syscall::Rename
                | Syscall::RenameAt
                | Syscall::RenameAt2
        )
    }

    pub fn is_stat_family(self) -> bool {
        self.stat_source().is_some()
    }

    pub fn stat_source(self) -> Option<StatSource> {
        match self {
            Syscall::Stat | Syscall::Lstat => Some(StatSource::Path(ArgSlot::Arg1)),
            Syscall::FstatAt | Syscall::Statx => Some(StatSource::Path(ArgSlot::Arg2)),
            Syscall::Fstat => Some(StatSource::Descriptor(ArgSlot::Arg1)),
            _ => None,
        }
    }

    /// Slot of the existing file a link request names.
    pub fn link_source(self) -> Option<ArgSlot> {
        match self {
            Syscall::Link => Some(ArgSlot::Arg1),
            Syscall::LinkAt => Some(ArgSlot::Arg2),
            _ => None,
        }
    }

    /// Slot of the new name a link request creates.
    pub fn link_destination(self) -> Option<ArgSlot> {
        match self {
            Syscall::Link => Some(ArgSlot::Arg2),
            Syscall::LinkAt => Some(ArgSlot::Arg4),
            _ => None,
        }
    }

    /// Slot of the name a removal or rename-over drops.
    pub fn removed_entry(self) -> Option<ArgSlot> {
        match self {
            Syscall::Unlink => Some(ArgSlot::Arg1),
            Syscall::UnlinkAt | Syscall::Rename => Some(ArgSlot::Arg2),
            Syscall::RenameAt | Syscall::RenameAt2 => Some(ArgSlot::Arg4),
            _ => None,
        }
    }

    /// Slot of the flags word of a rename, if it carries one.
    pub fn rename_flags(self) -> Option<ArgSlot> {
        match self {
            Syscall::RenameAt2 => Some(ArgSlot::Arg5),
            _ => None,
        }
    }

    /// Slot of the source of a rename, if this is one.
    pub fn rename_source(self) -> Option<ArgSlot> {
        match self {
            Syscall::Rename => Some(ArgSlot::Arg1),
            Syscall::RenameAt | Syscall::RenameAt2 => Some(ArgSlot::Arg2),
            _ => None,
        }
    }
}

/// Host capabilities the emulation runs on.
///
/// A tracer implements this over tracee registers and memory; an in-process
/// layer (see [`crate::host::DirectHost`]) over plain values. Paths handed
/// out are already canonical.
pub trait OperationContext {
    /// The pending (or just completed) syscall.
    fn syscall(&self) -> Syscall;

    /// Replace the syscall about to run.
    fn set_syscall(&mut self, syscall: Syscall);

    /// Read a path argument. Fails with `NameTooLong` if the string is not
    /// terminated within the path limit.
    fn path_arg(&self, slot: ArgSlot) -> Result<PathBuf>;

    /// Replace a path argument.
    fn set_path_arg(&mut self, slot: ArgSlot, path: &Path) -> Result<()>;

    /// Read an integer (flags) argument.
    fn flags_arg(&self, slot: ArgSlot) -> u64;

    /// Copy the raw argument in `from` into `to`.
    fn move_arg(&mut self, from: ArgSlot, to: ArgSlot);

    /// Result of the completed syscall; `None` before it ran.
    fn outcome(&self) -> Option<i64>;

    /// Path of the open descriptor held in `slot`.
    fn descriptor_path(&self, slot: ArgSlot) -> Result<PathBuf>;

    /// Overwrite the stat result already delivered to the caller.
    fn write_stat(&mut self, record: &StatRecord) -> Result<()>;
}
