//! # l2s-core
//!
//! Hard-link emulation for filesystems reached through an interception layer.
//!
//! A "hard link" is stored as a chain of symbolic links whose names carry a
//! reference count, and stat-family results are rewritten so every alias
//! looks like a real hard link to the same file.
//!
//! ## On-disk layout
//!
//! ```text
//! /tmp/a                  -> /tmp/.l2s.a0001        (entry alias)
//! /tmp/b                  -> /tmp/.l2s.a0001        (entry alias)
//! /tmp/.l2s.a0001         -> /tmp/.l2s.a0001.0002   (intermediate)
//! /tmp/.l2s.a0001.0002                              (final: content, count = 2)
//! ```
//!
//! The intermediate node lets the final node be renamed on every count
//! change without touching any alias.
//!
//! ## Components
//!
//! - [`naming`]: on-disk names and the typed count/disambiguator accessors
//! - [`classify`]: what stage of a chain a path is
//! - [`grow`] / [`shrink`]: count mutations on link and removal
//! - [`metadata`]: stat result patching
//! - [`resolve`]: transparent hop to the backing file
//! - [`extension`]: syscall event dispatch over an [`OperationContext`]
//! - [`host`]: an in-process host that runs the real syscalls itself

mod chain;
pub mod classify;
pub mod context;
pub mod extension;
pub mod grow;
pub mod host;
pub mod metadata;
pub mod naming;
pub mod resolve;
pub mod shrink;
mod sys;

pub use chain::Chain;
pub use classify::{classify, ChainNode};
pub use context::{
    ArgSlot, OperationContext, StatSource, Syscall, RENAME_EXCHANGE, RENAME_NOREPLACE,
};
pub use extension::LinkToSymlink;
pub use grow::grow;
pub use host::DirectHost;
pub use metadata::{chain_final, patched_stat, StatRecord};
pub use naming::{Disambiguator, LinkCount, DELETED_SUFFIX, PATH_LIMIT, PREFIX};
pub use resolve::resolve_transparent;
pub use shrink::{shrink, ShrinkOutcome};
pub use sys::Op;

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced to the boundary layer.
///
/// The boundary fails the intercepted operation with [`ChainError::errno`]
/// instead of letting the original syscall run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("cannot link {}: not permitted", path.display())]
    NotPermitted { path: PathBuf },

    #[error("chain name too long: {}", path.display())]
    NameTooLong { path: PathBuf },

    #[error("no free disambiguator for {}", base.display())]
    ExhaustedNamespace { base: PathBuf },

    #[error("{op} {}: {errno}", path.display())]
    Io { op: Op, path: PathBuf, errno: Errno },

    #[error("malformed chain node: {}", path.display())]
    Malformed { path: PathBuf },

    #[error("too many links: {}", path.display())]
    TooManyLinks { path: PathBuf },
}

impl ChainError {
    pub(crate) fn io(op: Op, path: impl Into<PathBuf>, errno: Errno) -> Self {
        ChainError::Io {
            op,
            path: path.into(),
            errno,
        }
    }

    /// The errno the intercepted operation should fail with.
    pub fn errno(&self) -> Errno {
        match self {
            ChainError::NotPermitted { .. } => Errno::EPERM,
            ChainError::NameTooLong { .. } => Errno::ENAMETOOLONG,
            ChainError::ExhaustedNamespace { .. } => Errno::EEXIST,
            ChainError::Io { errno, .. } => *errno,
            ChainError::Malformed { .. } => Errno::EIO,
            ChainError::TooManyLinks { .. } => Errno::EMLINK,
        }
    }

    /// `-errno`, the value a tracer writes into the result register.
    pub fn as_syscall_result(&self) -> i64 {
        -(self.errno() as i64)
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
