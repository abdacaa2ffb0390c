//! Syscall event dispatch.
//!
//! The host calls into [`LinkToSymlink`] at three points:
//! - syscall enter: link requests grow a chain and become `symlink`,
//!   removals and rename-overs shrink one;
//! - syscall exit: successful stat-family results get patched;
//! - path translation: aliases resolve to their backing file, except for
//!   link management syscalls.

use std::path::{Path, PathBuf};

use l2s_config::{log_shrink_debug, log_stat_debug, EmulationConfig};
use nix::errno::Errno;
use tracing::field::display;

use crate::context::{
    ArgSlot, OperationContext, StatSource, Syscall, RENAME_EXCHANGE, RENAME_NOREPLACE,
};
use crate::naming::strip_deleted_suffix;
use crate::sys::{self, Op};
use crate::{grow, metadata, resolve, shrink, ChainError, Result};

/// Syscalls the emulation needs to see.
const FILTERED: &[Syscall] = &[
    Syscall::Link,
    Syscall::LinkAt,
    Syscall::Unlink,
    Syscall::UnlinkAt,
    Syscall::Rename,
    Syscall::RenameAt,
    Syscall::RenameAt2,
    Syscall::Stat,
    Syscall::Lstat,
    Syscall::Fstat,
    Syscall::FstatAt,
    Syscall::Statx,
];

/// The hard-link emulation as a set of syscall hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkToSymlink {
    options: EmulationConfig,
}

impl Default for LinkToSymlink {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkToSymlink {
    /// Everything enabled.
    pub fn new() -> Self {
        Self::from_config(&EmulationConfig::default())
    }

    pub fn from_config(options: &EmulationConfig) -> Self {
        Self {
            options: options.clone(),
        }
    }

    pub fn options(&self) -> &EmulationConfig {
        &self.options
    }

    /// Syscalls a host must route to [`Self::on_syscall_enter`] and
    /// [`Self::on_syscall_exit`].
    pub fn filtered_syscalls(&self) -> &'static [Syscall] {
        if self.options.enabled {
            FILTERED
        } else {
            &[]
        }
    }

    /// Before the syscall runs. An error must fail the syscall with
    /// [`crate::ChainError::errno`] instead of running it.
    pub fn on_syscall_enter<C: OperationContext + ?Sized>(&self, ctx: &mut C) -> Result<()> {
        if !self.options.enabled {
            return Ok(());
        }
        let syscall = ctx.syscall();

        if let Some(slot) = syscall.link_source() {
            return self.rewrite_link(ctx, syscall, slot);
        }

        if let Some(slot) = syscall.removed_entry() {
            let removed = ctx.path_arg(slot)?;
            if let Some(slot) = syscall.rename_source() {
                let source = ctx.path_arg(slot)?;
                if !Self::rename_drops_destination(&*ctx, syscall, &source, &removed)? {
                    return Ok(());
                }
            }
            shrink::shrink(&removed)?;
        }
        Ok(())
    }

    /// Whether a rename about to run will take its destination name away.
    ///
    /// Runs before the shrink. A source that cannot be lstat'ed fails the
    /// call with that errno.
    fn rename_drops_destination<C: OperationContext + ?Sized>(
        ctx: &C,
        syscall: Syscall,
        source: &Path,
        destination: &Path,
    ) -> Result<bool> {
        // rename(x, x) leaves x in place, so no alias goes away.
        if source == destination {
            log_shrink_debug!(
                "Rename onto itself",
                path = display(destination.display())
            );
            return Ok(false);
        }

        if let Some(slot) = syscall.rename_flags() {
            let flags = ctx.flags_arg(slot);
            // EXCHANGE keeps both names; NOREPLACE never replaces one.
            if flags & (RENAME_EXCHANGE | RENAME_NOREPLACE) != 0 {
                log_shrink_debug!(
                    "Rename keeps destination",
                    path = display(destination.display()),
                    flags = flags
                );
                return Ok(false);
            }
        }

        let source_meta =
            sys::lstat(source).map_err(|e| ChainError::io(Op::Rename, source, e.errno()))?;
        // A directory cannot replace a non-directory.
        if source_meta.is_dir() {
            if let Ok(meta) = sys::lstat(destination) {
                if !meta.is_dir() {
                    return Err(ChainError::io(Op::Rename, destination, Errno::ENOTDIR));
                }
            }
        }
        Ok(true)
    }

    /// `link(old, new)` / `linkat(_, old, _, new, _)` become
    /// `symlink(intermediate, new)`.
    fn rewrite_link<C: OperationContext + ?Sized>(
        &self,
        ctx: &mut C,
        syscall: Syscall,
        source_slot: ArgSlot,
    ) -> Result<()> {
        let source = ctx.path_arg(source_slot)?;
        if let Some(new_slot) = syscall.link_destination() {
            // The symlink would fail with EEXIST after the count was bumped.
            let destination = ctx.path_arg(new_slot)?;
            if sys::lstat(&destination).is_ok() {
                return Err(ChainError::io(Op::Link, destination, Errno::EEXIST));
            }
        }
        let intermediate = grow::grow(&source)?;
        ctx.set_path_arg(source_slot, &intermediate)?;

        if syscall == Syscall::LinkAt {
            ctx.move_arg(ArgSlot::Arg2, ArgSlot::Arg1);
            ctx.move_arg(ArgSlot::Arg4, ArgSlot::Arg2);
        }
        ctx.set_syscall(Syscall::Symlink);
        Ok(())
    }

    /// After the syscall ran.
    pub fn on_syscall_exit<C: OperationContext + ?Sized>(&self, ctx: &mut C) -> Result<()> {
        if !self.options.enabled || !self.options.patch_metadata {
            return Ok(());
        }
        let Some(source) = ctx.syscall().stat_source() else {
            return Ok(());
        };
        if ctx.outcome() != Some(0) {
            return Ok(());
        }

        let path = match source {
            StatSource::Path(slot) => ctx.path_arg(slot)?,
            StatSource::Descriptor(slot) => match ctx.descriptor_path(slot) {
                Ok(path) => strip_deleted_suffix(path),
                Err(e) => {
                    log_stat_debug!("Descriptor not resolvable", error = display(e));
                    return Ok(());
                }
            },
        };

        if let Some(record) = metadata::patched_stat(&path)? {
            ctx.write_stat(&record)?;
        }
        Ok(())
    }

    /// A path of `syscall` has been resolved. Returns the path the syscall
    /// should operate on instead, if any.
    pub fn on_translated_path(&self, syscall: Syscall, path: &Path) -> Option<PathBuf> {
        if !self.options.enabled
            || !self.options.transparent_resolution
            || syscall.is_link_management()
        {
            return None;
        }
        resolve::resolve_transparent(path)
    }
}
