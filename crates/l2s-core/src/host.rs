//! In-process host.
//!
//! [`DirectHost`] plays the part of the interception layer: every call is
//! staged as a [`PendingCall`], run through the [`LinkToSymlink`] hooks,
//! executed against the real filesystem, and its result patched. Paths must
//! already be canonical and absolute.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use l2s_config::Config;
use nix::errno::Errno;

use crate::context::{ArgSlot, OperationContext, Syscall};
use crate::extension::LinkToSymlink;
use crate::metadata::StatRecord;
use crate::sys::{self, io_error, Op};
use crate::{ChainError, Result};

/// One syscall on its way through the hooks.
#[derive(Debug)]
pub struct PendingCall<'f> {
    syscall: Syscall,
    args: [Option<PathBuf>; 6],
    flags: [u64; 6],
    descriptor: Option<&'f File>,
    outcome: Option<i64>,
    stat: Option<StatRecord>,
}

impl<'f> PendingCall<'f> {
    pub fn new(syscall: Syscall) -> Self {
        Self {
            syscall,
            args: Default::default(),
            flags: [0; 6],
            descriptor: None,
            outcome: None,
            stat: None,
        }
    }

    pub fn with_path(mut self, slot: ArgSlot, path: &Path) -> Self {
        self.args[slot.index()] = Some(path.to_path_buf());
        self
    }

    pub fn with_flags(mut self, slot: ArgSlot, flags: u64) -> Self {
        self.flags[slot.index()] = flags;
        self
    }

    pub fn with_descriptor(mut self, file: &'f File) -> Self {
        self.descriptor = Some(file);
        self
    }

    pub fn stat(&self) -> Option<&StatRecord> {
        self.stat.as_ref()
    }

    fn arg(&self, slot: ArgSlot) -> Result<&Path> {
        self.args[slot.index()]
            .as_deref()
            .ok_or_else(|| ChainError::io(Op::Open, format!("<{:?}>", slot), Errno::EFAULT))
    }
}

impl OperationContext for PendingCall<'_> {
    fn syscall(&self) -> Syscall {
        self.syscall
    }

    fn set_syscall(&mut self, syscall: Syscall) {
        self.syscall = syscall;
    }

    fn path_arg(&self, slot: ArgSlot) -> Result<PathBuf> {
        let path = self.arg(slot)?;
        sys::check_length(path)?;
        Ok(path.to_path_buf())
    }

    fn set_path_arg(&mut self, slot: ArgSlot, path: &Path) -> Result<()> {
        sys::check_length(path)?;
        self.args[slot.index()] = Some(path.to_path_buf());
        Ok(())
    }

    fn flags_arg(&self, slot: ArgSlot) -> u64 {
        self.flags[slot.index()]
    }

    fn move_arg(&mut self, from: ArgSlot, to: ArgSlot) {
        self.args[to.index()] = self.args[from.index()].clone();
        self.flags[to.index()] = self.flags[from.index()];
    }

    fn outcome(&self) -> Option<i64> {
        self.outcome
    }

    fn descriptor_path(&self, slot: ArgSlot) -> Result<PathBuf> {
        let file = match (slot, self.descriptor) {
            (ArgSlot::Arg1, Some(file)) => file,
            _ => return Err(ChainError::io(Op::Readlink, "<fd>", Errno::EBADF)),
        };
        sys::descriptor_path(None, file.as_raw_fd())
    }

    fn write_stat(&mut self, record: &StatRecord) -> Result<()> {
        self.stat = Some(*record);
        Ok(())
    }
}

/// Runs filesystem operations with hard links emulated by symlink chains.
#[derive(Debug, Clone, Default)]
pub struct DirectHost {
    extension: LinkToSymlink,
}

impl DirectHost {
    pub fn new(extension: LinkToSymlink) -> Self {
        Self { extension }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(LinkToSymlink::from_config(&config.emulation))
    }

    pub fn extension(&self) -> &LinkToSymlink {
        &self.extension
    }

    /// `link(existing, new)`
    pub fn link(&self, existing: &Path, new: &Path) -> Result<()> {
        let call = PendingCall::new(Syscall::Link)
            .with_path(ArgSlot::Arg1, existing)
            .with_path(ArgSlot::Arg2, new);
        self.dispatch(call).map(drop)
    }

    /// `unlink(path)`
    pub fn unlink(&self, path: &Path) -> Result<()> {
        let call = PendingCall::new(Syscall::Unlink).with_path(ArgSlot::Arg1, path);
        self.dispatch(call).map(drop)
    }

    /// `rename(from, to)`
    pub fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let call = PendingCall::new(Syscall::Rename)
            .with_path(ArgSlot::Arg1, from)
            .with_path(ArgSlot::Arg2, to);
        self.dispatch(call).map(drop)
    }

    /// `stat(path)`
    pub fn stat(&self, path: &Path) -> Result<StatRecord> {
        let call = PendingCall::new(Syscall::Stat).with_path(ArgSlot::Arg1, path);
        self.dispatch_stat(call)
    }

    /// `lstat(path)`
    pub fn lstat(&self, path: &Path) -> Result<StatRecord> {
        let call = PendingCall::new(Syscall::Lstat).with_path(ArgSlot::Arg1, path);
        self.dispatch_stat(call)
    }

    /// `fstat(fd)`
    pub fn fstat(&self, file: &File) -> Result<StatRecord> {
        let call = PendingCall::new(Syscall::Fstat).with_descriptor(file);
        self.dispatch_stat(call)
    }

    /// `open(path, ...)`
    pub fn open(&self, path: &Path, options: &OpenOptions) -> Result<File> {
        let path = self.translate(Syscall::Open, path.to_path_buf());
        options.open(&path).map_err(|e| io_error(Op::Open, &path, e))
    }

    pub fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let mut file = self.open(path, OpenOptions::new().read(true))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| io_error(Op::Open, path, e))?;
        Ok(data)
    }

    /// Create or truncate `path` and write `data` through it.
    pub fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        let mut file = self.open(path, &options)?;
        file.write_all(data).map_err(|e| io_error(Op::Open, path, e))
    }

    fn translate(&self, syscall: Syscall, path: PathBuf) -> PathBuf {
        self.extension
            .on_translated_path(syscall, &path)
            .unwrap_or(path)
    }

    fn dispatch_stat(&self, call: PendingCall<'_>) -> Result<StatRecord> {
        let done = self.dispatch(call)?;
        done.stat
            .ok_or_else(|| ChainError::io(Op::Stat, "<result>", Errno::EFAULT))
    }

    fn dispatch<'f>(&self, mut call: PendingCall<'f>) -> Result<PendingCall<'f>> {
        if !call.syscall.is_link_management() {
            for arg in call.args.iter_mut() {
                if let Some(path) = arg.take() {
                    *arg = Some(self.translate(call.syscall, path));
                }
            }
        }

        self.extension.on_syscall_enter(&mut call)?;
        Self::execute(&mut call)?;
        self.extension.on_syscall_exit(&mut call)?;
        Ok(call)
    }

    /// Run the (possibly rewritten) syscall for real.
    fn execute(call: &mut PendingCall<'_>) -> Result<()> {
        match call.syscall {
            Syscall::Symlink => {
                let target = call.path_arg(ArgSlot::Arg1)?;
                let link = call.path_arg(ArgSlot::Arg2)?;
                sys::symlink(&target, &link)?;
            }
            Syscall::Link => {
                let existing = call.path_arg(ArgSlot::Arg1)?;
                let new = call.path_arg(ArgSlot::Arg2)?;
                fs::hard_link(&existing, &new).map_err(|e| io_error(Op::Link, &new, e))?;
            }
            Syscall::Unlink => {
                sys::unlink(&call.path_arg(ArgSlot::Arg1)?)?;
            }
            Syscall::Rename => {
                let from = call.path_arg(ArgSlot::Arg1)?;
                let to = call.path_arg(ArgSlot::Arg2)?;
                sys::rename(&from, &to)?;
            }
            Syscall::Stat => {
                let path = call.path_arg(ArgSlot::Arg1)?;
                let meta = fs::metadata(&path).map_err(|e| io_error(Op::Stat, &path, e))?;
                call.stat = Some(StatRecord::from(&meta));
            }
            Syscall::Lstat => {
                let meta = sys::lstat(&call.path_arg(ArgSlot::Arg1)?)?;
                call.stat = Some(StatRecord::from(&meta));
            }
            Syscall::Fstat => {
                let file = call
                    .descriptor
                    .ok_or_else(|| ChainError::io(Op::Stat, "<fd>", Errno::EBADF))?;
                let meta = file
                    .metadata()
                    .map_err(|e| io_error(Op::Stat, Path::new("<fd>"), e))?;
                call.stat = Some(StatRecord::from(&meta));
            }
            other => {
                return Err(ChainError::io(
                    Op::Open,
                    format!("<{:?}>", other),
                    Errno::ENOSYS,
                ))
            }
        }
        call.outcome = Some(0);
        Ok(())
    }
}
