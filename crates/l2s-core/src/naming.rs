//! On-disk naming of chain nodes.
//!
//! ```text
//! <dir>/<PREFIX><basename><NNNN>          intermediate (NNNN: disambiguator)
//! <dir>/<PREFIX><basename><NNNN>.<CCCC>   final        (CCCC: alias count)
//! ```
//!
//! The format is fixed: chains written by earlier runs must keep working.
//! Everything here is pure; no filesystem access.

use std::ffi::OsString;
use std::fmt;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use nix::errno::Errno;

use crate::sys::{check_length, Op};
use crate::{ChainError, Result};

/// Marker prepended to the basename of intermediate and final nodes.
pub const PREFIX: &str = ".l2s.";

/// Suffix the kernel appends to `/proc/<pid>/fd/<n>` once the file is unlinked.
pub const DELETED_SUFFIX: &str = " (deleted)";

/// Platform path limit, terminating NUL included.
pub const PATH_LIMIT: usize = libc::PATH_MAX as usize;

const DIGITS: usize = 4;
/// `.` + four digits
const COUNT_SUFFIX_LEN: usize = DIGITS + 1;

/// Number of live entry aliases of a chain, encoded in the final node name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkCount(u16);

impl LinkCount {
    pub const MAX: u16 = 9999;

    /// Count of a freshly created chain: the original name plus the new link.
    pub const INITIAL: LinkCount = LinkCount(2);

    pub fn new(count: u16) -> Option<Self> {
        (count <= Self::MAX).then_some(Self(count))
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// `None` once the count would no longer fit in four digits.
    pub fn increment(self) -> Option<Self> {
        Self::new(self.0.checked_add(1)?)
    }

    /// `None` when the last alias goes away and the chain must be dissolved.
    pub fn decrement(self) -> Option<Self> {
        match self.0.checked_sub(1)? {
            0 => None,
            n => Some(Self(n)),
        }
    }

    /// Parse the count out of a final node's name.
    ///
    /// The basename must carry [`PREFIX`] and end in `.` plus exactly four
    /// ASCII digits; anything else is [`ChainError::Malformed`].
    pub fn parse_final(final_node: &Path) -> Result<Self> {
        let malformed = || ChainError::Malformed {
            path: final_node.to_path_buf(),
        };
        let name = final_node
            .file_name()
            .map(|n| n.as_bytes())
            .ok_or_else(malformed)?;
        if !name.starts_with(PREFIX.as_bytes()) || name.len() < PREFIX.len() + COUNT_SUFFIX_LEN {
            return Err(malformed());
        }
        let (dot, digits) = name[name.len() - COUNT_SUFFIX_LEN..].split_at(1);
        if dot != b"." || !digits.iter().all(u8::is_ascii_digit) {
            return Err(malformed());
        }
        let count = digits
            .iter()
            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
        Ok(Self(count))
    }
}

impl fmt::Display for LinkCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Suffix that keeps chains of same-named files in one directory apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Disambiguator(u16);

impl Disambiguator {
    pub const FIRST: u16 = 1;
    pub const LAST: u16 = 999;

    pub fn new(value: u16) -> Option<Self> {
        (Self::FIRST..=Self::LAST)
            .contains(&value)
            .then_some(Self(value))
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Candidates in probe order.
    pub fn all() -> impl Iterator<Item = Disambiguator> {
        (Self::FIRST..=Self::LAST).map(Self)
    }
}

impl fmt::Display for Disambiguator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Whether a basename marks a chain-internal node.
pub fn has_prefix(name: &[u8]) -> bool {
    name.starts_with(PREFIX.as_bytes())
}

/// Whether `path` names an intermediate or final node. Pure: looks only at
/// the basename.
pub fn is_chain_internal(path: &Path) -> bool {
    path.file_name()
        .map(|name| has_prefix(name.as_bytes()))
        .unwrap_or(false)
}

fn append(path: &Path, suffix: &str) -> PathBuf {
    let mut bytes = path.as_os_str().as_bytes().to_vec();
    bytes.extend_from_slice(suffix.as_bytes());
    PathBuf::from(OsString::from_vec(bytes))
}

/// `<dir>/<PREFIX><basename>`, the stem every candidate intermediate name
/// is built from.
pub fn intermediate_base(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| ChainError::io(Op::Link, path, Errno::EINVAL))?;
    let mut prefixed = OsString::from(PREFIX);
    prefixed.push(name);
    let base = path.with_file_name(prefixed);
    check_length(&base)?;
    Ok(base)
}

/// The two hidden nodes of one candidate chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainNames {
    pub intermediate: PathBuf,
    pub final_node: PathBuf,
}

impl ChainNames {
    /// Names for a new chain built from `base` (see [`intermediate_base`]),
    /// with the final node at [`LinkCount::INITIAL`].
    pub fn candidate(base: &Path, disambiguator: Disambiguator) -> Result<Self> {
        let intermediate = append(base, &disambiguator.to_string());
        let final_node = final_for(&intermediate, LinkCount::INITIAL)?;
        Ok(Self {
            intermediate,
            final_node,
        })
    }
}

/// `<intermediate>.<CCCC>`
pub fn final_for(intermediate: &Path, count: LinkCount) -> Result<PathBuf> {
    let final_node = append(intermediate, &format!(".{}", count));
    check_length(&final_node)?;
    Ok(final_node)
}

/// The same final node renamed to carry `count`.
pub fn final_with_count(final_node: &Path, count: LinkCount) -> Result<PathBuf> {
    final_for(&intermediate_of(final_node)?, count)
}

/// Strip the count suffix off a final node, yielding its intermediate.
pub fn intermediate_of(final_node: &Path) -> Result<PathBuf> {
    LinkCount::parse_final(final_node)?;
    let bytes = final_node.as_os_str().as_bytes();
    let stem = &bytes[..bytes.len() - COUNT_SUFFIX_LEN];
    Ok(PathBuf::from(OsString::from_vec(stem.to_vec())))
}

/// Drop the kernel's ` (deleted)` marker from a resolved descriptor path.
pub fn strip_deleted_suffix(path: PathBuf) -> PathBuf {
    let bytes = path.as_os_str().as_bytes();
    match bytes.strip_suffix(DELETED_SUFFIX.as_bytes()) {
        Some(stripped) => PathBuf::from(OsString::from_vec(stripped.to_vec())),
        None => path,
    }
}
