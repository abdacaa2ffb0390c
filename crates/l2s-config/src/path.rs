//! Path normalization utilities.
//!
//! The emulation core only ever sees canonical absolute paths. Anything that
//! feeds it from the outside (the CLI, tests, an embedding host) should pass
//! its paths through these helpers first.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Canonicalize an existing path without following its final component.
///
/// The parent directory is resolved, the file name is kept as-is. This is
/// what link management needs: `unlink("alias")` must see the alias itself,
/// not the chain node the alias points to.
///
/// # Example
/// ```ignore
/// let alias = normalize_entry("./a")?;
/// assert!(alias.is_absolute());
/// ```
pub fn normalize_entry(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let filename = path
        .file_name()
        .with_context(|| format!("Path has no filename: {}", path.display()))?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().context("Failed to get current directory")?,
    };
    let canonical_parent = parent
        .canonicalize()
        .with_context(|| format!("Failed to resolve parent directory: {}", parent.display()))?;
    Ok(canonical_parent.join(filename))
}

/// Normalize a path where the target file may not exist yet.
///
/// Same as [`normalize_entry`]; kept separate so call sites read as intent
/// (the destination of a link or rename).
pub fn normalize_nonexistent(path: impl AsRef<Path>) -> Result<PathBuf> {
    normalize_entry(path)
}

/// Normalize path, falling back to the original if canonicalization fails.
pub fn normalize_or_original(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    normalize_entry(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_entry_keeps_symlink_name() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("target.txt");
        let link = temp.path().join("link");
        fs::write(&target, "test").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let normalized = normalize_entry(&link).unwrap();
        assert!(normalized.is_absolute());
        assert_eq!(normalized.file_name().unwrap(), "link");
    }

    #[test]
    fn test_normalize_nonexistent_creates_valid_path() {
        let temp = tempdir().unwrap();
        let new_file = temp.path().join("new_file");

        let normalized = normalize_nonexistent(&new_file).unwrap();
        assert!(normalized.is_absolute());
        assert_eq!(normalized.file_name().unwrap(), "new_file");
    }

    #[test]
    fn test_normalize_resolves_parent_symlink() {
        let temp = tempdir().unwrap();
        let real = temp.path().join("real");
        fs::create_dir(&real).unwrap();
        let alias = temp.path().join("alias");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        let normalized = normalize_entry(alias.join("f")).unwrap();
        assert_eq!(normalized, real.canonicalize().unwrap().join("f"));
    }

    #[test]
    fn test_normalize_or_original_returns_original_on_failure() {
        let fake_path = Path::new("/nonexistent/path/file.txt");
        let result = normalize_or_original(fake_path);
        assert_eq!(result, fake_path);
    }

    #[test]
    fn test_root_has_no_filename() {
        assert!(normalize_entry("/").is_err());
    }
}
