//! Extraction path validation.
//!
//! Entry paths come straight from the manifest, so a hostile container can
//! name `../../etc/cron.d/x` or `/usr/local/bin/php`. Every path is checked
//! against a [`PathSafety`] policy before anything is written.

use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// Policy for validating extraction paths.
///
/// ```rust
/// use pharbox::safety::PathSafety;
///
/// assert_eq!(PathSafety::default(), PathSafety::Strict);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathSafety {
    /// Rejects `..` components and absolute paths, and verifies that the
    /// resolved path (following existing symlinks) stays inside the
    /// destination.
    #[default]
    Strict,
    /// Rejects `..` components and absolute paths without touching the
    /// filesystem.
    Relaxed,
    /// No validation. Only for containers you built yourself.
    Disabled,
}

/// Validates `entry_path` and returns where it extracts to under `dest_root`.
///
/// A trailing `/` (directory entry) is ignored for validation.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] if the path escapes `dest_root`, or an I/O
/// error if `dest_root` cannot be canonicalized in strict mode.
pub fn validate_extract_path(
    entry_path: &str,
    dest_root: &Path,
    policy: PathSafety,
    entry_index: usize,
) -> Result<PathBuf> {
    let trimmed = entry_path.trim_end_matches('/');
    let traversal = || Error::PathTraversal {
        entry_index,
        path: entry_path.to_string(),
    };

    if policy == PathSafety::Disabled {
        return Ok(dest_root.join(trimmed));
    }

    if trimmed.is_empty() || is_absolute(trimmed) {
        return Err(traversal());
    }
    if trimmed.split(['/', '\\']).any(|c| c == "..") {
        return Err(traversal());
    }

    let full_path = dest_root.join(trimmed);
    if policy == PathSafety::Relaxed {
        return Ok(full_path);
    }

    let canonical_dest = dest_root.canonicalize()?;

    // Canonicalize the deepest existing ancestor, then re-append the rest.
    let mut ancestor = full_path.as_path();
    let mut pending = Vec::new();
    while !ancestor.exists() {
        match (ancestor.file_name(), ancestor.parent()) {
            (Some(name), Some(parent)) => {
                pending.push(name.to_os_string());
                ancestor = parent;
            }
            _ => return Err(traversal()),
        }
    }
    let mut resolved = ancestor.canonicalize()?;
    for name in pending.into_iter().rev() {
        resolved.push(name);
    }

    if !resolved.starts_with(&canonical_dest) {
        return Err(traversal());
    }
    Ok(full_path)
}

fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    // Drive letters and UNC prefixes on Windows.
    matches!(
        Path::new(path).components().next(),
        Some(Component::Prefix(_) | Component::RootDir)
    ) || path.as_bytes().get(1) == Some(&b':')
}
