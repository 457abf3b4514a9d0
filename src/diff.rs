//! Content comparison of two extracted trees or two containers.
//!
//! The default [`DiffMode::Positional`] walks both trees in directory
//! traversal order and compares the `n`-th file of one side with the `n`-th
//! file of the other, padding the shorter listing with the names of the
//! longer one. Two trees that enumerate in different orders can therefore be
//! reported as different even when their contents match; use
//! [`DiffMode::PathKeyed`] to compare files with the same relative path
//! instead.
//!
//! ```rust,no_run
//! use pharbox::diff::{DiffOptions, diff_archives};
//!
//! let report = diff_archives("old.phar", "new.phar", &DiffOptions::default())?;
//! println!("{} files differ", report.count());
//! # Ok::<(), pharbox::Error>(())
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::read::{ExtractOptions, extract};
use crate::{Error, Result};

/// Hash used to compare file contents. Defaults to SHA-384.
pub use crate::hash::HashAlgorithm as DiffAlgorithm;

/// How files of the two sides are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// Pair files by their position in traversal order.
    #[default]
    Positional,
    /// Pair files by relative path.
    PathKeyed,
}

/// Options for [`diff_directories`] and [`diff_archives`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffOptions {
    /// Content hash.
    pub algorithm: DiffAlgorithm,
    /// Pairing mode.
    pub mode: DiffMode,
}

impl DiffOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hash algorithm.
    pub fn algorithm(mut self, algorithm: DiffAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the pairing mode.
    pub fn mode(mut self, mode: DiffMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One difference between the two sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    /// Both files exist and their hashes differ.
    Changed {
        /// Relative path on the left.
        left: String,
        /// Relative path on the right.
        right: String,
    },
    /// The file only exists on the left.
    OnlyLeft(String),
    /// The file only exists on the right.
    OnlyRight(String),
}

/// Differences found by a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffReport {
    /// Differences in pairing order.
    pub entries: Vec<DiffEntry>,
}

impl DiffReport {
    /// Number of differing pairs; `0` means no differences were found.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no differences were found.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compares two directory trees.
///
/// # Errors
///
/// Returns an I/O error if either tree cannot be walked or a file cannot be
/// read.
pub fn diff_directories(
    left: impl AsRef<Path>,
    right: impl AsRef<Path>,
    options: &DiffOptions,
) -> Result<DiffReport> {
    let left = left.as_ref();
    let right = right.as_ref();
    let left_files = list_files(left)?;
    let right_files = list_files(right)?;

    let pairs = match options.mode {
        DiffMode::Positional => positional_pairs(left_files, right_files),
        DiffMode::PathKeyed => keyed_pairs(left_files, right_files),
    };

    let mut report = DiffReport::default();
    for (left_name, right_name) in pairs {
        let left_path = left.join(&left_name);
        let right_path = right.join(&right_name);
        let entry = match (left_path.is_file(), right_path.is_file()) {
            (true, true) => {
                let left_hash = options.algorithm.hash_file(&left_path)?;
                let right_hash = options.algorithm.hash_file(&right_path)?;
                (left_hash != right_hash).then(|| DiffEntry::Changed {
                    left: left_name,
                    right: right_name,
                })
            }
            (true, false) => Some(DiffEntry::OnlyLeft(left_name)),
            (false, true) => Some(DiffEntry::OnlyRight(right_name)),
            (false, false) => None,
        };
        if let Some(entry) = entry {
            log::debug!("difference: {entry:?}");
            report.entries.push(entry);
        }
    }
    log::info!(
        "{} differences between {} and {} ({})",
        report.count(),
        left.display(),
        right.display(),
        options.algorithm
    );
    Ok(report)
}

/// Extracts both containers into scratch directories and compares them.
pub fn diff_archives(
    left: impl AsRef<Path>,
    right: impl AsRef<Path>,
    options: &DiffOptions,
) -> Result<DiffReport> {
    let scratch = tempfile::tempdir()?;
    let extract_options = ExtractOptions::new().fingerprint(false);
    let left_dir = scratch.path().join("left");
    let right_dir = scratch.path().join("right");
    extract(left.as_ref(), &left_dir, &extract_options)?;
    extract(right.as_ref(), &right_dir, &extract_options)?;
    diff_directories(&left_dir, &right_dir, options)
}

fn positional_pairs(mut left: Vec<String>, mut right: Vec<String>) -> Vec<(String, String)> {
    if left.len() < right.len() {
        left.extend_from_slice(&right[left.len()..]);
    } else if right.len() < left.len() {
        right.extend_from_slice(&left[right.len()..]);
    }
    left.into_iter().zip(right).collect()
}

fn keyed_pairs(left: Vec<String>, right: Vec<String>) -> Vec<(String, String)> {
    let names: BTreeSet<String> = left.into_iter().chain(right).collect();
    names.into_iter().map(|name| (name.clone(), name)).collect()
}

/// Relative paths of every regular file under `root`, in traversal order.
fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .map(Error::Io)
                .unwrap_or_else(|| Error::InvalidFormat("directory loop".into()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative: PathBuf = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::InvalidFormat("file outside compared tree".into()))?
            .to_path_buf();
        files.push(relative.to_string_lossy().replace('\\', "/"));
    }
    Ok(files)
}
