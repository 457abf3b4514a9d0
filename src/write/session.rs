//! Buffering sessions: files are compacted and staged in memory, then
//! materialized to a scratch directory just before the container is assembled.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::bytes::{Captures, Regex};
use walkdir::WalkDir;

use super::compactor::{Compactors, SymbolRegistry};
use crate::format::{EMPTY_PLACEHOLDER_CONTENTS, EMPTY_PLACEHOLDER_PATH};
use crate::safety::{PathSafety, validate_extract_path};
use crate::{Error, Result};

/// Literal token substitution.
///
/// All tokens are replaced in a single pass, longest token first at each
/// position, so the result does not depend on insertion order and replaced
/// values are never re-scanned.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: BTreeMap<String, String>,
    matcher: Option<Regex>,
}

impl Placeholders {
    /// Creates a substitution map.
    ///
    /// Empty tokens are ignored.
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let values: BTreeMap<String, String> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        let matcher = if values.is_empty() {
            None
        } else {
            let mut tokens: Vec<&String> = values.keys().collect();
            tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
            let pattern = tokens
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&pattern).map_err(|e| Error::ResourceLimitExceeded(e.to_string()))?)
        };

        Ok(Self { values, matcher })
    }

    /// Returns `true` if there is nothing to replace.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replaces every token in `contents`.
    pub fn apply(&self, contents: Vec<u8>) -> Vec<u8> {
        let Some(matcher) = &self.matcher else {
            return contents;
        };
        matcher
            .replace_all(&contents, |caps: &Captures<'_>| {
                let token = String::from_utf8_lossy(&caps[0]);
                self.values
                    .get(token.as_ref())
                    .map(|v| v.as_bytes().to_vec())
                    .unwrap_or_else(|| caps[0].to_vec())
            })
            .into_owned()
    }
}

/// Maps source paths to paths inside the container.
///
/// Rules are `(prefix, replacement)` pairs tried in order; the first prefix
/// that matches is replaced. An empty prefix matches every path, so it
/// prepends its replacement.
///
/// ```
/// use pharbox::write::PathMapper;
///
/// let mapper = PathMapper::new()
///     .rule("src/", "lib/")
///     .rule("", "vendor-bin/");
/// assert_eq!(mapper.map("src/App.php"), "lib/App.php");
/// assert_eq!(mapper.map("bin/run"), "vendor-bin/bin/run");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMapper {
    rules: Vec<(String, String)>,
}

impl PathMapper {
    /// Creates the identity mapper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule.
    pub fn rule(mut self, prefix: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.rules.push((prefix.into(), replacement.into()));
        self
    }

    /// Maps `path`.
    pub fn map(&self, path: &str) -> String {
        for (prefix, replacement) in &self.rules {
            if let Some(rest) = path.strip_prefix(prefix.as_str()) {
                return format!("{replacement}{rest}");
            }
        }
        path.to_string()
    }
}

/// A file read back from the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Path inside the container; ends with `/` for empty directories.
    pub path: String,
    /// File contents (empty for directories).
    pub contents: Vec<u8>,
}

impl StagedFile {
    /// Returns `true` for directory entries.
    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }
}

/// State of one `start_buffering` .. `end_buffering` cycle.
#[derive(Debug)]
pub struct BuildSession {
    compactors: Compactors,
    placeholders: Placeholders,
    mapper: PathMapper,
    base_path: Option<PathBuf>,
    files: BTreeMap<String, Vec<u8>>,
    registry: SymbolRegistry,
}

impl BuildSession {
    /// Opens a session over snapshots of the writer's configuration.
    pub fn new(
        compactors: Compactors,
        placeholders: Placeholders,
        mapper: PathMapper,
        base_path: Option<PathBuf>,
    ) -> Self {
        Self {
            compactors,
            placeholders,
            mapper,
            base_path,
            files: BTreeMap::new(),
            registry: SymbolRegistry::new(),
        }
    }

    /// Returns the compactor chain of this session.
    pub fn compactors(&self) -> &Compactors {
        &self.compactors
    }

    /// Computes the container path of a source path: the base path is
    /// stripped, separators are normalized to `/`, then the mapper applies.
    pub fn local_path(&self, path: &str) -> String {
        let normalized = path.replace('\\', "/");
        let relative = self
            .base_path
            .as_ref()
            .and_then(|base| {
                let base = base.to_string_lossy().replace('\\', "/");
                let base = base.trim_end_matches('/');
                normalized
                    .strip_prefix(base)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .map(str::to_string)
            })
            .unwrap_or(normalized);
        let relative = relative.trim_start_matches("./");
        self.mapper.map(relative)
    }

    /// Compacts `contents`, substitutes placeholders and stages the result
    /// under the mapped path. A later file with the same mapped path
    /// replaces the earlier one.
    ///
    /// Returns the mapped path.
    pub fn add_file(&mut self, path: &str, contents: Vec<u8>) -> Result<String> {
        let local = self.local_path(path);
        let compacted = self.compactors.compact(path, contents, &mut self.registry)?;
        self.stage(local.clone(), compacted);
        Ok(local)
    }

    /// Stages contents that were already compacted elsewhere; placeholders
    /// are still applied.
    pub fn add_compacted(&mut self, local: String, contents: Vec<u8>) {
        self.stage(local, contents);
    }

    /// Merges symbols renamed outside this session.
    pub fn merge_registry(&mut self, registry: SymbolRegistry) {
        self.registry.merge(registry);
    }

    fn stage(&mut self, local: String, contents: Vec<u8>) {
        let contents = self.placeholders.apply(contents);
        if self.files.insert(local.clone(), contents).is_some() {
            log::debug!("{local} staged again, keeping the later contents");
        }
    }

    /// Number of staged files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if nothing was staged.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns the symbols renamed so far.
    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    /// Closes the session.
    ///
    /// An empty session gets the `.box_empty` placeholder file. The staged
    /// files are written to a scratch directory, `finalize` is called with
    /// that directory (it may add, change or delete files), and the
    /// directory is read back in sorted order. Empty directories become
    /// entries ending in `/`.
    pub fn finish<F>(mut self, finalize: F) -> Result<(Vec<StagedFile>, SymbolRegistry)>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        if self.files.is_empty() {
            log::debug!("no files buffered, adding {EMPTY_PLACEHOLDER_PATH}");
            self.files.insert(
                EMPTY_PLACEHOLDER_PATH.to_string(),
                EMPTY_PLACEHOLDER_CONTENTS.to_vec(),
            );
        }

        let scratch = tempfile::tempdir()?;
        let root = scratch.path();
        for (index, (local, contents)) in self.files.iter().enumerate() {
            let target = validate_extract_path(local, root, PathSafety::Strict, index)?;
            if local.ends_with('/') {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, contents)?;
        }

        finalize(root)?;

        let staged = read_tree(root)?;
        Ok((staged, self.registry))
    }
}

fn read_tree(root: &Path) -> Result<Vec<StagedFile>> {
    let mut staged = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .map(Error::Io)
                .unwrap_or_else(|| Error::InvalidFormat("directory loop in build tree".into()))
        })?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::InvalidFormat("entry outside build tree".into()))?;
        let mut path = relative
            .components()
            .map(|c| {
                c.as_os_str().to_str().ok_or_else(|| {
                    Error::InvalidFormat(format!("non UTF-8 path {}", relative.display()))
                })
            })
            .collect::<Result<Vec<_>>>()?
            .join("/");

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if fs::read_dir(entry.path())?.next().is_none() {
                path.push('/');
                staged.push(StagedFile {
                    path,
                    contents: Vec::new(),
                });
            }
        } else if file_type.is_file() {
            let contents = fs::read(entry.path())?;
            staged.push(StagedFile { path, contents });
        } else {
            log::warn!("skipping {path}: not a regular file");
        }
    }
    Ok(staged)
}
