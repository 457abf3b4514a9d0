//! Extraction of a container into a directory tree.
//!
//! Extraction is idempotent: once a container has been extracted, a marker
//! file named after the MD5 of the container is left in the destination, and
//! later calls with the same container and destination return immediately.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Archive, ExtractOptions};
use crate::hash::HashAlgorithm;
use crate::Result;
use crate::safety::validate_extract_path;

/// Outcome of an extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// The destination directory.
    pub destination: PathBuf,
    /// Lowercase hex MD5 of the container.
    pub fingerprint: String,
    /// Number of entries written; `0` when the marker short-circuited.
    pub entries_extracted: usize,
    /// `true` if the fingerprint marker was found and nothing was written.
    pub cached: bool,
}

/// Extracts the container at `file` into `dest`.
///
/// When the fingerprint marker `dest/<md5 of file>` exists, `dest` is
/// returned untouched. Otherwise `dest` is removed recursively, recreated,
/// and every entry is decompressed, checked against its declared size and
/// CRC-32, and written. Entries whose path ends in `/` become directories.
///
/// # Errors
///
/// Stops at the first failing entry and returns its integrity, format or
/// security error; the marker is only written after every entry succeeded.
/// Failure to purge an existing `dest` is returned as an I/O error.
pub fn extract(
    file: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<Extraction> {
    let file = file.as_ref();
    let dest = dest.as_ref();

    let fingerprint = HashAlgorithm::Md5.hash_file(file)?;
    if let Some(cached) = cached_extraction(dest, &fingerprint, options) {
        return Ok(cached);
    }

    let archive = Archive::open_path_with(file, &options.stub_pattern)?;
    extract_archive(&archive, Some(fingerprint), dest, options)
}

fn cached_extraction(
    dest: &Path,
    fingerprint: &str,
    options: &ExtractOptions,
) -> Option<Extraction> {
    if !options.fingerprint || !dest.join(fingerprint).is_file() {
        return None;
    }
    log::info!(
        "{} already holds container {}, skipping extraction",
        dest.display(),
        fingerprint
    );
    Some(Extraction {
        destination: dest.to_path_buf(),
        fingerprint: fingerprint.to_string(),
        entries_extracted: 0,
        cached: true,
    })
}

pub(super) fn extract_archive(
    archive: &Archive,
    fingerprint: Option<String>,
    dest: &Path,
    options: &ExtractOptions,
) -> Result<Extraction> {
    let fingerprint = match fingerprint {
        Some(fingerprint) => fingerprint,
        None => {
            let fingerprint = hex::encode(HashAlgorithm::Md5.digest(archive.as_bytes()));
            if let Some(cached) = cached_extraction(dest, &fingerprint, options) {
                return Ok(cached);
            }
            fingerprint
        }
    };

    if dest.exists() {
        log::debug!("purging {}", dest.display());
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;

    for (index, entry) in archive.entries().iter().enumerate() {
        let target = validate_extract_path(&entry.path, dest, options.path_safety, index)?;

        if entry.is_directory() {
            fs::create_dir_all(&target)?;
            log::debug!("created directory {}", entry.path);
            continue;
        }

        let contents = archive.read_entry(index)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &contents)?;

        #[cfg(unix)]
        if options.preserve_permissions && entry.permissions() != 0 {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(entry.permissions()))?;
        }

        log::debug!("extracted {} ({} bytes)", entry.path, contents.len());
    }

    if options.fingerprint {
        fs::write(dest.join(&fingerprint), b"")?;
    }
    log::info!(
        "extracted {} entries into {}",
        archive.len(),
        dest.display()
    );

    Ok(Extraction {
        destination: dest.to_path_buf(),
        fingerprint,
        entries_extracted: archive.len(),
        cached: false,
    })
}
