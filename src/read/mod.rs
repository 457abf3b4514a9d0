//! Container reading API.
//!
//! [`Archive`] parses a whole container held in memory: the stub, the
//! manifest, the data blob and the optional signature trailer. Entry contents
//! are decompressed and verified on demand.
//!
//! # Example
//!
//! ```rust,no_run
//! use pharbox::read::{Archive, ExtractOptions};
//!
//! let archive = Archive::open_path("app.phar")?;
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.path, entry.size);
//! }
//! let main = archive.read("index.php")?;
//!
//! pharbox::read::extract("app.phar", "/tmp/app", &ExtractOptions::default())?;
//! # Ok::<(), pharbox::Error>(())
//! ```

mod extraction;
mod options;

pub use extraction::{Extraction, extract};
pub use options::{ExtractOptions, PathSafety};

use std::path::Path;

use crate::checksum::verify_crc32;
use crate::codec;
use crate::format::{FileEntry, Manifest, StubPattern, find_stub_length};
use crate::signature::{self, SignatureRecord};
use crate::{Error, Result};

/// A parsed container.
#[derive(Debug, Clone)]
pub struct Archive {
    data: Vec<u8>,
    stub_len: usize,
    manifest: Manifest,
    blob_start: usize,
    signature: Option<SignatureRecord>,
}

impl Archive {
    /// Opens a container file using the open stub pattern.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_path_with(path, &StubPattern::Open)
    }

    /// Opens a container file using a specific stub pattern.
    pub fn open_path_with(path: impl AsRef<Path>, pattern: &StubPattern) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes_with(data, pattern)
    }

    /// Parses an in-memory container using the open stub pattern.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, &StubPattern::Open)
    }

    /// Parses an in-memory container.
    ///
    /// # Errors
    ///
    /// Returns a format error if the stub boundary is missing, the manifest
    /// is corrupt, the data blob is truncated, or unexpected bytes follow the
    /// data blob.
    pub fn from_bytes_with(data: Vec<u8>, pattern: &StubPattern) -> Result<Self> {
        let stub_len = find_stub_length(&data, pattern)? as usize;
        let (manifest, consumed) = Manifest::decode(&data[stub_len..])?;
        let blob_start = stub_len + consumed;

        let blob_end = u64::try_from(blob_start)
            .ok()
            .and_then(|start| start.checked_add(manifest.data_size()))
            .filter(|end| *end <= data.len() as u64)
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "data blob of {} bytes overruns the {}-byte container",
                    manifest.data_size(),
                    data.len()
                ))
            })?;

        let signature = if blob_end < data.len() as u64 {
            let record = signature::read_trailer(&data)?.ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "{} unexpected bytes after the data blob",
                    data.len() as u64 - blob_end
                ))
            })?;
            if record.payload_len != blob_end {
                return Err(Error::InvalidFormat(format!(
                    "signature trailer starts at {} but the data blob ends at {blob_end}",
                    record.payload_len
                )));
            }
            Some(record)
        } else {
            None
        };

        log::debug!(
            "opened container: stub {} bytes, {} entries, signed: {}",
            stub_len,
            manifest.len(),
            signature.is_some()
        );

        Ok(Self {
            data,
            stub_len,
            manifest,
            blob_start,
            signature,
        })
    }

    /// Returns the stub bytes.
    pub fn stub(&self) -> &[u8] {
        &self.data[..self.stub_len]
    }

    /// Returns the manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Returns the entries in container order.
    pub fn entries(&self) -> &[FileEntry] {
        self.manifest.entries()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    /// Returns `true` if the container has no entries.
    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    /// Union of the entries' compression flags.
    pub fn flags(&self) -> u32 {
        self.manifest.flags()
    }

    /// Returns the header alias.
    pub fn alias(&self) -> &[u8] {
        &self.manifest.header().alias
    }

    /// Returns the container-level metadata bytes.
    pub fn metadata(&self) -> &[u8] {
        &self.manifest.header().metadata
    }

    /// Returns the signature trailer, if the container is signed.
    pub fn signature(&self) -> Option<&SignatureRecord> {
        self.signature.as_ref()
    }

    /// Returns the raw container bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the stored (possibly compressed) bytes of an entry.
    pub fn raw_data(&self, entry: &FileEntry) -> Result<&[u8]> {
        let start = self.blob_start as u64 + entry.offset;
        let end = start + u64::from(entry.compressed_size);
        if end > self.data.len() as u64 {
            return Err(Error::InvalidFormat(format!(
                "entry '{}' data overruns the container",
                entry.path
            )));
        }
        Ok(&self.data[start as usize..end as usize])
    }

    /// Reads and verifies the contents of the entry at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] for unknown paths and an integrity
    /// error if the size or CRC-32 does not match.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let index = self
            .entries()
            .iter()
            .position(|e| e.path == path)
            .ok_or_else(|| Error::EntryNotFound {
                path: path.to_string(),
            })?;
        self.read_entry(index)
    }

    /// Reads and verifies the contents of the entry at `index`.
    pub fn read_entry(&self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries()
            .get(index)
            .ok_or_else(|| Error::EntryNotFound {
                path: format!("#{index}"),
            })?;
        let raw = self.raw_data(entry)?;
        let contents = codec::decompress(raw, entry.compression()?, u64::from(entry.size))?;

        if contents.len() as u64 != u64::from(entry.size) {
            return Err(Error::SizeMismatch {
                entry_name: entry.path.clone(),
                expected: u64::from(entry.size),
                actual: contents.len() as u64,
            });
        }
        verify_crc32(index, &entry.path, &contents, entry.crc32)?;
        Ok(contents)
    }

    /// Extracts every entry under `dest`. See [`extract`].
    pub fn extract(&self, dest: impl AsRef<Path>, options: &ExtractOptions) -> Result<Extraction> {
        extraction::extract_archive(self, None, dest.as_ref(), options)
    }
}
