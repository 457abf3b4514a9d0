//! Write options and configuration for container creation.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::Compression;
use crate::format::Stub;

/// Default permission bits for packed files.
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;

/// Permission bits recorded for directory entries.
pub const DIRECTORY_PERMISSIONS: u32 = 0o755;

/// Options for building a container.
///
/// # Example
///
/// ```rust
/// use pharbox::codec::Compression;
/// use pharbox::write::WriteOptions;
///
/// let options = WriteOptions::new()
///     .alias("app.phar")
///     .compression(Compression::None)
///     .timestamp(1_700_000_000);
/// assert_eq!(options.entry_timestamp(), 1_700_000_000);
/// ```
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Bootstrap stub written before the manifest.
    pub stub: Stub,
    /// Container alias stored in the header.
    pub alias: Vec<u8>,
    /// Opaque container metadata stored in the header.
    pub metadata: Vec<u8>,
    /// Permission bits recorded for every file.
    pub permissions: u32,
    /// Fixed entry timestamp; `None` uses the current time.
    pub timestamp: Option<u32>,
    /// Compression applied when the session ends.
    pub compression: Compression,
    /// Directory that source paths are made relative to.
    pub base_path: Option<PathBuf>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            stub: Stub::default(),
            alias: Vec::new(),
            metadata: Vec::new(),
            permissions: DEFAULT_FILE_PERMISSIONS,
            timestamp: None,
            compression: Compression::None,
            base_path: None,
        }
    }
}

impl WriteOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stub.
    pub fn stub(mut self, stub: Stub) -> Self {
        self.stub = stub;
        self
    }

    /// Sets the alias.
    pub fn alias(mut self, alias: impl Into<Vec<u8>>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Sets the container metadata.
    pub fn metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Sets the file permission bits. Only the low nine bits are kept.
    pub fn permissions(mut self, mode: u32) -> Self {
        self.permissions = mode & 0o777;
        self
    }

    /// Fixes every entry timestamp, for reproducible builds.
    pub fn timestamp(mut self, unix_seconds: u32) -> Self {
        self.timestamp = Some(unix_seconds);
        self
    }

    /// Sets the compression.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the base path.
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Returns the timestamp to record for new entries.
    pub fn entry_timestamp(&self) -> u32 {
        self.timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
                .unwrap_or(0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WriteOptions::default();
        assert_eq!(options.permissions, 0o644);
        assert_eq!(options.compression, Compression::None);
        assert!(options.timestamp.is_none());
        assert!(options.entry_timestamp() > 1_600_000_000);
    }

    #[test]
    fn test_permissions_masked() {
        assert_eq!(WriteOptions::new().permissions(0o100755).permissions, 0o755);
    }
}
