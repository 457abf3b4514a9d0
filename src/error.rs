//! Error types for container operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when building, signing, verifying or extracting containers,
//! along with a convenient [`Result<T>`] type alias.
//!
//! # Error Categories
//!
//! Every variant belongs to exactly one category, queried through the
//! `is_*` predicates on [`Error`]:
//!
//! | Category | Predicate | Variants |
//! |----------|-----------|----------|
//! | Format | [`is_format_error`][Error::is_format_error] | `StubNotFound`, `InvalidFormat`, `CorruptManifest` |
//! | Integrity | [`is_integrity_error`][Error::is_integrity_error] | `CrcMismatch`, `SizeMismatch` |
//! | Signature | [`is_signature_error`][Error::is_signature_error] | `Unsigned`, `UnsupportedSignature`, `SignatureMismatch`, `InvalidKey`, `SignatureBackendUnavailable` |
//! | Resource | [`is_resource_error`][Error::is_resource_error] | `Io`, `CodecUnavailable`, `ResourceLimitExceeded` |
//! | State | [`is_state_error`][Error::is_state_error] | `AlreadyBuffering`, `NotBuffering`, `NothingBuilt` |
//! | Security | [`is_security_error`][Error::is_security_error] | `PathTraversal` |
//!
//! # Example
//!
//! ```rust,no_run
//! use pharbox::{Archive, Error};
//!
//! fn describe(path: &str) -> pharbox::Result<()> {
//!     match Archive::open_path(path) {
//!         Ok(archive) => {
//!             println!("{} entries", archive.len());
//!             Ok(())
//!         }
//!         Err(e) if e.is_format_error() => {
//!             eprintln!("Not a container: {}", e);
//!             Err(e)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```

use std::io;

use crate::codec::Compression;
use crate::signature::HashType;

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_index: usize,
    entry_name: Option<&'a str>,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC mismatch for entry {}", self.entry_index)?;
        if let Some(name) = self.entry_name {
            write!(f, " ({})", name)?;
        }
        // Stored checksums are compared as unsigned decimal strings.
        write!(f, ": expected {}, got {}", self.expected, self.actual)
    }
}

/// The main error type for container operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred during file operations.
    ///
    /// This includes failures to create scratch or destination directories
    /// and failures to purge a previous extraction.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stub boundary pattern was not found before the end of the input.
    #[error("stub boundary {pattern:?} not found in {scanned} bytes")]
    StubNotFound {
        /// The pattern that was searched for, lossily decoded.
        pattern: String,
        /// Number of bytes scanned.
        scanned: u64,
    },

    /// The container layout is invalid.
    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    /// The manifest is truncated or one of its length fields overruns the buffer.
    #[error("Corrupt manifest at offset {offset:#x}: {reason}")]
    CorruptManifest {
        /// Byte offset inside the manifest where decoding failed.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The CRC-32 of an extracted entry does not match the manifest.
    #[error("{}", CrcMismatchDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref(), expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The entry index with the CRC mismatch.
        entry_index: usize,
        /// The entry path (if known).
        entry_name: Option<String>,
        /// The expected CRC value from the manifest.
        expected: u32,
        /// The actual CRC value of the decompressed data.
        actual: u32,
    },

    /// The decompressed length of an entry differs from its declared size.
    #[error("size mismatch for entry '{entry_name}': expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The entry path.
        entry_name: String,
        /// Declared uncompressed size.
        expected: u64,
        /// Actual decompressed size.
        actual: u64,
    },

    /// The container carries no `GBMB` signature trailer.
    #[error("container is not signed")]
    Unsigned,

    /// The signature trailer names a hash type this engine does not know.
    #[error("unsupported signature type {flag:#06x}")]
    UnsupportedSignature {
        /// The raw flag read from the trailer.
        flag: u32,
    },

    /// The recomputed digest or signature does not match the trailer.
    #[error("{hash_type} signature verification failed")]
    SignatureMismatch {
        /// The hash type that failed.
        hash_type: HashType,
    },

    /// Key material is missing, malformed, or cannot be decrypted.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The asymmetric signing backend was not compiled in.
    #[error("signing backend unavailable: enable the `{feature}` feature")]
    SignatureBackendUnavailable {
        /// The feature that provides the backend.
        feature: &'static str,
    },

    /// The codec for a compression algorithm is not available in this build.
    #[error("{compression} codec unavailable: enable the `{feature}` feature")]
    CodecUnavailable {
        /// The requested compression.
        compression: Compression,
        /// The feature that provides the codec.
        feature: &'static str,
    },

    /// A resource limit was exceeded.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// `start_buffering` was called while a buffering session is open.
    #[error("cannot start buffering: a buffering session is already open")]
    AlreadyBuffering,

    /// A buffering-only operation was called outside a buffering session.
    #[error("no buffering session is open")]
    NotBuffering,

    /// The writer has not assembled a container yet.
    #[error("no container has been built yet")]
    NothingBuilt,

    /// An entry path would escape the extraction directory.
    #[error("Path traversal detected in entry {entry_index}: {path}")]
    PathTraversal {
        /// The entry index with path traversal.
        entry_index: usize,
        /// The offending path.
        path: String,
    },

    /// An entry was not found in the container.
    #[error("Entry not found: {path}")]
    EntryNotFound {
        /// The path that was not found.
        path: String,
    },
}

impl Error {
    /// Returns `true` for stub, layout and manifest errors.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::StubNotFound { .. } | Error::InvalidFormat(_) | Error::CorruptManifest { .. }
        )
    }

    /// Returns `true` for checksum and size mismatches found during extraction.
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Error::CrcMismatch { .. } | Error::SizeMismatch { .. })
    }

    /// Returns `true` for everything the signature engine can reject.
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            Error::Unsigned
                | Error::UnsupportedSignature { .. }
                | Error::SignatureMismatch { .. }
                | Error::InvalidKey(_)
                | Error::SignatureBackendUnavailable { .. }
        )
    }

    /// Returns `true` for filesystem, codec availability and limit errors.
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::CodecUnavailable { .. } | Error::ResourceLimitExceeded(_)
        )
    }

    /// Returns `true` when a buffering session was misused.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadyBuffering | Error::NotBuffering | Error::NothingBuilt
        )
    }

    /// Returns `true` if this error indicates a security issue.
    pub fn is_security_error(&self) -> bool {
        matches!(self, Error::PathTraversal { .. })
    }

    /// Returns the entry name/path associated with this error, if any.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::CrcMismatch { entry_name, .. } => entry_name.as_deref(),
            Error::SizeMismatch { entry_name, .. } => Some(entry_name.as_str()),
            Error::PathTraversal { path, .. } => Some(path.as_str()),
            Error::EntryNotFound { path } => Some(path.as_str()),
            _ => None,
        }
    }

    /// Creates a CrcMismatch error.
    pub fn crc_mismatch(
        entry_index: usize,
        entry_name: Option<String>,
        expected: u32,
        actual: u32,
    ) -> Self {
        Error::CrcMismatch {
            entry_index,
            entry_name,
            expected,
            actual,
        }
    }

    /// Creates a CorruptManifest error.
    pub fn corrupt_manifest(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptManifest {
            offset,
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for container operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_resource_error());
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_crc_mismatch_uses_decimal() {
        let err = Error::crc_mismatch(2, Some("a.php".into()), 4294967295, 1);
        assert_eq!(
            err.to_string(),
            "CRC mismatch for entry 2 (a.php): expected 4294967295, got 1"
        );
        assert!(err.is_integrity_error());
        assert_eq!(err.entry_name(), Some("a.php"));
    }

    #[test]
    fn test_corrupt_manifest() {
        let err = Error::corrupt_manifest(0x10, "path length overruns buffer");
        assert_eq!(
            err.to_string(),
            "Corrupt manifest at offset 0x10: path length overruns buffer"
        );
        assert!(err.is_format_error());
        assert!(!err.is_integrity_error());
    }

    #[test]
    fn test_categories_are_disjoint() {
        let errors = [
            Error::StubNotFound {
                pattern: "x".into(),
                scanned: 0,
            },
            Error::SizeMismatch {
                entry_name: "a".into(),
                expected: 1,
                actual: 2,
            },
            Error::UnsupportedSignature { flag: 0x99 },
            Error::CodecUnavailable {
                compression: Compression::Bzip2,
                feature: "bzip2",
            },
            Error::AlreadyBuffering,
            Error::PathTraversal {
                entry_index: 0,
                path: "../x".into(),
            },
        ];
        for err in &errors {
            let hits = [
                err.is_format_error(),
                err.is_integrity_error(),
                err.is_signature_error(),
                err.is_resource_error(),
                err.is_state_error(),
                err.is_security_error(),
            ]
            .iter()
            .filter(|b| **b)
            .count();
            assert_eq!(hits, 1, "{err} belongs to {hits} categories");
        }
    }

    #[test]
    fn test_signature_mismatch_display() {
        let err = Error::SignatureMismatch {
            hash_type: HashType::Sha256,
        };
        assert_eq!(err.to_string(), "SHA-256 signature verification failed");
        assert!(err.is_signature_error());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
