//! # pharbox
//!
//! A pure-Rust engine for building, signing, verifying and extracting PHAR
//! containers: a bootstrap stub followed by a binary manifest, the
//! concatenated entry data and an optional signature trailer.
//!
//! ## Quick Start
//!
//! ### Building a Container
//!
//! ```rust,no_run
//! use pharbox::{ArchiveWriter, Compression, Result, WriteOptions};
//! use pharbox::signature::SignatureAlgorithm;
//! use pharbox::write::{Compactors, JsonCompactor, PhpCompactor};
//!
//! fn main() -> Result<()> {
//!     let mut writer = ArchiveWriter::new(WriteOptions::new().alias("app.phar"))
//!         .compactors(Compactors::new().with(PhpCompactor).with(JsonCompactor));
//!
//!     writer.start_buffering()?;
//!     writer.add_file("bin/run.php", "<?php require 'vendor/autoload.php';")?;
//!     writer.add_file("composer.json", r#"{ "name": "acme/app" }"#)?;
//!     writer.end_buffering(|_scratch| Ok(()))?;
//!
//!     writer.compress(Compression::Gzip)?;
//!     writer.sign(SignatureAlgorithm::Sha256)?;
//!     writer.write("app.phar")?;
//!     Ok(())
//! }
//! ```
//!
//! ### Extracting and Verifying
//!
//! ```rust,no_run
//! use pharbox::{ExtractOptions, Result, extract, verify_path};
//!
//! fn main() -> Result<()> {
//!     let verification = verify_path("app.phar", None)?;
//!     println!("{} {}", verification.hash_type, verification.hash);
//!
//!     let extraction = extract("app.phar", "/tmp/app", &ExtractOptions::default())?;
//!     println!("{} entries", extraction.entries_extracted);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `deflate` | Yes | GZIP (raw deflate) entry compression |
//! | `bzip2` | Yes | BZIP2 entry compression |
//! | `openssl-sig` | Yes | RSA signatures with `.pubkey` side files |
//! | `parallel` | Yes | Worker pool for stateful compaction |
//!
//! Compressing or decompressing with a codec that was not compiled in fails
//! with [`Error::CodecUnavailable`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read operations (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod checksum;
pub mod codec;
pub mod diff;
pub mod error;
pub mod format;
pub mod hash;
pub mod pipeline;
pub mod read;
pub mod safety;
pub mod signature;
pub mod write;

pub use error::{Error, Result};

pub use codec::Compression;
pub use format::{FileEntry, Manifest, ManifestHeader, Stub, StubPattern};

// Reading
pub use read::{Archive, ExtractOptions, Extraction, PathSafety, extract};

// Writing
pub use write::{ArchiveWriter, WriteOptions};

// Signatures
pub use signature::{HashType, SignatureAlgorithm, Verification, verify_path};

pub use diff::{DiffAlgorithm, DiffOptions, DiffReport, diff_archives, diff_directories};
pub use pipeline::{Pipeline, PipelineOptions, Threads};
