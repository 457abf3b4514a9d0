//! Container writing API.
//!
//! Files are added during a buffering session, pass through the compactor
//! chain and placeholder substitution, and are assembled into a container
//! when the session ends. The built container can then be re-compressed and
//! signed before it is written out.
//!
//! # Example
//!
//! ```rust,no_run
//! use pharbox::codec::Compression;
//! use pharbox::signature::SignatureAlgorithm;
//! use pharbox::write::{ArchiveWriter, Compactors, PhpCompactor, WriteOptions};
//!
//! let mut writer = ArchiveWriter::new(WriteOptions::new().alias("app.phar"))
//!     .compactors(Compactors::new().with(PhpCompactor));
//!
//! writer.start_buffering()?;
//! writer.add_file("index.php", "<?php echo 'hello';")?;
//! writer.end_buffering(|_scratch_dir| Ok(()))?;
//!
//! writer.compress(Compression::Gzip)?;
//! writer.sign(SignatureAlgorithm::Sha512)?;
//! writer.write("app.phar")?;
//! # Ok::<(), pharbox::Error>(())
//! ```

pub mod compactor;
pub mod fd_limit;
mod options;
pub mod session;

pub use compactor::{
    Compactor, Compactors, JsonCompactor, PhpCompactor, SymbolPrefixer, SymbolRegistry,
};
pub use fd_limit::FdLimitGuard;
pub use options::{DEFAULT_FILE_PERMISSIONS, DIRECTORY_PERMISSIONS, WriteOptions};
pub use session::{BuildSession, PathMapper, Placeholders, StagedFile};

use std::path::{Path, PathBuf};

use crate::checksum::crc32;
use crate::codec::{self, Compression, flags};
use crate::format::{API_VERSION, FileEntry, Manifest, ManifestHeader};
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::signature::{self, SignatureAlgorithm, public_key_path};
use crate::{Error, Result};

/// An entry of a built container, kept uncompressed so it can be re-encoded.
#[derive(Debug, Clone)]
struct BuiltEntry {
    path: String,
    contents: Vec<u8>,
    stored: Vec<u8>,
    compression: Compression,
    permissions: u32,
    timestamp: u32,
}

impl BuiltEntry {
    fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }

    fn encode(&mut self, compression: Compression) -> Result<()> {
        if self.is_directory() {
            return Ok(());
        }
        self.stored = codec::compress(&self.contents, compression)?;
        self.compression = compression;
        Ok(())
    }

    fn manifest_entry(&self) -> Result<FileEntry> {
        let too_large =
            || Error::ResourceLimitExceeded(format!("entry '{}' exceeds 4 GiB", self.path));
        Ok(FileEntry {
            path: self.path.clone(),
            size: u32::try_from(self.contents.len()).map_err(|_| too_large())?,
            timestamp: self.timestamp,
            compressed_size: u32::try_from(self.stored.len()).map_err(|_| too_large())?,
            crc32: crc32(&self.contents),
            flags: self.permissions | self.compression.flag(),
            metadata: Vec::new(),
            offset: 0,
        })
    }
}

/// Builds containers.
#[derive(Debug)]
pub struct ArchiveWriter {
    options: WriteOptions,
    compactors: Compactors,
    placeholders: Placeholders,
    mapper: PathMapper,
    session: Option<BuildSession>,
    built: Option<Vec<BuiltEntry>>,
    registry: SymbolRegistry,
    signature: Option<SignatureAlgorithm>,
}

impl ArchiveWriter {
    /// Creates a writer.
    pub fn new(options: WriteOptions) -> Self {
        Self {
            options,
            compactors: Compactors::new(),
            placeholders: Placeholders::default(),
            mapper: PathMapper::new(),
            session: None,
            built: None,
            registry: SymbolRegistry::new(),
            signature: None,
        }
    }

    /// Sets the compactor chain used by later sessions.
    pub fn compactors(mut self, compactors: Compactors) -> Self {
        self.compactors = compactors;
        self
    }

    /// Sets the placeholder map used by later sessions.
    pub fn placeholders(mut self, placeholders: Placeholders) -> Self {
        self.placeholders = placeholders;
        self
    }

    /// Sets the path mapper used by later sessions.
    pub fn path_mapper(mut self, mapper: PathMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Appends a compactor to the chain.
    pub fn register_compactor(&mut self, compactor: impl Compactor + 'static) {
        self.compactors.push(compactor);
    }

    /// Returns the options.
    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Returns `true` while a buffering session is open.
    pub fn is_buffering(&self) -> bool {
        self.session.is_some()
    }

    /// Opens a buffering session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyBuffering`] if a session is already open.
    pub fn start_buffering(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyBuffering);
        }
        self.session = Some(BuildSession::new(
            self.compactors.clone(),
            self.placeholders.clone(),
            self.mapper.clone(),
            self.options.base_path.clone(),
        ));
        log::debug!("buffering started");
        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut BuildSession> {
        self.session.as_mut().ok_or(Error::NotBuffering)
    }

    /// Buffers one file and returns its path inside the container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuffering`] outside a session, or the first
    /// compactor error.
    pub fn add_file(&mut self, path: &str, contents: impl Into<Vec<u8>>) -> Result<String> {
        self.session_mut()?.add_file(path, contents.into())
    }

    /// Reads, compacts and buffers files from disk through the compaction
    /// pipeline. Returns the number of files buffered.
    pub fn add_files(&mut self, paths: &[PathBuf], options: &PipelineOptions) -> Result<usize> {
        let session = self.session.as_ref().ok_or(Error::NotBuffering)?;
        let pipeline = Pipeline::new(session.compactors().clone(), *options);
        let compacted = pipeline.run(paths, &|path: &str| session.local_path(path))?;

        let session = self.session_mut()?;
        let count = compacted.files.len();
        for (local, contents) in compacted.files {
            session.add_compacted(local, contents);
        }
        session.merge_registry(compacted.registry);
        Ok(count)
    }

    /// Closes the session and assembles the container.
    ///
    /// `finalize` runs against the scratch directory holding every buffered
    /// file, before the container is assembled. Entries are compressed with
    /// [`WriteOptions::compression`]. Returns the container bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuffering`] if no session is open, or any error
    /// from `finalize`, the scratch directory or the codec.
    pub fn end_buffering<F>(&mut self, finalize: F) -> Result<Vec<u8>>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let session = self.session.take().ok_or(Error::NotBuffering)?;
        let (staged, registry) = session.finish(finalize)?;

        let timestamp = self.options.entry_timestamp();
        let mut entries: Vec<BuiltEntry> = staged
            .into_iter()
            .map(|file| {
                let permissions = if file.is_directory() {
                    DIRECTORY_PERMISSIONS
                } else {
                    self.options.permissions
                };
                BuiltEntry {
                    stored: file.contents.clone(),
                    path: file.path,
                    contents: file.contents,
                    compression: Compression::None,
                    permissions,
                    timestamp,
                }
            })
            .collect();

        if self.options.compression != Compression::None {
            self.options.compression.ensure_available()?;
            let _guard = FdLimitGuard::bump(entries.len());
            for entry in &mut entries {
                entry.encode(self.options.compression)?;
            }
        }

        log::info!("built container with {} entries", entries.len());
        self.registry.merge(registry);
        self.built = Some(entries);
        self.signature = None;
        self.to_bytes()
    }

    fn built_mut(&mut self) -> Result<&mut Vec<BuiltEntry>> {
        self.built.as_mut().ok_or(Error::NothingBuilt)
    }

    /// Re-encodes every entry with `compression`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NothingBuilt`] before the first session ends and
    /// [`Error::CodecUnavailable`] if the codec was not compiled in.
    pub fn compress(&mut self, compression: Compression) -> Result<()> {
        compression.ensure_available()?;
        let entries = self.built_mut()?;
        let _guard = FdLimitGuard::bump(entries.len());
        for entry in entries.iter_mut() {
            entry.encode(compression)?;
        }
        log::info!("re-encoded {} entries as {}", entries.len(), compression);
        Ok(())
    }

    /// Signs the container when it is serialized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NothingBuilt`] before the first session ends.
    pub fn sign(&mut self, algorithm: SignatureAlgorithm) -> Result<()> {
        self.built_mut()?;
        self.signature = Some(algorithm);
        Ok(())
    }

    /// Returns every symbol renamed by stateful compactors so far.
    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    /// Returns the manifest of the built container.
    pub fn manifest(&self) -> Result<Manifest> {
        let entries = self.built.as_ref().ok_or(Error::NothingBuilt)?;
        let entries = entries
            .iter()
            .map(BuiltEntry::manifest_entry)
            .collect::<Result<Vec<_>>>()?;

        let mut header_flags = entries
            .iter()
            .fold(0, |acc, e| acc | (e.flags & flags::COMPRESSION_MASK));
        if self.signature.is_some() {
            header_flags |= flags::SIGNATURE;
        }
        let header = ManifestHeader {
            api_version: API_VERSION,
            flags: header_flags,
            alias: self.options.alias.clone(),
            metadata: self.options.metadata.clone(),
        };
        Ok(Manifest::new(header, entries))
    }

    /// Serializes the container, appending the signature trailer if
    /// [`sign`](Self::sign) was called.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.assemble().map(|(bytes, _)| bytes)
    }

    /// Writes the container to `path`. OpenSSL-signed containers also get
    /// their public key written to `<path>.pubkey`.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let (bytes, public_key) = self.assemble()?;
        std::fs::write(path, &bytes)?;
        if let Some(pem) = public_key {
            std::fs::write(public_key_path(path), pem)?;
        }
        log::info!("wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn assemble(&self) -> Result<(Vec<u8>, Option<String>)> {
        let manifest = self.manifest()?;
        let entries = self.built.as_ref().ok_or(Error::NothingBuilt)?;

        let stub = self.options.stub.as_bytes();
        let encoded = manifest.encode()?;
        let data_size = usize::try_from(manifest.data_size()).unwrap_or(usize::MAX);
        let mut out = Vec::with_capacity(
            stub.len()
                .saturating_add(encoded.len())
                .saturating_add(data_size)
                .saturating_add(128),
        );
        out.extend_from_slice(stub);
        out.extend_from_slice(&encoded);
        for entry in entries {
            out.extend_from_slice(&entry.stored);
        }

        let public_key = match &self.signature {
            Some(algorithm) => {
                let signed = signature::sign(&out, algorithm)?;
                out.extend_from_slice(&signed.trailer);
                signed.public_key_pem
            }
            None => None,
        };
        Ok((out, public_key))
    }
}
