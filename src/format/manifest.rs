//! Binary manifest encoding and decoding.
//!
//! The manifest follows the stub and indexes every entry of the data blob:
//!
//! ```text
//! u32 manifest length (bytes that follow, excluding this field)
//! u32 entry count
//! u16 API version (big-endian)
//! u32 global flags
//! u32 alias length,    alias bytes
//! u32 metadata length, metadata bytes
//! entry record *
//!     u32 path length, path bytes
//!     u32 uncompressed size
//!     u32 timestamp
//!     u32 compressed size
//!     u32 CRC-32
//!     u32 flags
//!     u32 metadata length, metadata bytes
//! ```
//!
//! Entry payload offsets are not stored: each is the running sum of the
//! compressed sizes of the entries before it.

use super::reader::{ManifestReader, put_prefixed, put_u32};
use crate::codec::{Compression, flags};
use crate::format::API_VERSION;
use crate::{Error, Result};

/// Header fields that precede the entry records.
///
/// The header is carried through decode and encode unchanged, so a container
/// produced elsewhere keeps its alias, metadata and flags byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestHeader {
    /// Manifest API version.
    pub api_version: u16,
    /// Global flags as stored.
    pub flags: u32,
    /// Container alias.
    pub alias: Vec<u8>,
    /// Opaque container metadata.
    pub metadata: Vec<u8>,
}

impl Default for ManifestHeader {
    fn default() -> Self {
        Self {
            api_version: API_VERSION,
            flags: 0,
            alias: Vec::new(),
            metadata: Vec::new(),
        }
    }
}

/// A single manifest record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the container root. Directories end with `/`.
    pub path: String,
    /// Uncompressed size in bytes.
    pub size: u32,
    /// Modification time as a Unix timestamp.
    pub timestamp: u32,
    /// Stored (compressed) size in bytes.
    pub compressed_size: u32,
    /// CRC-32 of the uncompressed contents.
    pub crc32: u32,
    /// Compression bits and Unix permission bits.
    pub flags: u32,
    /// Opaque per-entry metadata.
    pub metadata: Vec<u8>,
    /// Offset of the payload inside the data blob.
    pub offset: u64,
}

impl FileEntry {
    /// Returns the compression selected by this entry's flags.
    pub fn compression(&self) -> Result<Compression> {
        Compression::from_flags(self.flags)
    }

    /// Returns the Unix permission bits.
    pub fn permissions(&self) -> u32 {
        self.flags & flags::PERMISSION_MASK
    }

    /// Returns `true` for directory records.
    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Length of the per-entry metadata.
    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }
}

/// The ordered index of a container's entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    header: ManifestHeader,
    entries: Vec<FileEntry>,
}

impl Manifest {
    /// Creates a manifest, recomputing every entry offset from the entry order.
    pub fn new(header: ManifestHeader, mut entries: Vec<FileEntry>) -> Self {
        let mut offset = 0u64;
        for entry in &mut entries {
            entry.offset = offset;
            offset += u64::from(entry.compressed_size);
        }
        Self { header, entries }
    }

    /// Returns the header.
    pub fn header(&self) -> &ManifestHeader {
        &self.header
    }

    /// Returns the entries in container order.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Consumes the manifest and returns its parts.
    pub fn into_parts(self) -> (ManifestHeader, Vec<FileEntry>) {
        (self.header, self.entries)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union of every entry's compression bits.
    pub fn flags(&self) -> u32 {
        self.entries
            .iter()
            .fold(0, |acc, e| acc | (e.flags & flags::COMPRESSION_MASK))
    }

    /// Total size of the data blob.
    pub fn data_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| u64::from(e.compressed_size))
            .sum()
    }

    /// Looks up an entry by path.
    pub fn find(&self, path: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Encodes the manifest, including its 4-byte length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceLimitExceeded`] when a field or the whole
    /// manifest does not fit a 32-bit length.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(64 + self.entries.len() * 64);
        let count = u32::try_from(self.entries.len())
            .map_err(|_| Error::ResourceLimitExceeded("too many entries".into()))?;
        put_u32(&mut body, count);
        body.extend_from_slice(&self.header.api_version.to_be_bytes());
        put_u32(&mut body, self.header.flags);
        put_prefixed(&mut body, &self.header.alias)?;
        put_prefixed(&mut body, &self.header.metadata)?;

        for entry in &self.entries {
            put_prefixed(&mut body, entry.path.as_bytes())?;
            put_u32(&mut body, entry.size);
            put_u32(&mut body, entry.timestamp);
            put_u32(&mut body, entry.compressed_size);
            put_u32(&mut body, entry.crc32);
            put_u32(&mut body, entry.flags);
            put_prefixed(&mut body, &entry.metadata)?;
        }

        let mut out = Vec::with_capacity(body.len() + 4);
        put_prefixed(&mut out, &body)?;
        Ok(out)
    }

    /// Decodes a manifest starting at its 4-byte length prefix.
    ///
    /// Returns the manifest and the number of bytes consumed (prefix
    /// included), i.e. the offset of the data blob relative to `data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptManifest`] on truncated input, on a length
    /// field that overruns the buffer, on a non-UTF-8 path, or when the
    /// declared entry count does not match the records present.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut outer = ManifestReader::new(data);
        let body = outer.read_prefixed("manifest")?;
        let consumed = outer.position();

        let mut reader = ManifestReader::new(body);
        let count = reader.read_u32("entry count")?;
        let header = ManifestHeader {
            api_version: reader.read_u16_be("API version")?,
            flags: reader.read_u32("global flags")?,
            alias: reader.read_prefixed("alias")?.to_vec(),
            metadata: reader.read_prefixed("metadata")?.to_vec(),
        };

        // Each record takes at least 28 bytes; reject absurd counts before allocating.
        if count as usize > reader.remaining() / 28 + 1 {
            return Err(Error::corrupt_manifest(
                4,
                format!(
                    "entry count {count} exceeds what {} bytes can hold",
                    reader.remaining()
                ),
            ));
        }

        let mut entries = Vec::with_capacity(count as usize);
        let mut offset = 0u64;
        for _ in 0..count {
            let path_start = reader.position();
            let path = reader.read_prefixed("entry path")?;
            let path = String::from_utf8(path.to_vec()).map_err(|_| {
                Error::corrupt_manifest(path_start as u64 + 4, "entry path is not valid UTF-8")
            })?;
            let size = reader.read_u32("uncompressed size")?;
            let timestamp = reader.read_u32("timestamp")?;
            let compressed_size = reader.read_u32("compressed size")?;
            let crc32 = reader.read_u32("CRC-32")?;
            let entry_flags = reader.read_u32("entry flags")?;
            let metadata = reader.read_prefixed("entry metadata")?.to_vec();

            entries.push(FileEntry {
                path,
                size,
                timestamp,
                compressed_size,
                crc32,
                flags: entry_flags,
                metadata,
                offset,
            });
            offset += u64::from(compressed_size);
        }

        if reader.remaining() != 0 {
            return Err(Error::corrupt_manifest(
                reader.position() as u64,
                format!(
                    "{} unexpected bytes after {count} entries",
                    reader.remaining()
                ),
            ));
        }

        Ok((Self { header, entries }, consumed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::crc32;

    fn entry(path: &str, contents: &[u8], compressed_size: u32, entry_flags: u32) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size: contents.len() as u32,
            timestamp: 1_700_000_000,
            compressed_size,
            crc32: crc32(contents),
            flags: entry_flags,
            metadata: Vec::new(),
            offset: 0,
        }
    }

    #[test]
    fn test_empty_roundtrip() {
        let manifest = Manifest::new(ManifestHeader::default(), Vec::new());
        let bytes = manifest.encode().unwrap();
        let (decoded, consumed) = Manifest::decode(&bytes).unwrap();
        assert_eq!(decoded, manifest);
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.flags(), 0);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_single_entry_roundtrip() {
        let manifest = Manifest::new(
            ManifestHeader::default(),
            vec![entry("a.php", b"<?php echo 1;", 13, 0o644)],
        );
        let bytes = manifest.encode().unwrap();
        let (decoded, _) = Manifest::decode(&bytes).unwrap();
        assert_eq!(decoded, manifest);
        assert_eq!(decoded.entries()[0].permissions(), 0o644);
    }

    #[test]
    fn test_mixed_flags_offsets_and_union() {
        let header = ManifestHeader {
            api_version: 0x1110,
            flags: 0x0001_3000,
            alias: b"app.phar".to_vec(),
            metadata: b"a:1:{s:3:\"key\";i:1;}".to_vec(),
        };
        let mut first = entry("src/a.php", b"aaaa", 10, flags::GZIP | 0o644);
        first.metadata = b"meta".to_vec();
        let manifest = Manifest::new(
            header,
            vec![
                first,
                entry("src/b.php", b"bbbb", 20, 0o644),
                entry("res/c.json", b"cccc", 5, flags::BZIP2 | 0o600),
                entry("res/", b"", 0, 0o755),
            ],
        );

        let bytes = manifest.encode().unwrap();
        let (decoded, _) = Manifest::decode(&bytes).unwrap();
        assert_eq!(decoded, manifest);

        let offsets: Vec<u64> = decoded.entries().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, [0, 10, 30, 35]);
        assert_eq!(decoded.flags(), flags::GZIP | flags::BZIP2);
        assert_eq!(decoded.data_size(), 35);
        assert_eq!(decoded.header().alias, b"app.phar");
        assert!(decoded.find("res/").unwrap().is_directory());
    }

    #[test]
    fn test_length_prefix_counts_body() {
        let manifest = Manifest::new(
            ManifestHeader::default(),
            vec![entry("x", b"1", 1, 0)],
        );
        let bytes = manifest.encode().unwrap();
        let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(declared + 4, bytes.len());
        // count, then big-endian API version
        assert_eq!(&bytes[4..8], &[1, 0, 0, 0]);
        assert_eq!(&bytes[8..10], &[0x11, 0x10]);
    }

    #[test]
    fn test_truncated_input_fails() {
        let manifest = Manifest::new(
            ManifestHeader::default(),
            vec![entry("a.php", b"<?php", 5, 0)],
        );
        let bytes = manifest.encode().unwrap();
        for cut in [0, 3, 10, bytes.len() - 1] {
            let err = Manifest::decode(&bytes[..cut]).unwrap_err();
            assert!(err.is_format_error(), "cut at {cut}: {err}");
        }
    }

    #[test]
    fn test_overrunning_path_length_fails() {
        let manifest = Manifest::new(
            ManifestHeader::default(),
            vec![entry("a.php", b"<?php", 5, 0)],
        );
        let mut bytes = manifest.encode().unwrap();
        // Path length field follows: prefix(4) count(4) api(2) flags(4) alias(4) meta(4).
        let path_len_at = 22;
        bytes[path_len_at..path_len_at + 4].copy_from_slice(&0xFFFFu32.to_le_bytes());
        let err = Manifest::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::CorruptManifest { .. }));
    }

    #[test]
    fn test_count_mismatch_fails() {
        let manifest = Manifest::new(
            ManifestHeader::default(),
            vec![entry("a", b"1", 1, 0), entry("b", b"2", 1, 0)],
        );
        let mut bytes = manifest.encode().unwrap();
        bytes[4..8].copy_from_slice(&1u32.to_le_bytes());
        let err = Manifest::decode(&bytes).unwrap_err();
        assert!(err.is_format_error());
    }
}
