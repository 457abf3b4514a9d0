//! Streaming content hashes.
//!
//! One entry point for every digest the engine needs: signature trailers
//! (MD5, SHA-1, SHA-256, SHA-512), extraction fingerprints (MD5) and the
//! differ (SHA-384 by default, any of the above, or CRC-32).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::checksum::{Checksum, Crc32};
use crate::{READ_BUFFER_SIZE, Result};

/// A content hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// MD5 (128 bits).
    Md5,
    /// SHA-1 (160 bits).
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    #[default]
    Sha384,
    /// SHA-512.
    Sha512,
    /// CRC-32, rendered as its unsigned decimal value rather than hex.
    Crc32,
}

impl HashAlgorithm {
    /// All algorithms.
    pub const ALL: [HashAlgorithm; 6] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Crc32,
    ];

    /// Parses a PHP-style algorithm name (`md5`, `sha1`, `sha384`, `crc32`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            "crc32" | "crc32b" => Some(Self::Crc32),
            _ => None,
        }
    }

    /// Returns the digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
            Self::Crc32 => 4,
        }
    }

    /// Creates an incremental hasher.
    pub fn hasher(&self) -> Hasher {
        match self {
            Self::Md5 => Hasher::Md5(Md5::new()),
            Self::Sha1 => Hasher::Sha1(Sha1::new()),
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
            Self::Sha384 => Hasher::Sha384(Sha384::new()),
            Self::Sha512 => Hasher::Sha512(Sha512::new()),
            Self::Crc32 => Hasher::Crc32(Crc32::new()),
        }
    }

    /// Hashes a byte slice.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Hashes everything `reader` yields, in fixed-size chunks.
    pub fn digest_reader<R: Read>(&self, reader: &mut R) -> Result<Vec<u8>> {
        let mut hasher = self.hasher();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }

    /// Returns the printable digest of a file.
    ///
    /// CRC-32 is printed as an unsigned decimal, everything else as lowercase
    /// hex.
    pub fn hash_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let mut file = File::open(path.as_ref())?;
        let digest = self.digest_reader(&mut file)?;
        Ok(self.render(&digest))
    }

    /// Renders a digest produced by this algorithm.
    pub fn render(&self, digest: &[u8]) -> String {
        match self {
            Self::Crc32 if digest.len() == 4 => {
                u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]).to_string()
            }
            _ => hex::encode(digest),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Crc32 => "crc32",
        })
    }
}

/// An in-progress hash computation.
#[derive(Clone)]
pub enum Hasher {
    /// MD5 state.
    Md5(Md5),
    /// SHA-1 state.
    Sha1(Sha1),
    /// SHA-256 state.
    Sha256(Sha256),
    /// SHA-384 state.
    Sha384(Sha384),
    /// SHA-512 state.
    Sha512(Sha512),
    /// CRC-32 state.
    Crc32(Crc32),
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Hasher").finish_non_exhaustive()
    }
}

impl Hasher {
    /// Feeds more data.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Crc32(h) => Checksum::update(h, data),
        }
    }

    /// Returns the digest bytes. CRC-32 is returned big-endian.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Md5(h) => h.finalize().to_vec(),
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
            Self::Crc32(h) => Checksum::finalize(&h).to_be_bytes().to_vec(),
        }
    }
}
