//! Container signatures.
//!
//! A signed container ends with a trailer that is read backwards from the end
//! of the file:
//!
//! ```text
//! hash types:  [payload][digest (16/20/32/64)][u32 flag LE]["GBMB"]
//! OpenSSL:     [payload][signature][u32 sig length LE][u32 flag LE]["GBMB"]
//! ```
//!
//! The digest or signature covers every byte before the trailer. Verification
//! streams the payload in fixed-size chunks and never loads the whole file.
//!
//! # Example
//!
//! ```rust
//! use pharbox::signature::{self, SignatureAlgorithm};
//!
//! let payload = b"<?php __HALT_COMPILER(); ?>\r\n...".to_vec();
//! let signed = signature::sign(&payload, &SignatureAlgorithm::Sha256)?;
//!
//! let mut container = payload.clone();
//! container.extend_from_slice(&signed.trailer);
//!
//! let verification = signature::verify_bytes(&container, None)?;
//! assert_eq!(verification.hash_type, signature::HashType::Sha256);
//! # Ok::<(), pharbox::Error>(())
//! ```

pub mod key;

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

pub use key::{PublicKey, SigningKey, public_key_path};

use crate::format::SIGNATURE_MAGIC;
use crate::format::reader::put_u32;
use crate::hash::HashAlgorithm;
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Signature flag values stored in the trailer.
pub mod flags {
    /// MD5 digest.
    pub const MD5: u32 = 0x0001;
    /// SHA-1 digest.
    pub const SHA1: u32 = 0x0002;
    /// SHA-256 digest.
    pub const SHA256: u32 = 0x0003;
    /// SHA-512 digest.
    pub const SHA512: u32 = 0x0004;
    /// RSA signature.
    pub const OPENSSL: u32 = 0x0010;
}

/// Hash type recorded in a signature trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    /// MD5 digest.
    Md5,
    /// SHA-1 digest.
    Sha1,
    /// SHA-256 digest.
    Sha256,
    /// SHA-512 digest.
    Sha512,
    /// RSA PKCS#1 v1.5 signature over the SHA-1 digest of the payload.
    OpenSsl,
}

impl HashType {
    /// Returns the trailer flag.
    pub fn flag(&self) -> u32 {
        match self {
            Self::Md5 => flags::MD5,
            Self::Sha1 => flags::SHA1,
            Self::Sha256 => flags::SHA256,
            Self::Sha512 => flags::SHA512,
            Self::OpenSsl => flags::OPENSSL,
        }
    }

    /// Parses a trailer flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSignature`] for unknown flags.
    pub fn from_flag(flag: u32) -> Result<Self> {
        match flag {
            flags::MD5 => Ok(Self::Md5),
            flags::SHA1 => Ok(Self::Sha1),
            flags::SHA256 => Ok(Self::Sha256),
            flags::SHA512 => Ok(Self::Sha512),
            flags::OPENSSL => Ok(Self::OpenSsl),
            _ => Err(Error::UnsupportedSignature { flag }),
        }
    }

    /// Returns the fixed digest length, or `None` for length-prefixed
    /// OpenSSL signatures.
    pub fn digest_len(&self) -> Option<usize> {
        match self {
            Self::OpenSsl => None,
            _ => Some(self.hash_algorithm().output_len()),
        }
    }

    /// The digest computed over the payload. OpenSSL signs a SHA-1 digest.
    fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Md5 => HashAlgorithm::Md5,
            Self::Sha1 | Self::OpenSsl => HashAlgorithm::Sha1,
            Self::Sha256 => HashAlgorithm::Sha256,
            Self::Sha512 => HashAlgorithm::Sha512,
        }
    }
}

impl std::fmt::Display for HashType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
            Self::OpenSsl => "OpenSSL",
        })
    }
}

/// How to sign a container.
#[derive(Debug, Clone)]
pub enum SignatureAlgorithm {
    /// MD5 digest.
    Md5,
    /// SHA-1 digest.
    Sha1,
    /// SHA-256 digest.
    Sha256,
    /// SHA-512 digest.
    Sha512,
    /// RSA signature with the given private key.
    OpenSsl(SigningKey),
}

impl SignatureAlgorithm {
    /// Returns the hash type this algorithm records.
    pub fn hash_type(&self) -> HashType {
        match self {
            Self::Md5 => HashType::Md5,
            Self::Sha1 => HashType::Sha1,
            Self::Sha256 => HashType::Sha256,
            Self::Sha512 => HashType::Sha512,
            Self::OpenSsl(_) => HashType::OpenSsl,
        }
    }
}

/// A parsed signature trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// The hash type.
    pub hash_type: HashType,
    /// Raw digest bytes, or the RSA signature for OpenSSL.
    pub signature: Vec<u8>,
    /// Number of payload bytes covered by the signature (the trailer offset).
    pub payload_len: u64,
}

impl SignatureRecord {
    /// Returns the digest or signature as lowercase hex.
    pub fn hex(&self) -> String {
        hex::encode(&self.signature)
    }

    /// Returns the encoded trailer length.
    pub fn trailer_len(&self) -> usize {
        let prefix = if self.hash_type == HashType::OpenSsl { 4 } else { 0 };
        self.signature.len() + prefix + 8
    }

    /// Encodes the trailer bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.trailer_len());
        out.extend_from_slice(&self.signature);
        if self.hash_type == HashType::OpenSsl {
            let len = u32::try_from(self.signature.len()).map_err(|_| {
                Error::ResourceLimitExceeded("signature longer than u32::MAX".into())
            })?;
            put_u32(&mut out, len);
        }
        put_u32(&mut out, self.hash_type.flag());
        out.extend_from_slice(SIGNATURE_MAGIC);
        Ok(out)
    }
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// The hash type that was verified.
    pub hash_type: HashType,
    /// Uppercase hex of the digest or signature, as PHP reports it.
    pub hash: String,
}

/// Output of [`sign`].
#[derive(Debug, Clone)]
pub struct Signed {
    /// The record that was produced.
    pub record: SignatureRecord,
    /// Trailer bytes to append to the payload.
    pub trailer: Vec<u8>,
    /// PEM public key to persist next to the container (OpenSSL only).
    pub public_key_pem: Option<String>,
}

/// Signs `payload` and returns the trailer to append.
///
/// # Errors
///
/// Returns a signature error if the RSA backend fails or is not compiled in.
pub fn sign(payload: &[u8], algorithm: &SignatureAlgorithm) -> Result<Signed> {
    let hash_type = algorithm.hash_type();
    let digest = hash_type.hash_algorithm().digest(payload);

    let (signature, public_key_pem) = match algorithm {
        SignatureAlgorithm::OpenSsl(key) => {
            let signature = key.sign_sha1_digest(&digest)?;
            (signature, Some(key.public_key()?.to_pem()?))
        }
        _ => (digest, None),
    };

    let record = SignatureRecord {
        hash_type,
        signature,
        payload_len: payload.len() as u64,
    };
    let trailer = record.encode()?;
    log::debug!("signed {} payload bytes with {}", payload.len(), hash_type);
    Ok(Signed {
        record,
        trailer,
        public_key_pem,
    })
}

/// Reads the signature trailer of an in-memory container.
///
/// Returns `Ok(None)` when the container does not end with `GBMB`.
pub fn read_trailer(container: &[u8]) -> Result<Option<SignatureRecord>> {
    read_trailer_from(&mut Cursor::new(container))
}

/// Reads the signature trailer from the end of a seekable stream.
///
/// # Errors
///
/// Returns [`Error::UnsupportedSignature`] for unknown flags and
/// [`Error::InvalidFormat`] when the trailer is longer than the stream.
pub fn read_trailer_from<R: Read + Seek>(reader: &mut R) -> Result<Option<SignatureRecord>> {
    let total = reader.seek(SeekFrom::End(0))?;
    if total < 8 {
        return Ok(None);
    }

    let mut tail = [0u8; 8];
    reader.seek(SeekFrom::Start(total - 8))?;
    reader.read_exact(&mut tail)?;
    if &tail[4..] != SIGNATURE_MAGIC {
        return Ok(None);
    }
    let flag = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let hash_type = HashType::from_flag(flag)?;

    let (sig_len, fixed) = match hash_type.digest_len() {
        Some(len) => (len as u64, 8u64),
        None => {
            if total < 12 {
                return Err(truncated_trailer(total));
            }
            let mut len = [0u8; 4];
            reader.seek(SeekFrom::Start(total - 12))?;
            reader.read_exact(&mut len)?;
            (u64::from(u32::from_le_bytes(len)), 12u64)
        }
    };

    let payload_len = total
        .checked_sub(fixed + sig_len)
        .ok_or_else(|| truncated_trailer(total))?;
    let mut signature = vec![0u8; sig_len as usize];
    reader.seek(SeekFrom::Start(payload_len))?;
    reader.read_exact(&mut signature)?;

    Ok(Some(SignatureRecord {
        hash_type,
        signature,
        payload_len,
    }))
}

fn truncated_trailer(total: u64) -> Error {
    Error::InvalidFormat(format!(
        "signature trailer is longer than the {total}-byte container"
    ))
}

/// Verifies a container file.
///
/// For OpenSSL signatures the key is `public_key` if given, otherwise the
/// sibling `<path>.pubkey` file. The sibling is only read for OpenSSL
/// trailers.
///
/// # Errors
///
/// Returns [`Error::Unsigned`] if there is no trailer and
/// [`Error::SignatureMismatch`] if the payload does not match it.
pub fn verify_path(path: impl AsRef<Path>, public_key: Option<&PublicKey>) -> Result<Verification> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let record = read_trailer_from(&mut file)?.ok_or(Error::Unsigned)?;

    let loaded;
    let key = match public_key {
        Some(key) => Some(key),
        None if record.hash_type == HashType::OpenSsl => {
            let sibling = public_key_path(path);
            if sibling.is_file() {
                loaded = PublicKey::from_file(&sibling)?;
                Some(&loaded)
            } else {
                None
            }
        }
        None => None,
    };

    let verification = verify_record(&mut file, record, key)?;
    log::info!(
        "verified {} signature of {}",
        verification.hash_type,
        path.display()
    );
    Ok(verification)
}

/// Verifies an in-memory container.
pub fn verify_bytes(container: &[u8], public_key: Option<&PublicKey>) -> Result<Verification> {
    verify_reader(&mut Cursor::new(container), public_key)
}

/// Verifies a container read from a seekable stream.
///
/// # Errors
///
/// See [`verify_path`]. An OpenSSL signature without a key fails with
/// [`Error::InvalidKey`].
pub fn verify_reader<R: Read + Seek>(
    reader: &mut R,
    public_key: Option<&PublicKey>,
) -> Result<Verification> {
    let record = read_trailer_from(reader)?.ok_or(Error::Unsigned)?;
    verify_record(reader, record, public_key)
}

/// Checks the payload of `reader` against an already parsed trailer.
fn verify_record<R: Read + Seek>(
    reader: &mut R,
    record: SignatureRecord,
    public_key: Option<&PublicKey>,
) -> Result<Verification> {
    let digest = digest_prefix(reader, record.hash_type.hash_algorithm(), record.payload_len)?;

    match record.hash_type {
        HashType::OpenSsl => {
            let key = public_key.ok_or_else(|| {
                Error::InvalidKey("OpenSSL signature requires a public key".into())
            })?;
            key.verify_sha1_digest(&digest, &record.signature)?;
        }
        hash_type => {
            let stored = record.hex();
            if !hex::encode(&digest).eq_ignore_ascii_case(&stored) {
                return Err(Error::SignatureMismatch { hash_type });
            }
        }
    }

    Ok(Verification {
        hash_type: record.hash_type,
        hash: record.hex().to_ascii_uppercase(),
    })
}

/// Hashes the first `len` bytes of `reader` in chunks.
fn digest_prefix<R: Read + Seek>(
    reader: &mut R,
    algorithm: HashAlgorithm,
    len: u64,
) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(0))?;
    let mut hasher = algorithm.hasher();
    let mut remaining = len;
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        reader.read_exact(&mut buffer[..want])?;
        hasher.update(&buffer[..want]);
        remaining -= want as u64;
    }
    Ok(hasher.finalize())
}
