//! Per-entry compression for container data.
//!
//! Each manifest entry is stored either verbatim, as a raw deflate stream
//! (no zlib or gzip framing), or as a standard bzip2 stream. The algorithm is
//! recorded in the entry's flag bits (see [`flags`]).
//!
//! Codecs are behind cargo features. Asking for a codec that was not compiled
//! in fails with [`Error::CodecUnavailable`]; there is no silent fallback to
//! storing data uncompressed.

#[cfg(feature = "deflate")]
pub mod deflate;

#[cfg(feature = "bzip2")]
pub mod bzip2;

use std::io::{self, Read, Write};

use crate::{Error, Result};

/// A decoder that reads compressed data and produces uncompressed output.
pub trait Decoder: Read + Send {
    /// Returns the compression this decoder reverses.
    fn compression(&self) -> Compression;
}

/// An encoder that takes uncompressed data and produces compressed output.
pub trait Encoder: Write + Send {
    /// Returns the compression this encoder applies.
    fn compression(&self) -> Compression;

    /// Finishes encoding and flushes any remaining data.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

#[cfg(feature = "deflate")]
pub use deflate::{DeflateDecoder, DeflateEncoder, DeflateEncoderOptions};

#[cfg(feature = "bzip2")]
pub use bzip2::{Bzip2Decoder, Bzip2Encoder, Bzip2EncoderOptions};

/// Entry flag bits.
pub mod flags {
    /// Entry data is a raw deflate stream.
    pub const GZIP: u32 = 0x0000_1000;
    /// Entry data is a bzip2 stream.
    pub const BZIP2: u32 = 0x0000_2000;
    /// All compression bits.
    pub const COMPRESSION_MASK: u32 = GZIP | BZIP2;
    /// Unix permission bits stored in the low bits of an entry's flags.
    pub const PERMISSION_MASK: u32 = 0o777;
    /// Global header flag marking a signed container.
    pub const SIGNATURE: u32 = 0x0001_0000;
}

/// Compression algorithm of a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// Stored verbatim.
    #[default]
    None,
    /// Raw deflate (flag `0x1000`).
    Gzip,
    /// Bzip2 (flag `0x2000`).
    Bzip2,
}

impl Compression {
    /// All algorithms, in flag order.
    pub const ALL: [Compression; 3] = [Compression::None, Compression::Gzip, Compression::Bzip2];

    /// Returns the entry flag bit for this algorithm (`0` for [`Compression::None`]).
    pub fn flag(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Gzip => flags::GZIP,
            Self::Bzip2 => flags::BZIP2,
        }
    }

    /// Reads the algorithm from an entry's flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when both compression bits are set.
    pub fn from_flags(entry_flags: u32) -> Result<Self> {
        match entry_flags & flags::COMPRESSION_MASK {
            0 => Ok(Self::None),
            flags::GZIP => Ok(Self::Gzip),
            flags::BZIP2 => Ok(Self::Bzip2),
            other => Err(Error::InvalidFormat(format!(
                "entry flags {other:#x} select more than one compression"
            ))),
        }
    }

    /// Returns whether this codec is available in the current build.
    ///
    /// ```
    /// use pharbox::codec::Compression;
    ///
    /// assert!(Compression::None.is_available());
    /// if Compression::Bzip2.is_available() {
    ///     println!("bzip2 compression is available");
    /// }
    /// ```
    pub fn is_available(&self) -> bool {
        match self {
            Self::None => true,
            Self::Gzip => cfg!(feature = "deflate"),
            Self::Bzip2 => cfg!(feature = "bzip2"),
        }
    }

    /// Returns the feature flag name required for this codec, if any.
    pub fn required_feature(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some("deflate"),
            Self::Bzip2 => Some("bzip2"),
        }
    }

    /// Fails with [`Error::CodecUnavailable`] if the codec was not compiled in.
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(self.unavailable())
        }
    }

    fn unavailable(&self) -> Error {
        Error::CodecUnavailable {
            compression: *self,
            feature: self.required_feature().unwrap_or("default"),
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        })
    }
}

/// Builds a decoder over `input` for the given compression.
///
/// # Errors
///
/// Returns [`Error::CodecUnavailable`] if the codec is not compiled in.
pub fn build_decoder<'a>(
    input: &'a [u8],
    compression: Compression,
) -> Result<Box<dyn Decoder + 'a>> {
    compression.ensure_available()?;
    match compression {
        Compression::None => Ok(Box::new(StoredDecoder { inner: input })),
        #[cfg(feature = "deflate")]
        Compression::Gzip => Ok(Box::new(DeflateDecoder::new(input))),
        #[cfg(feature = "bzip2")]
        Compression::Bzip2 => Ok(Box::new(Bzip2Decoder::new(input))),
        #[allow(unreachable_patterns)]
        other => Err(Error::CodecUnavailable {
            compression: other,
            feature: other.required_feature().unwrap_or("default"),
        }),
    }
}

/// Builds an encoder writing into `output` for the given compression.
///
/// # Errors
///
/// Returns [`Error::CodecUnavailable`] if the codec is not compiled in.
pub fn build_encoder<'a>(
    output: &'a mut Vec<u8>,
    compression: Compression,
) -> Result<Box<dyn Encoder + 'a>> {
    compression.ensure_available()?;
    match compression {
        Compression::None => Ok(Box::new(StoredEncoder { inner: output })),
        #[cfg(feature = "deflate")]
        Compression::Gzip => Ok(Box::new(DeflateEncoder::new(
            output,
            &DeflateEncoderOptions::default(),
        ))),
        #[cfg(feature = "bzip2")]
        Compression::Bzip2 => Ok(Box::new(Bzip2Encoder::new(
            output,
            &Bzip2EncoderOptions::default(),
        ))),
        #[allow(unreachable_patterns)]
        other => Err(Error::CodecUnavailable {
            compression: other,
            feature: other.required_feature().unwrap_or("default"),
        }),
    }
}

/// Compresses `data` with the given algorithm.
///
/// # Errors
///
/// Returns [`Error::CodecUnavailable`] if the codec is not compiled in, or an
/// I/O error if the encoder fails.
pub fn compress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    if compression == Compression::None {
        return Ok(data.to_vec());
    }
    let mut output = Vec::with_capacity(data.len() / 2 + 64);
    {
        let mut encoder = build_encoder(&mut output, compression)?;
        encoder.write_all(data)?;
        encoder.finish()?;
    }
    Ok(output)
}

/// Decompresses `data` with the given algorithm.
///
/// `expected_size` is the declared uncompressed size; it pre-sizes the output
/// and bounds how much is read, so a stream that inflates past it returns
/// `expected_size + 1` bytes and the caller's size check fails.
///
/// # Errors
///
/// Returns [`Error::CodecUnavailable`] if the codec is not compiled in, or
/// [`Error::InvalidFormat`] for a malformed stream.
pub fn decompress(data: &[u8], compression: Compression, expected_size: u64) -> Result<Vec<u8>> {
    let decoder = build_decoder(data, compression)?;
    let capacity = usize::try_from(expected_size)
        .unwrap_or(usize::MAX)
        .min(64 * 1024 * 1024);
    let mut output = Vec::with_capacity(capacity);
    decoder
        .take(expected_size.saturating_add(1))
        .read_to_end(&mut output)
        .map_err(|e| Error::InvalidFormat(format!("corrupt {compression} stream: {e}")))?;
    Ok(output)
}

/// Passes stored entry data through unchanged.
struct StoredDecoder<'a> {
    inner: &'a [u8],
}

impl Read for StoredDecoder<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Decoder for StoredDecoder<'_> {
    fn compression(&self) -> Compression {
        Compression::None
    }
}

struct StoredEncoder<'a> {
    inner: &'a mut Vec<u8>,
}

impl Write for StoredEncoder<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Encoder for StoredEncoder<'_> {
    fn compression(&self) -> Compression {
        Compression::None
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}
