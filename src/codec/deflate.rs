//! Raw deflate codec (entry flag `0x1000`).
//!
//! Entries flagged as gzip carry a bare deflate stream: no gzip member header
//! and no zlib wrapper, matching what PHP's `gzdeflate` produces.

use std::io::{self, Read, Write};

use flate2::Compression as Level;
use flate2::bufread::DeflateDecoder as FlateDecoder;
use flate2::write::DeflateEncoder as FlateEncoder;

use super::{Compression, Decoder, Encoder};

/// Raw deflate decoder.
pub struct DeflateDecoder<R> {
    inner: FlateDecoder<R>,
}

impl<R> std::fmt::Debug for DeflateDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateDecoder").finish_non_exhaustive()
    }
}

impl<R: io::BufRead + Send> DeflateDecoder<R> {
    /// Creates a new decoder reading the compressed stream from `input`.
    pub fn new(input: R) -> Self {
        Self {
            inner: FlateDecoder::new(input),
        }
    }
}

impl<R: io::BufRead + Send> Read for DeflateDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: io::BufRead + Send> Decoder for DeflateDecoder<R> {
    fn compression(&self) -> Compression {
        Compression::Gzip
    }
}

/// Deflate encoder options.
#[derive(Debug, Clone)]
pub struct DeflateEncoderOptions {
    /// Compression level (0-9). Defaults to 9, the level PHP uses for entries.
    pub level: u32,
}

impl Default for DeflateEncoderOptions {
    fn default() -> Self {
        Self { level: 9 }
    }
}

impl DeflateEncoderOptions {
    /// Creates options with the given compression level, clamped to 9.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

/// Raw deflate encoder.
pub struct DeflateEncoder<W: Write> {
    inner: FlateEncoder<W>,
}

impl<W: Write> std::fmt::Debug for DeflateEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateEncoder").finish_non_exhaustive()
    }
}

impl<W: Write + Send> DeflateEncoder<W> {
    /// Creates a new encoder writing the compressed stream to `output`.
    pub fn new(output: W, options: &DeflateEncoderOptions) -> Self {
        Self {
            inner: FlateEncoder::new(output, Level::new(options.level)),
        }
    }

    /// Finishes encoding and returns the underlying writer.
    pub fn try_finish(self) -> io::Result<W> {
        self.inner.finish()
    }
}

impl<W: Write + Send> Write for DeflateEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder for DeflateEncoder<W> {
    fn compression(&self) -> Compression {
        Compression::Gzip
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        self.inner.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_stream_roundtrip() {
        let data = "<?php echo 'deflate';\n".repeat(50);

        let mut encoder = DeflateEncoder::new(Vec::new(), &DeflateEncoderOptions::default());
        encoder.write_all(data.as_bytes()).unwrap();
        let compressed = encoder.try_finish().unwrap();
        assert!(compressed.len() < data.len());

        let mut decoder = DeflateDecoder::new(compressed.as_slice());
        let mut restored = String::new();
        decoder.read_to_string(&mut restored).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_deflate_options_clamped() {
        assert_eq!(DeflateEncoderOptions::default().level, 9);
        assert_eq!(DeflateEncoderOptions::with_level(3).level, 3);
        assert_eq!(DeflateEncoderOptions::with_level(42).level, 9);
    }

    #[test]
    fn test_truncated_stream_fails() {
        let mut encoder = DeflateEncoder::new(Vec::new(), &DeflateEncoderOptions::default());
        encoder.write_all(&[7u8; 4096]).unwrap();
        let compressed = encoder.try_finish().unwrap();

        let mut decoder = DeflateDecoder::new(&compressed[..compressed.len() / 2]);
        let mut out = Vec::new();
        assert!(decoder.read_to_end(&mut out).is_err() || out.len() < 4096);
    }

    #[test]
    fn test_decoder_reports_compression() {
        let decoder = DeflateDecoder::new(&[][..]);
        assert_eq!(decoder.compression(), Compression::Gzip);
    }
}
