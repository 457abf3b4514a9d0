//! Bounded little-endian reading over an in-memory manifest.

use crate::{Error, Result};

/// A cursor over manifest bytes that refuses to read past the end.
///
/// Every read that would overrun the buffer fails with
/// [`Error::CorruptManifest`] carrying the offset of the failed read.
#[derive(Debug, Clone)]
pub struct ManifestReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ManifestReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::corrupt_manifest(
                self.pos as u64,
                format!(
                    "{what} needs {len} bytes but only {} remain",
                    self.remaining()
                ),
            ));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.read_bytes(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16_be(&mut self, what: &str) -> Result<u16> {
        let bytes = self.read_bytes(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a `u32` length prefix followed by that many bytes.
    pub fn read_prefixed(&mut self, what: &str) -> Result<&'a [u8]> {
        let len = self.read_u32(what)? as usize;
        self.read_bytes(len, what)
    }
}

/// Appends a little-endian `u32`.
pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Appends a `u32` length prefix followed by `bytes`.
pub(crate) fn put_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        Error::ResourceLimitExceeded(format!(
            "field of {} bytes does not fit a 32-bit length",
            bytes.len()
        ))
    })?;
    put_u32(out, len);
    out.extend_from_slice(bytes);
    Ok(())
}
