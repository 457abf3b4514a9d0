//! Checksum computation utilities.
//!
//! Every manifest entry stores the CRC-32 (IEEE 802.3 polynomial) of its
//! uncompressed contents. Readers written for this container format compare
//! the checksum as the decimal rendering of the unsigned 32-bit value, and
//! [`verify_crc32`] follows that convention.
//!
//! # Example
//!
//! ```rust
//! use pharbox::checksum::{Checksum, Crc32};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"Hello, ");
//! crc.update(b"World!");
//! assert_eq!(crc.finalize(), Crc32::compute(b"Hello, World!"));
//! ```

use std::io::{self, Read};

use crate::{Error, READ_BUFFER_SIZE, Result};

/// Common trait for checksum computation.
pub trait Checksum: Default + Clone {
    /// The output type of this checksum.
    type Output: Copy + Eq + std::fmt::Debug;

    /// Creates a new checksum calculator.
    fn new() -> Self;

    /// Updates the checksum with additional data.
    fn update(&mut self, data: &[u8]);

    /// Finishes the checksum computation and returns the value.
    fn finalize(&self) -> Self::Output;

    /// Resets the checksum to its initial state.
    fn reset(&mut self);

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Computes the checksum by reading from a reader.
    fn compute_reader<R: Read>(reader: &mut R) -> io::Result<Self::Output> {
        let mut hasher = Self::new();
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
}

/// CRC-32 checksum calculator.
///
/// ```rust
/// use pharbox::checksum::{Checksum, Crc32};
///
/// assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
/// ```
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.hasher.clone().finalize())
            .finish()
    }
}

impl Checksum for Crc32 {
    type Output = u32;

    fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn reset(&mut self) {
        self.hasher.reset();
    }
}

/// Computes the CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    Crc32::compute(data)
}

/// Checks `data` against the checksum stored for entry `entry_index`.
///
/// Both sides are rendered as unsigned decimal strings before comparison.
///
/// # Errors
///
/// Returns [`Error::CrcMismatch`] when the values differ.
pub fn verify_crc32(
    entry_index: usize,
    entry_name: &str,
    data: &[u8],
    expected: u32,
) -> Result<()> {
    let actual = crc32(data);
    if actual.to_string() == expected.to_string() {
        Ok(())
    } else {
        Err(Error::crc_mismatch(
            entry_index,
            Some(entry_name.to_string()),
            expected,
            actual,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(crc32(b"Hello, World!"), 0xEC4AC3D0);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_crc32_incremental_matches_oneshot() {
        let mut crc = Crc32::new();
        crc.update(b"<?php ");
        crc.update(b"echo 1;");
        assert_eq!(crc.finalize(), crc32(b"<?php echo 1;"));

        crc.reset();
        assert_eq!(crc.finalize(), 0);
    }

    #[test]
    fn test_crc32_reader() {
        let data = vec![0xA5u8; READ_BUFFER_SIZE * 3 + 7];
        let value = Crc32::compute_reader(&mut Cursor::new(&data)).unwrap();
        assert_eq!(value, crc32(&data));
    }

    #[test]
    fn test_verify_crc32() {
        let data = b"hi";
        assert!(verify_crc32(0, "b/c.txt", data, crc32(data)).is_ok());

        let err = verify_crc32(1, "b/c.txt", data, crc32(data) ^ 1).unwrap_err();
        assert!(matches!(err, Error::CrcMismatch { entry_index: 1, .. }));
    }

    #[test]
    fn test_high_bit_checksum_compares_unsigned() {
        // Find a payload whose CRC has the top bit set; it must still verify.
        let data = (0u32..)
            .map(|i| i.to_le_bytes())
            .find(|bytes| crc32(bytes) & 0x8000_0000 != 0)
            .unwrap();
        assert!(verify_crc32(0, "x", &data, crc32(&data)).is_ok());
    }
}
