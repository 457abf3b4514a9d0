//! Stub handling: the bootstrap bytes that precede the manifest.

use std::collections::VecDeque;
use std::io::{BufReader, Read};

use super::{HALT_COMPILER, PATTERN_DEFAULT, PATTERN_OPEN};
use crate::{Error, Result};

/// The boundary searched for when locating the end of a stub.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StubPattern {
    /// `__HALT_COMPILER(); ?>`
    Default,
    /// `__HALT_COMPILER(); ?>` followed by `\r\n`, as written by [`Stub`].
    #[default]
    Open,
    /// A caller-chosen boundary.
    Custom(Vec<u8>),
}

impl StubPattern {
    /// Returns the pattern bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Default => PATTERN_DEFAULT,
            Self::Open => PATTERN_OPEN,
            Self::Custom(bytes) => bytes,
        }
    }
}

/// Returns the stub length: the offset just past the first occurrence of
/// `pattern` in `data`.
///
/// # Errors
///
/// Returns [`Error::StubNotFound`] when the pattern does not occur, and
/// [`Error::InvalidFormat`] for an empty pattern.
pub fn find_stub_length(data: &[u8], pattern: &StubPattern) -> Result<u64> {
    find_stub_length_in(data, pattern)
}

/// Scans `reader` byte by byte for `pattern` and returns the offset just past
/// its first occurrence.
///
/// # Errors
///
/// Returns [`Error::StubNotFound`] when EOF is reached first.
pub fn find_stub_length_in<R: Read>(reader: R, pattern: &StubPattern) -> Result<u64> {
    let needle = pattern.as_bytes();
    if needle.is_empty() {
        return Err(Error::InvalidFormat("empty stub pattern".into()));
    }

    let mut window: VecDeque<u8> = VecDeque::with_capacity(needle.len());
    let mut scanned = 0u64;
    for byte in BufReader::new(reader).bytes() {
        let byte = byte?;
        scanned += 1;
        if window.len() == needle.len() {
            window.pop_front();
        }
        window.push_back(byte);
        if window.len() == needle.len() && window.iter().eq(needle.iter()) {
            return Ok(scanned);
        }
    }

    Err(Error::StubNotFound {
        pattern: String::from_utf8_lossy(needle).into_owned(),
        scanned,
    })
}

/// Bootstrap code written in front of the manifest.
///
/// Stubs are normalized the way PHP writes them: whatever follows
/// `__HALT_COMPILER();` is replaced by ` ?>\r\n`, so every written stub ends
/// with [`StubPattern::Open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    data: Vec<u8>,
}

impl Default for Stub {
    fn default() -> Self {
        Self {
            data: b"<?php\n\n__HALT_COMPILER(); ?>\r\n".to_vec(),
        }
    }
}

impl Stub {
    /// Creates a stub from raw bootstrap code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the code does not contain
    /// `__HALT_COMPILER();`.
    pub fn new(code: impl Into<Vec<u8>>) -> Result<Self> {
        let mut data = code.into();
        let Some(halt_at) = data
            .windows(HALT_COMPILER.len())
            .position(|w| w == HALT_COMPILER)
        else {
            return Err(Error::InvalidFormat(
                "stub does not contain __HALT_COMPILER();".into(),
            ));
        };

        // Anything after the halt call, including a closing tag, is rewritten.
        data.truncate(halt_at + HALT_COMPILER.len());
        data.extend_from_slice(b" ?>\r\n");
        Ok(Self { data })
    }

    /// Loads a stub from a file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::new(data)
    }

    /// Loads a stub from a reader.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::new(data)
    }

    /// Returns the normalized stub bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the size of the stub in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
