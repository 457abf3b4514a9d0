//! Container format constants, definitions, and low-level parsing utilities.
//!
//! A container is laid out as:
//!
//! ```text
//! +---------------------------+
//! | stub                      |  ends with `__HALT_COMPILER(); ?>\r\n`
//! +---------------------------+
//! | u32 manifest length       |
//! | manifest header           |  count, API version, flags, alias, metadata
//! | file entry records        |
//! +---------------------------+
//! | data blob                 |  entry payloads, in manifest order
//! +---------------------------+
//! | signature trailer         |  optional, ends with `GBMB`
//! +---------------------------+
//! ```
//!
//! All integers are little-endian except the API version, which is stored
//! big-endian.

pub mod manifest;
pub mod reader;
pub mod stub;

pub use manifest::{FileEntry, Manifest, ManifestHeader};
pub use stub::{Stub, StubPattern, find_stub_length, find_stub_length_in};

/// The call that ends the bootstrap code of every stub.
pub const HALT_COMPILER: &[u8] = b"__HALT_COMPILER();";

/// Default stub boundary pattern.
pub const PATTERN_DEFAULT: &[u8] = b"__HALT_COMPILER(); ?>";

/// Stub boundary pattern including the line break written after the stub.
pub const PATTERN_OPEN: &[u8] = b"__HALT_COMPILER(); ?>\r\n";

/// Magic bytes that end a signed container.
pub const SIGNATURE_MAGIC: &[u8; 4] = b"GBMB";

/// Manifest API version written by this crate (1.1.1).
pub const API_VERSION: u16 = 0x1110;

/// Name of the entry inserted into containers built without files.
pub const EMPTY_PLACEHOLDER_PATH: &str = ".box_empty";

/// Contents of the entry inserted into containers built without files.
pub const EMPTY_PLACEHOLDER_CONTENTS: &[u8] =
    b"A PHAR cannot be empty so Box adds this file to ensure the PHAR is created still.";
