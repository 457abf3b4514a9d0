//! Options for opening and extracting containers.

use crate::format::StubPattern;

pub use crate::safety::PathSafety;

/// Options for [`extract`](super::extract) and [`Archive::extract`](super::Archive::extract).
///
/// # Example
///
/// ```rust
/// use pharbox::read::{ExtractOptions, PathSafety};
///
/// let options = ExtractOptions::new()
///     .path_safety(PathSafety::Relaxed)
///     .fingerprint(false);
/// assert!(!options.fingerprint);
/// ```
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Boundary that ends the stub.
    pub stub_pattern: StubPattern,
    /// Path validation policy.
    pub path_safety: PathSafety,
    /// Write a `<md5>` marker after extraction and skip work when it exists.
    pub fingerprint: bool,
    /// Apply entry permission bits to extracted files (Unix only).
    pub preserve_permissions: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            stub_pattern: StubPattern::Open,
            path_safety: PathSafety::Strict,
            fingerprint: true,
            preserve_permissions: true,
        }
    }
}

impl ExtractOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stub boundary pattern.
    pub fn stub_pattern(mut self, pattern: StubPattern) -> Self {
        self.stub_pattern = pattern;
        self
    }

    /// Sets the path safety policy.
    pub fn path_safety(mut self, policy: PathSafety) -> Self {
        self.path_safety = policy;
        self
    }

    /// Enables or disables the fingerprint marker.
    pub fn fingerprint(mut self, enabled: bool) -> Self {
        self.fingerprint = enabled;
        self
    }

    /// Enables or disables applying permission bits.
    pub fn preserve_permissions(mut self, enabled: bool) -> Self {
        self.preserve_permissions = enabled;
        self
    }
}
