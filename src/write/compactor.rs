//! Content compactors applied to files before they are packed.
//!
//! A [`Compactor`] pairs a path predicate with a transformation. A
//! [`Compactors`] chain runs every compactor whose predicate accepts the path,
//! in registration order. Compactors are immutable and shared between worker
//! threads; the only mutable state, renamed symbols, is threaded through an
//! explicit [`SymbolRegistry`] owned by the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::bytes::{Captures, Regex};

use crate::{Error, Result};

/// A content transformation selected by path.
pub trait Compactor: Send + Sync + fmt::Debug {
    /// Returns `true` if this compactor handles `path`.
    fn supports(&self, path: &str) -> bool;

    /// Transforms `contents`, recording renamed symbols in `registry`.
    fn compact(&self, path: &str, contents: &[u8], registry: &mut SymbolRegistry)
    -> Result<Vec<u8>>;

    /// Returns `true` for stages that rename symbols and therefore produce a
    /// registry worth merging across workers.
    fn is_stateful(&self) -> bool {
        false
    }
}

/// An ordered chain of compactors.
///
/// Cloning is cheap and yields a snapshot that can be handed to workers.
#[derive(Debug, Clone, Default)]
pub struct Compactors {
    chain: Vec<Arc<dyn Compactor>>,
}

impl Compactors {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a compactor and returns the chain.
    pub fn with(mut self, compactor: impl Compactor + 'static) -> Self {
        self.push(compactor);
        self
    }

    /// Appends a compactor.
    pub fn push(&mut self, compactor: impl Compactor + 'static) {
        self.chain.push(Arc::new(compactor));
    }

    /// Number of registered compactors.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns `true` if no compactor is registered.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Returns `true` if any stage renames symbols.
    pub fn is_stateful(&self) -> bool {
        self.chain.iter().any(|c| c.is_stateful())
    }

    /// Runs every supporting compactor over `contents`, in order.
    pub fn compact(
        &self,
        path: &str,
        contents: Vec<u8>,
        registry: &mut SymbolRegistry,
    ) -> Result<Vec<u8>> {
        let mut contents = contents;
        for compactor in self.chain.iter().filter(|c| c.supports(path)) {
            contents = compactor.compact(path, &contents, registry)?;
            log::debug!("compacted {path} with {compactor:?}");
        }
        Ok(contents)
    }
}

/// Symbols renamed by a compaction stage, keyed by original name.
///
/// Merging is a deduplicating union, so registries from independent workers
/// can be combined in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolRegistry {
    symbols: BTreeMap<String, String>,
}

impl SymbolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `original` was renamed to `prefixed`.
    pub fn record(&mut self, original: impl Into<String>, prefixed: impl Into<String>) {
        self.symbols.insert(original.into(), prefixed.into());
    }

    /// Returns the renamed form of `original`.
    pub fn get(&self, original: &str) -> Option<&str> {
        self.symbols.get(original).map(String::as_str)
    }

    /// Returns `true` if `original` was recorded.
    pub fn contains(&self, original: &str) -> bool {
        self.symbols.contains_key(original)
    }

    /// Number of distinct symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterates `(original, prefixed)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.symbols.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Adds every symbol of `other`.
    pub fn merge(&mut self, other: SymbolRegistry) {
        self.symbols.extend(other.symbols);
    }
}

/// Strips comments and collapses whitespace in PHP sources.
///
/// Line numbers are preserved: every removed newline inside a comment is
/// re-emitted. String literals, heredocs and inline HTML are copied verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhpCompactor;

impl Compactor for PhpCompactor {
    fn supports(&self, path: &str) -> bool {
        path.ends_with(".php")
    }

    fn compact(&self, _path: &str, contents: &[u8], _: &mut SymbolRegistry) -> Result<Vec<u8>> {
        Ok(PhpMinifier::new(contents).run())
    }
}

struct PhpMinifier<'a> {
    src: &'a [u8],
    pos: usize,
    out: Vec<u8>,
    pending_space: bool,
}

impl<'a> PhpMinifier<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            pos: 0,
            out: Vec::with_capacity(src.len()),
            pending_space: false,
        }
    }

    fn run(mut self) -> Vec<u8> {
        loop {
            self.copy_html();
            if self.pos >= self.src.len() {
                break;
            }
            self.code();
            if self.pos >= self.src.len() {
                break;
            }
        }
        self.out
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn starts_with(&self, needle: &[u8]) -> bool {
        self.src[self.pos..].starts_with(needle)
    }

    /// Copies inline HTML up to and including the next open tag.
    fn copy_html(&mut self) {
        while self.pos < self.src.len() {
            if self.starts_with(b"<?") {
                let tag_len = if self.src[self.pos + 2..]
                    .get(..3)
                    .is_some_and(|t| t.eq_ignore_ascii_case(b"php"))
                {
                    5
                } else if self.peek(2) == Some(b'=') {
                    3
                } else {
                    2
                };
                self.out
                    .extend_from_slice(&self.src[self.pos..self.pos + tag_len]);
                self.pos += tag_len;
                return;
            }
            self.out.push(self.src[self.pos]);
            self.pos += 1;
        }
    }

    fn emit_pending_space(&mut self) {
        if self.pending_space && !matches!(self.out.last(), None | Some(b'\n')) {
            self.out.push(b' ');
        }
        self.pending_space = false;
    }

    /// Processes PHP code until a close tag or EOF.
    fn code(&mut self) {
        while let Some(byte) = self.peek(0) {
            match byte {
                b'?' if self.peek(1) == Some(b'>') => {
                    self.emit_pending_space();
                    self.out.extend_from_slice(b"?>");
                    self.pos += 2;
                    return;
                }
                b'\'' | b'"' | b'`' => {
                    self.emit_pending_space();
                    self.copy_string(byte);
                }
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'#' if self.peek(1) != Some(b'[') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                b'<' if self.starts_with(b"<<<") && self.heredoc_label().is_some() => {
                    self.emit_pending_space();
                    self.copy_heredoc();
                }
                b'\n' => {
                    self.pending_space = false;
                    self.out.push(b'\n');
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => {
                    self.pending_space = true;
                    self.pos += 1;
                }
                _ => {
                    self.emit_pending_space();
                    self.out.push(byte);
                    self.pos += 1;
                }
            }
        }
    }

    fn copy_string(&mut self, quote: u8) {
        let start = self.pos;
        self.skip_string(quote);
        self.pos = self.pos.min(self.src.len());
        self.out.extend_from_slice(&self.src[start..self.pos]);
    }

    /// Moves past a quoted string. Double-quoted and backtick strings may
    /// nest quotes inside `{$...}` and `${...}` interpolations.
    fn skip_string(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(byte) = self.peek(0) {
            match byte {
                b'\\' => self.pos += 2,
                _ if byte == quote => {
                    self.pos += 1;
                    return;
                }
                b'{' | b'$' if quote != b'\'' && self.at_interpolation() => {
                    self.skip_interpolation();
                }
                _ => self.pos += 1,
            }
        }
    }

    fn at_interpolation(&self) -> bool {
        matches!(
            (self.peek(0), self.peek(1)),
            (Some(b'{'), Some(b'$')) | (Some(b'$'), Some(b'{'))
        )
    }

    fn skip_interpolation(&mut self) {
        self.pos += 2;
        let mut depth = 1usize;
        while let Some(byte) = self.peek(0) {
            match byte {
                b'\'' | b'"' | b'`' => self.skip_string(byte),
                b'{' => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' => {
                    self.pos += 1;
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(byte) = self.peek(0) {
            if byte == b'\n' || self.starts_with(b"?>") {
                break;
            }
            self.pos += 1;
        }
        self.pending_space = true;
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.src.len() && !self.starts_with(b"*/") {
            if self.src[self.pos] == b'\n' {
                self.out.push(b'\n');
            }
            self.pos += 1;
        }
        self.pos = (self.pos + 2).min(self.src.len());
        self.pending_space = true;
    }

    /// Parses the label of a heredoc or nowdoc opener at the cursor.
    fn heredoc_label(&self) -> Option<(&'a [u8], usize)> {
        let rest = &self.src[self.pos + 3..];
        let mut i = rest
            .iter()
            .position(|b| *b != b' ' && *b != b'\t')
            .unwrap_or(rest.len());
        let quote = match rest.get(i) {
            Some(q @ (b'\'' | b'"')) => {
                i += 1;
                Some(*q)
            }
            _ => None,
        };
        let start = i;
        while rest
            .get(i)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            i += 1;
        }
        if i == start || rest[start].is_ascii_digit() {
            return None;
        }
        let label = &rest[start..i];
        if let Some(q) = quote {
            if rest.get(i) != Some(&q) {
                return None;
            }
            i += 1;
        }
        Some((label, 3 + i))
    }

    fn copy_heredoc(&mut self) {
        let Some((label, opener_len)) = self.heredoc_label() else {
            return;
        };
        let start = self.pos;
        self.pos += opener_len;

        // Find the line whose first non-blank token is the label.
        while self.pos < self.src.len() {
            let line_start = match self.src[self.pos..].iter().position(|b| *b == b'\n') {
                Some(nl) => self.pos + nl + 1,
                None => {
                    self.pos = self.src.len();
                    break;
                }
            };
            let indent = self.src[line_start..]
                .iter()
                .take_while(|b| **b == b' ' || **b == b'\t')
                .count();
            let candidate = line_start + indent;
            self.pos = line_start;
            if self.src[candidate..].starts_with(label)
                && !self
                    .src
                    .get(candidate + label.len())
                    .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
            {
                self.pos = candidate + label.len();
                break;
            }
        }
        self.out.extend_from_slice(&self.src[start..self.pos]);
    }
}

/// Minifies JSON files (`.json`, `.lock`), keeping key order.
///
/// Files that do not parse are passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCompactor;

impl Compactor for JsonCompactor {
    fn supports(&self, path: &str) -> bool {
        path.ends_with(".json") || path.ends_with(".lock")
    }

    fn compact(&self, path: &str, contents: &[u8], _: &mut SymbolRegistry) -> Result<Vec<u8>> {
        match serde_json::from_slice::<serde_json::Value>(contents) {
            Ok(value) => serde_json::to_vec(&value)
                .map_err(|e| Error::InvalidFormat(format!("cannot re-encode {path}: {e}"))),
            Err(e) => {
                log::debug!("{path} is not valid JSON, leaving it as is: {e}");
                Ok(contents.to_vec())
            }
        }
    }
}

/// Moves PHP namespaces under a common prefix.
///
/// `namespace Foo\Bar;` becomes `namespace Prefix\Foo\Bar;` and qualified
/// `use Foo\Baz;` imports are rewritten the same way. Every rewritten name is
/// recorded in the [`SymbolRegistry`].
#[derive(Debug, Clone)]
pub struct SymbolPrefixer {
    prefix: String,
    namespace_re: Regex,
    use_re: Regex,
}

impl SymbolPrefixer {
    /// Creates a prefixer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if `prefix` is not a PHP namespace
    /// name.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into().trim_matches('\\').to_string();
        let valid = !prefix.is_empty()
            && prefix.split('\\').all(|segment| {
                segment
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                    && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid {
            return Err(Error::InvalidFormat(format!(
                "'{prefix}' is not a valid namespace prefix"
            )));
        }

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::ResourceLimitExceeded(e.to_string()))
        };
        Ok(Self {
            namespace_re: compile(r"(?m)^(\s*namespace\s+)([A-Za-z_][A-Za-z0-9_\\]*)(\s*[;{])")?,
            use_re: compile(
                r"(?m)^(\s*use\s+(?:function\s+|const\s+)?)\\?([A-Za-z_][A-Za-z0-9_]*\\[A-Za-z0-9_\\]+)",
            )?,
            prefix,
        })
    }

    /// Returns the prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn rename(&self, name: &str, registry: &mut SymbolRegistry) -> String {
        if name == self.prefix || name.starts_with(&format!("{}\\", self.prefix)) {
            return name.to_string();
        }
        let prefixed = format!("{}\\{}", self.prefix, name);
        registry.record(name, prefixed.clone());
        prefixed
    }
}

impl Compactor for SymbolPrefixer {
    fn supports(&self, path: &str) -> bool {
        path.ends_with(".php")
    }

    fn compact(
        &self,
        _path: &str,
        contents: &[u8],
        registry: &mut SymbolRegistry,
    ) -> Result<Vec<u8>> {
        let mut rewrite = |re: &Regex, input: &[u8]| -> Vec<u8> {
            re.replace_all(input, |caps: &Captures<'_>| {
                let name = String::from_utf8_lossy(&caps[2]).into_owned();
                let mut replaced = caps[1].to_vec();
                replaced.extend_from_slice(self.rename(&name, registry).as_bytes());
                if let Some(tail) = caps.get(3) {
                    replaced.extend_from_slice(tail.as_bytes());
                }
                replaced
            })
            .into_owned()
        };
        let namespaced = rewrite(&self.namespace_re, contents);
        Ok(rewrite(&self.use_re, &namespaced))
    }

    fn is_stateful(&self) -> bool {
        true
    }
}
