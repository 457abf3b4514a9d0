//! Corrupted, truncated and hostile containers.

mod common;

use pharbox::format::{FileEntry, Manifest, ManifestHeader, Stub};
use pharbox::{Archive, Compression, Error, ExtractOptions, PathSafety, extract};

/// Hand-assembles a container so tests can lie about entry fields.
fn assemble(entries: Vec<FileEntry>, blob: &[u8]) -> Vec<u8> {
    let manifest = Manifest::new(ManifestHeader::default(), entries);
    let mut out = Stub::default().as_bytes().to_vec();
    out.extend_from_slice(&manifest.encode().unwrap());
    out.extend_from_slice(blob);
    out
}

fn entry(path: &str, contents: &[u8]) -> FileEntry {
    FileEntry {
        path: path.to_string(),
        size: contents.len() as u32,
        timestamp: common::TIMESTAMP,
        compressed_size: contents.len() as u32,
        crc32: crc32fast::hash(contents),
        flags: 0o644,
        metadata: Vec::new(),
        offset: 0,
    }
}

fn open_and_extract(bytes: Vec<u8>) -> pharbox::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let file = common::write_container(dir.path(), "bad.phar", &bytes);
    extract(&file, dir.path().join("out"), &ExtractOptions::default()).map(|_| ())
}

#[test]
fn test_missing_stub() {
    let err = Archive::from_bytes(b"no halt call here".to_vec()).unwrap_err();
    assert!(matches!(err, Error::StubNotFound { .. }));
    assert!(err.is_format_error());
}

#[test]
fn test_truncated_everywhere() {
    let bytes = common::build_container(&common::sample_files(), Compression::None);
    let stub_len = Stub::default().size();
    for cut in (stub_len..bytes.len()).step_by(3) {
        let err = Archive::from_bytes(bytes[..cut].to_vec()).unwrap_err();
        assert!(err.is_format_error(), "cut at {cut}: {err}");
    }
}

#[test]
fn test_crc_mismatch_names_entry() {
    let mut bad = entry("b.txt", b"two");
    bad.crc32 ^= 1;
    let bytes = assemble(vec![entry("a.txt", b"one"), bad], b"onetwo");

    let archive = Archive::from_bytes(bytes.clone()).unwrap();
    assert_eq!(archive.read("a.txt").unwrap(), b"one");
    let err = archive.read("b.txt").unwrap_err();
    assert!(err.is_integrity_error());
    assert_eq!(err.entry_name(), Some("b.txt"));

    let err = open_and_extract(bytes).unwrap_err();
    assert!(matches!(err, Error::CrcMismatch { entry_index: 1, .. }));
}

#[test]
fn test_size_mismatch() {
    let mut bad = entry("a.txt", b"abc");
    bad.size = 5;
    let bytes = assemble(vec![bad], b"abc");
    let err = open_and_extract(bytes).unwrap_err();
    assert!(matches!(err, Error::SizeMismatch { .. }), "{err}");
}

#[test]
fn test_blob_overrun() {
    let mut bad = entry("a.txt", b"abc");
    bad.compressed_size = 100;
    let err = Archive::from_bytes(assemble(vec![bad], b"abc")).unwrap_err();
    assert!(err.is_format_error());
}

#[test]
fn test_trailing_garbage() {
    let mut bytes = common::build_container(&common::sample_files(), Compression::None);
    bytes.extend_from_slice(b"garbage!");
    assert!(Archive::from_bytes(bytes).unwrap_err().is_format_error());
}

#[test]
fn test_traversal_rejected() {
    for path in ["../escape.txt", "a/../../escape.txt", "/etc/passwd"] {
        let bytes = assemble(vec![entry(path, b"x")], b"x");
        let dir = tempfile::tempdir().unwrap();
        let file = common::write_container(dir.path(), "evil.phar", &bytes);
        let dest = dir.path().join("out");

        let err = extract(&file, &dest, &ExtractOptions::default()).unwrap_err();
        assert!(err.is_security_error(), "{path}: {err}");
        assert!(!dir.path().join("escape.txt").exists());
        // No marker after a failed extraction.
        assert_eq!(common::list_tree(&dest), Vec::<String>::new());
    }
}

#[test]
fn test_relaxed_policy_still_rejects_parent() {
    let bytes = assemble(vec![entry("../x", b"x")], b"x");
    let dir = tempfile::tempdir().unwrap();
    let file = common::write_container(dir.path(), "evil.phar", &bytes);
    let options = ExtractOptions::new().path_safety(PathSafety::Relaxed);
    let err = extract(&file, dir.path().join("out"), &options).unwrap_err();
    assert!(matches!(err, Error::PathTraversal { .. }));
}

#[test]
fn test_unavailable_codec_or_corrupt_stream() {
    let mut bad = entry("a.txt", b"not deflate data");
    bad.flags |= 0x1000;
    bad.size = 100;
    let bytes = assemble(vec![bad], b"not deflate data");
    let err = open_and_extract(bytes).unwrap_err();
    if Compression::Gzip.is_available() {
        assert!(err.is_format_error() || err.is_integrity_error(), "{err}");
    } else {
        assert!(matches!(err, Error::CodecUnavailable { .. }));
    }
}

#[test]
fn test_both_compression_bits() {
    let mut bad = entry("a.txt", b"abc");
    bad.flags |= 0x3000;
    let err = open_and_extract(assemble(vec![bad], b"abc")).unwrap_err();
    assert!(err.is_format_error());
}
