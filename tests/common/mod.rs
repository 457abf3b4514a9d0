//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use pharbox::{Archive, ArchiveWriter, Compression, WriteOptions};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Fixed timestamp so repeated builds are byte-identical.
pub const TIMESTAMP: u32 = 1_700_000_000;

/// Options used by most tests.
pub fn options() -> WriteOptions {
    WriteOptions::new().timestamp(TIMESTAMP)
}

/// Builds a container from in-memory files and returns the writer, ready for
/// `compress`, `sign` or `write`.
pub fn build_writer(options: WriteOptions, files: &[(&str, &[u8])]) -> ArchiveWriter {
    let mut writer = ArchiveWriter::new(options);
    writer.start_buffering().expect("start buffering");
    for (path, contents) in files {
        writer.add_file(path, contents.to_vec()).expect("add file");
    }
    writer.end_buffering(|_| Ok(())).expect("end buffering");
    writer
}

/// Builds container bytes with the given compression.
pub fn build_container(files: &[(&str, &[u8])], compression: Compression) -> Vec<u8> {
    let mut writer = build_writer(options(), files);
    writer.compress(compression).expect("compress");
    writer.to_bytes().expect("serialize")
}

/// Writes container bytes to `dir/name` and returns the path.
pub fn write_container(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write container");
    path
}

/// Asserts that every file reads back with the expected contents.
pub fn verify_contents(bytes: &[u8], files: &[(&str, &[u8])]) {
    let archive = Archive::from_bytes(bytes.to_vec()).expect("open container");
    for (path, expected) in files {
        let actual = archive
            .read(path)
            .unwrap_or_else(|e| panic!("read {path}: {e}"));
        assert_eq!(&actual, expected, "contents of {path}");
    }
}

/// Deterministic pseudo-random payload.
pub fn random_payload(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.r#gen::<u8>()).collect()
}

/// The three-file tree used by several scenarios.
pub fn sample_files() -> Vec<(&'static str, &'static [u8])> {
    vec![
        ("a.php", b"<?php echo 'a';".as_slice()),
        ("b/c.txt", b"hello".as_slice()),
        ("d.txt", b"".as_slice()),
    ]
}

/// Lists regular files under `root` as sorted relative paths.
pub fn list_tree(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// A 1024-bit RSA key shared by the tests of one binary.
#[cfg(feature = "openssl-sig")]
pub fn rsa_key() -> pharbox::signature::SigningKey {
    use std::sync::OnceLock;

    static KEY: OnceLock<rsa::RsaPrivateKey> = OnceLock::new();
    let key = KEY.get_or_init(|| {
        rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("generate key")
    });
    pharbox::signature::SigningKey::from(key.clone())
}
