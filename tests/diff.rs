//! Comparing containers by content hash.

mod common;

use pharbox::diff::{DiffEntry, DiffMode};
use pharbox::{Compression, DiffAlgorithm, DiffOptions, diff_archives};

#[test]
fn test_container_against_itself() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = common::build_container(&common::sample_files(), Compression::None);
    let file = common::write_container(dir.path(), "app.phar", &bytes);

    for algorithm in DiffAlgorithm::ALL {
        let options = DiffOptions::new().algorithm(algorithm);
        let report = diff_archives(&file, &file, &options).unwrap();
        assert_eq!(report.count(), 0, "{algorithm}");
    }
}

#[test]
fn test_compression_does_not_change_contents() {
    if !Compression::Gzip.is_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let files = common::sample_files();
    let plain = common::write_container(
        dir.path(),
        "plain.phar",
        &common::build_container(&files, Compression::None),
    );
    let packed = common::write_container(
        dir.path(),
        "packed.phar",
        &common::build_container(&files, Compression::Gzip),
    );
    let report = diff_archives(&plain, &packed, &DiffOptions::default()).unwrap();
    assert!(report.is_empty());
}

#[test]
fn test_changed_and_added_files() {
    let dir = tempfile::tempdir().unwrap();
    let old = common::write_container(
        dir.path(),
        "old.phar",
        &common::build_container(&[("a.txt", b"one".as_slice())], Compression::None),
    );
    let new = common::write_container(
        dir.path(),
        "new.phar",
        &common::build_container(
            &[("a.txt", b"two".as_slice()), ("b.txt", b"b".as_slice())],
            Compression::None,
        ),
    );

    let options = DiffOptions::new().mode(DiffMode::PathKeyed);
    let report = diff_archives(&old, &new, &options).unwrap();
    assert_eq!(
        report.entries,
        [
            DiffEntry::Changed {
                left: "a.txt".into(),
                right: "a.txt".into()
            },
            DiffEntry::OnlyRight("b.txt".into()),
        ]
    );
}
