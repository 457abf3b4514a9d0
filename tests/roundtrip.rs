//! Build, read back and extract containers end to end.

mod common;

use std::fs;

use pharbox::format::{EMPTY_PLACEHOLDER_PATH, PATTERN_OPEN};
use pharbox::pipeline::{PipelineOptions, Threads};
use pharbox::write::{Compactors, JsonCompactor, PathMapper, Placeholders, SymbolPrefixer};
use pharbox::{
    Archive, ArchiveWriter, Compression, ExtractOptions, Stub, StubPattern, WriteOptions, extract,
};

#[test]
fn test_three_file_scenario() {
    let files = common::sample_files();
    let bytes = common::build_container(&files, Compression::None);

    let archive = Archive::from_bytes(bytes.clone()).unwrap();
    assert_eq!(archive.flags(), 0);
    assert_eq!(archive.len(), 3);
    assert!(archive.stub().ends_with(PATTERN_OPEN));

    let dir = tempfile::tempdir().unwrap();
    let file = common::write_container(dir.path(), "app.phar", &bytes);
    let dest = dir.path().join("out");
    let extraction = extract(&file, &dest, &ExtractOptions::new().fingerprint(false)).unwrap();
    assert_eq!(extraction.entries_extracted, 3);

    assert_eq!(common::list_tree(&dest), ["a.php", "b/c.txt", "d.txt"]);
    assert_eq!(fs::read(dest.join("a.php")).unwrap(), b"<?php echo 'a';");
    assert_eq!(fs::read(dest.join("b/c.txt")).unwrap(), b"hello");
    assert!(fs::read(dest.join("d.txt")).unwrap().is_empty());
}

#[test]
fn test_every_available_codec() {
    let payload = common::random_payload(7, 64 * 1024);
    let text = b"repeat ".repeat(2000);
    let files = [
        ("bin/random.dat", payload.as_slice()),
        ("text.txt", text.as_slice()),
        ("empty", b"".as_slice()),
    ];
    for compression in Compression::ALL {
        if !compression.is_available() {
            continue;
        }
        let bytes = common::build_container(&files, compression);
        let archive = Archive::from_bytes(bytes.clone()).unwrap();
        assert_eq!(archive.flags(), compression.flag(), "{compression}");
        common::verify_contents(&bytes, &files);
    }
}

#[test]
fn test_recompress_changes_flags() {
    let files = common::sample_files();
    let mut writer = common::build_writer(common::options(), &files);
    if Compression::Gzip.is_available() {
        writer.compress(Compression::Gzip).unwrap();
        assert_eq!(
            Archive::from_bytes(writer.to_bytes().unwrap()).unwrap().flags(),
            0x1000
        );
    }
    writer.compress(Compression::None).unwrap();
    let bytes = writer.to_bytes().unwrap();
    assert_eq!(Archive::from_bytes(bytes.clone()).unwrap().flags(), 0);
    common::verify_contents(&bytes, &files);
}

#[test]
fn test_builds_are_reproducible() {
    let files = common::sample_files();
    let first = common::build_container(&files, Compression::None);
    let second = common::build_container(&files, Compression::None);
    assert_eq!(first, second);
}

#[test]
fn test_empty_build() {
    let bytes = common::build_container(&[], Compression::None);
    let archive = Archive::from_bytes(bytes).unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.entries()[0].path, EMPTY_PLACEHOLDER_PATH);
}

#[test]
fn test_extraction_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = common::build_container(&common::sample_files(), Compression::None);
    let file = common::write_container(dir.path(), "app.phar", &bytes);
    let dest = dir.path().join("out");

    let first = extract(&file, &dest, &ExtractOptions::default()).unwrap();
    let before = common::list_tree(&dest);
    let second = extract(&file, &dest, &ExtractOptions::default()).unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(common::list_tree(&dest), before);
    assert!(before.contains(&first.fingerprint));
}

#[test]
fn test_extraction_purges_stale_files() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out");
    fs::create_dir_all(dest.join("old")).unwrap();
    fs::write(dest.join("old/stale.txt"), b"stale").unwrap();

    let bytes = common::build_container(&common::sample_files(), Compression::None);
    let file = common::write_container(dir.path(), "app.phar", &bytes);
    extract(&file, &dest, &ExtractOptions::new().fingerprint(false)).unwrap();
    assert!(!dest.join("old").exists());
}

#[test]
fn test_custom_stub() {
    let stub =
        Stub::new("#!/usr/bin/env php\n<?php Phar::mapPhar(); __HALT_COMPILER(); junk").unwrap();
    let mut writer = ArchiveWriter::new(common::options().stub(stub));
    writer.start_buffering().unwrap();
    writer.add_file("a.txt", "a").unwrap();
    let bytes = writer.end_buffering(|_| Ok(())).unwrap();

    let archive = Archive::from_bytes_with(bytes, &StubPattern::Open).unwrap();
    assert!(archive.stub().starts_with(b"#!/usr/bin/env php"));
    assert!(archive.stub().ends_with(PATTERN_OPEN));
    assert_eq!(archive.read("a.txt").unwrap(), b"a");
}

#[test]
fn test_placeholders_and_path_mapping() {
    let placeholders =
        Placeholders::new([("@version@", "1.2.3"), ("@version@-dev", "nightly")]).unwrap();
    let mapper = PathMapper::new().rule("src/", "lib/");
    let mut writer = ArchiveWriter::new(common::options())
        .placeholders(placeholders)
        .path_mapper(mapper);
    writer.start_buffering().unwrap();
    let local = writer
        .add_file("src/version.txt", "@version@ @version@-dev")
        .unwrap();
    assert_eq!(local, "lib/version.txt");
    let bytes = writer.end_buffering(|_| Ok(())).unwrap();

    common::verify_contents(&bytes, &[("lib/version.txt", b"1.2.3 nightly".as_slice())]);
}

#[test]
fn test_finalize_hook_sees_and_changes_tree() {
    let mut writer = ArchiveWriter::new(common::options());
    writer.start_buffering().unwrap();
    writer.add_file("keep.txt", "k").unwrap();
    writer.add_file("drop.txt", "d").unwrap();
    let bytes = writer
        .end_buffering(|root| {
            assert!(root.join("keep.txt").is_file());
            fs::remove_file(root.join("drop.txt"))?;
            fs::write(root.join("generated.txt"), "g")?;
            fs::create_dir(root.join("cache"))?;
            Ok(())
        })
        .unwrap();

    let archive = Archive::from_bytes(bytes).unwrap();
    let paths: Vec<_> = archive.entries().iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["cache/", "generated.txt", "keep.txt"]);
}

#[test]
fn test_hook_error_aborts_build() {
    let mut writer = ArchiveWriter::new(common::options());
    writer.start_buffering().unwrap();
    let err = writer
        .end_buffering(|_| Err(pharbox::Error::InvalidFormat("hook failed".into())))
        .unwrap_err();
    assert!(err.is_format_error());
    assert!(writer.to_bytes().is_err());
}

#[test]
fn test_files_from_disk_through_pipeline() {
    let sources = tempfile::tempdir().unwrap();
    let mut paths = Vec::new();
    for i in 0..12 {
        let path = sources.path().join(format!("src/M{i}.php"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("<?php\nnamespace App\\M{i};\n")).unwrap();
        paths.push(path);
    }
    let manifest = sources.path().join("composer.json");
    fs::write(&manifest, "{ \"name\": \"acme/app\" }").unwrap();
    paths.push(manifest);

    let build = |parallel: bool| {
        let options = WriteOptions::new().timestamp(0).base_path(sources.path());
        let mut writer = ArchiveWriter::new(options).compactors(
            Compactors::new()
                .with(SymbolPrefixer::new("Scoped").unwrap())
                .with(JsonCompactor),
        );
        writer.start_buffering().unwrap();
        let options = PipelineOptions::new()
            .parallel(parallel)
            .threads(Threads::count_or_single(3));
        assert_eq!(writer.add_files(&paths, &options).unwrap(), 13);
        let bytes = writer.end_buffering(|_| Ok(())).unwrap();
        (bytes, writer.registry().clone())
    };

    let (sequential, seq_registry) = build(false);
    let (parallel, par_registry) = build(true);
    assert_eq!(sequential, parallel);
    assert_eq!(seq_registry, par_registry);
    assert_eq!(par_registry.len(), 12);

    common::verify_contents(
        &parallel,
        &[
            ("src/M3.php", b"<?php\nnamespace Scoped\\App\\M3;\n".as_slice()),
            ("composer.json", br#"{"name":"acme/app"}"#.as_slice()),
        ],
    );
}

#[cfg(unix)]
#[test]
fn test_permissions_applied() {
    use std::os::unix::fs::PermissionsExt;

    let mut writer = ArchiveWriter::new(common::options().permissions(0o750));
    writer.start_buffering().unwrap();
    writer.add_file("run.sh", "#!/bin/sh").unwrap();
    let bytes = writer.end_buffering(|_| Ok(())).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let file = common::write_container(dir.path(), "app.phar", &bytes);
    let dest = dir.path().join("out");
    extract(&file, &dest, &ExtractOptions::default()).unwrap();
    let mode = fs::metadata(dest.join("run.sh")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o750);
}
