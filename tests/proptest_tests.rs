//! Property-based tests using proptest.

mod common;

use proptest::prelude::*;

use pharbox::codec::{self, Compression};
use pharbox::format::{FileEntry, Manifest, ManifestHeader};
use pharbox::{Archive, ArchiveWriter, signature};

fn path_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,9}", 1..4)
        .prop_map(|parts| parts.join("/"))
        .prop_filter("no dot segments", |s| {
            !s.split('/').any(|seg| seg == "." || seg == "..")
        })
}

fn entry_strategy() -> impl Strategy<Value = FileEntry> {
    (
        path_strategy(),
        any::<u32>(),
        any::<u32>(),
        0u32..4096,
        any::<u32>(),
        0u32..0o777,
        proptest::collection::vec(any::<u8>(), 0..8),
    )
        .prop_map(
            |(path, size, timestamp, compressed_size, crc32, mode, metadata)| FileEntry {
                path,
                size,
                timestamp,
                compressed_size,
                crc32,
                flags: mode,
                metadata,
                offset: 0,
            },
        )
}

proptest! {
    /// Every available codec restores its input.
    #[test]
    fn codec_restores_input(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        for compression in Compression::ALL.into_iter().filter(|c| c.is_available()) {
            let packed = codec::compress(&data, compression).unwrap();
            let restored = codec::decompress(&packed, compression, data.len() as u64).unwrap();
            prop_assert_eq!(&restored, &data);
        }
    }

    /// Decoding an encoded manifest yields the same manifest and consumes
    /// exactly the encoded bytes; offsets are running sums.
    #[test]
    fn manifest_decode_inverts_encode(
        entries in proptest::collection::vec(entry_strategy(), 0..12),
        alias in "[a-z.]{0,12}",
        trailing in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        let header = ManifestHeader { alias: alias.into_bytes(), ..ManifestHeader::default() };
        let manifest = Manifest::new(header, entries);
        let mut encoded = manifest.encode().unwrap();
        let len = encoded.len();
        encoded.extend_from_slice(&trailing);

        let (decoded, consumed) = Manifest::decode(&encoded).unwrap();
        prop_assert_eq!(consumed, len);
        prop_assert_eq!(&decoded, &manifest);

        let mut offset = 0u64;
        for entry in decoded.entries() {
            prop_assert_eq!(entry.offset, offset);
            offset += u64::from(entry.compressed_size);
        }
        prop_assert_eq!(decoded.data_size(), offset);
    }

    /// A built container reads back every file it was given.
    #[test]
    fn writer_reader_agree(
        files in proptest::collection::btree_map(
            path_strategy(),
            proptest::collection::vec(any::<u8>(), 0..512),
            1..8,
        ),
        gzip in any::<bool>(),
    ) {
        // A path that is also a parent directory of another cannot be a file.
        let names: Vec<&String> = files.keys().collect();
        let nested = names
            .iter()
            .any(|a| names.iter().any(|b| b.starts_with(&format!("{a}/"))));
        prop_assume!(!nested);
        // Case-insensitive file systems would merge these in the scratch tree.
        let folded: std::collections::BTreeSet<String> =
            names.iter().map(|n| n.to_ascii_lowercase()).collect();
        prop_assume!(folded.len() == names.len());

        let mut writer = ArchiveWriter::new(common::options());
        writer.start_buffering().unwrap();
        for (path, contents) in &files {
            writer.add_file(path, contents.clone()).unwrap();
        }
        writer.end_buffering(|_| Ok(())).unwrap();
        if gzip && Compression::Gzip.is_available() {
            writer.compress(Compression::Gzip).unwrap();
        }

        let archive = Archive::from_bytes(writer.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(archive.len(), files.len());
        for (path, contents) in &files {
            prop_assert_eq!(&archive.read(path).unwrap(), contents);
        }
    }

    /// Any single flipped payload byte breaks a digest signature.
    #[test]
    fn signature_detects_any_flip(index in any::<prop::sample::Index>(), bit in 0u8..8) {
        let mut writer = common::build_writer(common::options(), &common::sample_files());
        writer.sign(signature::SignatureAlgorithm::Sha1).unwrap();
        let mut bytes = writer.to_bytes().unwrap();
        let payload_len = signature::read_trailer(&bytes).unwrap().unwrap().payload_len as usize;

        bytes[index.index(payload_len)] ^= 1 << bit;
        prop_assert!(signature::verify_bytes(&bytes, None).is_err());
    }
}
