//! Fuzz target for opening arbitrary bytes as a container.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(archive) = pharbox::Archive::from_bytes(data.to_vec()) else {
        return;
    };
    // Reading every entry exercises decompression and CRC checks.
    for index in 0..archive.len() {
        let _ = archive.read_entry(index);
    }
    let _ = pharbox::signature::verify_bytes(data, None);
});
