//! Fuzz target for the manifest decoder.
//!
//! Anything that decodes must encode back to the bytes it consumed.
//!
//! Run with: cargo +nightly fuzz run manifest_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use pharbox::Manifest;

fuzz_target!(|data: &[u8]| {
    if let Ok((manifest, consumed)) = Manifest::decode(data) {
        if let Ok(encoded) = manifest.encode() {
            assert_eq!(encoded, &data[..consumed]);
        }
    }
});
