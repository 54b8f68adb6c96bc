#![no_main]

//! Fuzz target for the AVI inspector.
//!
//! Feeds arbitrary bytes, optionally behind a valid RIFF/AVI preamble, to
//! the chunk walker and index decoders to find panics.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

#[derive(Arbitrary, Debug)]
struct InspectInput {
    data: Vec<u8>,
    /// Prepend a RIFF 'AVI ' header so the walker gets past the signature
    with_preamble: bool,
    /// Declared RIFF size when the preamble is added
    riff_size: u32,
}

fuzz_target!(|input: InspectInput| {
    // Limit input size to prevent excessive memory allocation
    if input.data.len() > 64 * 1024 {
        return;
    }

    let bytes = if input.with_preamble {
        let mut bytes = Vec::with_capacity(input.data.len() + 12);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&input.riff_size.to_le_bytes());
        bytes.extend_from_slice(b"AVI ");
        bytes.extend_from_slice(&input.data);
        bytes
    } else {
        input.data
    };

    // Should not panic on any input
    if let Ok(inspection) = transcode_avimux::inspect(Cursor::new(bytes)) {
        let _ = inspection.to_string();
    }
});
