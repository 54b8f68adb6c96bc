#![no_main]

//! Fuzz target for the AVI writer.
//!
//! Drives the writer with arbitrary append sequences and a small page
//! window, then checks the finished file with the inspector.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use transcode_avimux::{inspect, AudioConfig, AviWriter, IndexStyle, VideoConfig, WriterConfig};

#[derive(Arbitrary, Debug)]
enum Append {
    Video { len: u16, key_frame: bool },
    Audio { len: u16 },
}

#[derive(Arbitrary, Debug)]
struct WriterInput {
    fps: f64,
    basic: bool,
    with_audio: bool,
    max_page_span: u16,
    appends: Vec<Append>,
}

fuzz_target!(|input: WriterInput| {
    if input.appends.len() > 256 {
        return;
    }

    let video = VideoConfig::new(16, 16, *b"MJPG", input.fps);
    let audio = input.with_audio.then(|| AudioConfig::new(1, 16, 8000));
    let config = WriterConfig {
        index_style: if input.basic { IndexStyle::Basic } else { IndexStyle::OpenDml },
        max_page_span: u64::from(input.max_page_span),
        super_index_capacity: 512,
    };

    // Rejected frame rates are fine; panics are not
    let Ok(mut writer) = AviWriter::new(Cursor::new(Vec::new()), video, audio, config) else {
        return;
    };

    let mut frames = 0u32;
    for append in &input.appends {
        match append {
            Append::Video { len, key_frame } => {
                let data = vec![0x42; usize::from(*len)];
                if writer.append_video_frame(&data, *key_frame).is_ok() {
                    frames += 1;
                }
            }
            Append::Audio { len } => {
                let _ = writer.append_audio(&vec![0x24; usize::from(*len)]);
            }
        }
    }

    let bytes = writer.close().expect("close over memory").into_inner();
    assert_eq!(bytes.len() % 2, 0);

    let inspection = inspect(Cursor::new(bytes)).expect("written file inspects");
    assert!(inspection.riff_size_matches());
    assert_eq!(inspection.main_header.expect("avih present").total_frames, frames);
});
