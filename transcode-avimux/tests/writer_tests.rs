//! Writer integration tests.
//!
//! Files are written through the public API and read back with the
//! inspector.

use std::fs;
use std::io::Cursor;
use tempfile::tempdir;
use transcode_avimux::{
    chunk_ids, inspect, AudioConfig, AviError, AviWriter, Inspection, StreamFormat, StreamKind,
    VideoConfig, WriterConfig,
};

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// Offsets of the data chunks inside movi, in file order
fn data_chunk_offsets(inspection: &Inspection) -> Vec<u64> {
    inspection
        .movi_chunks()
        .iter()
        .filter(|c| c.id == chunk_ids::VIDEO_FRAME || c.id == chunk_ids::AUDIO_SAMPLES)
        .map(|c| c.offset)
        .collect()
}

/// Chunk offsets referenced by every standard index page, sorted
fn paged_offsets(inspection: &Inspection) -> Vec<u64> {
    let mut offsets: Vec<u64> = inspection
        .index_pages
        .iter()
        .flat_map(|p| p.chunk_positions())
        .collect();
    offsets.sort_unstable();
    offsets
}

fn write_in_memory(
    config: WriterConfig,
    audio: Option<AudioConfig>,
    body: impl FnOnce(&mut AviWriter<Cursor<Vec<u8>>>),
) -> Vec<u8> {
    let video = VideoConfig::new(64, 48, *b"MJPG", 25.0);
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), video, audio, config).unwrap();
    body(&mut writer);
    writer.close().unwrap().into_inner()
}

// =============================================================================
// Scenarios
// =============================================================================

/// Ten raw I420 key frames at 320x240.
#[test]
fn test_ten_i420_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.avi");

    let video = VideoConfig::new(320, 240, *b"I420", 30.0);
    let mut writer = AviWriter::open(&path, video, None).unwrap();
    let frame = vec![0x80u8; 320 * 240 * 12 / 8];
    assert_eq!(frame.len(), 115_200);
    for _ in 0..10 {
        writer.append_video_frame(&frame, true).unwrap();
    }
    writer.close().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(u32_at(&bytes, 4) as usize, bytes.len() - 8);

    let inspection = inspect(fs::File::open(&path).unwrap()).unwrap();
    assert!(inspection.riff_size_matches());

    let header = inspection.main_header.as_ref().unwrap();
    assert_eq!(header.total_frames, 10);
    assert_eq!(header.streams, 1);
    assert_eq!(header.microseconds_per_frame, 33_333);
    assert_eq!(header.width, 320);
    assert_eq!(header.suggested_buffer_size, 115_200);
    assert!(header.flags.has_index);

    assert_eq!(inspection.odml.unwrap().total_frames, 10);
    assert_eq!(inspection.streams.len(), 1);
    let stream = &inspection.streams[0];
    assert!(stream.is_video());
    assert_eq!(stream.header.length, 10);
    assert_eq!(stream.header.scale, 33_333);
    assert_eq!(stream.header.rate, 1_000_000);
    match &stream.format {
        Some(StreamFormat::Video(format)) => {
            assert_eq!(format.bit_count, 12);
            assert_eq!(format.image_size, 115_200);
            assert_eq!(format.compression.as_str(), "I420");
        }
        other => panic!("unexpected format {:?}", other),
    }

    let super_index = stream.super_index.as_ref().unwrap();
    assert_eq!(super_index.entries.len(), 1);
    assert_eq!(super_index.entries[0].duration, 10);

    assert_eq!(inspection.index_pages.len(), 1);
    let page = &inspection.index_pages[0];
    assert_eq!(page.index.chunk_id, chunk_ids::VIDEO_FRAME);
    assert!(page.index.entries.iter().all(|e| e.key_frame && e.size == 115_200));
    assert_eq!(paged_offsets(&inspection), data_chunk_offsets(&inspection));
}

/// A frame rate below one is refused before the file is created.
#[test]
fn test_zero_fps_creates_no_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never.avi");

    let video = VideoConfig::new(320, 240, *b"I420", 0.0);
    let result = AviWriter::open(&path, video, None);

    assert!(matches!(result, Err(AviError::InvalidArgument(_))));
    assert!(!path.exists());
}

#[test]
fn test_invalid_config_creates_no_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never.avi");
    let video = VideoConfig::new(320, 240, *b"I420", 30.0);

    let zero_capacity = WriterConfig {
        super_index_capacity: 0,
        ..Default::default()
    };
    assert!(matches!(
        AviWriter::open_with_config(&path, video, None, zero_capacity),
        Err(AviError::InvalidArgument(_))
    ));

    let unbounded = WriterConfig {
        max_page_span: u64::MAX,
        ..Default::default()
    };
    assert!(matches!(
        AviWriter::open_with_config(&path, video, None, unbounded),
        Err(AviError::InvalidArgument(_))
    ));
    assert!(!path.exists());
}

#[test]
fn test_open_fails_on_missing_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("out.avi");

    let video = VideoConfig::new(320, 240, *b"I420", 30.0);
    assert!(matches!(
        AviWriter::open(&path, video, None),
        Err(AviError::Io(_))
    ));
}

#[test]
fn test_interleaved_audio() {
    let audio = AudioConfig::new(2, 16, 44100);
    let bytes = write_in_memory(WriterConfig::default(), Some(audio), |w| {
        for i in 0..5u8 {
            w.append_video_frame(&vec![i; 1001], i == 0).unwrap();
            w.append_audio(&vec![i; 1764]).unwrap();
        }
    });
    let inspection = inspect(Cursor::new(bytes)).unwrap();

    assert_eq!(inspection.main_header.as_ref().unwrap().streams, 2);
    assert_eq!(inspection.streams.len(), 2);

    let audio_stream = &inspection.streams[1];
    assert!(audio_stream.is_audio());
    assert_eq!(audio_stream.header.length, 5 * 1764);
    assert_eq!(audio_stream.header.quality, -1);
    assert_eq!(audio_stream.header.sample_size, 4);
    assert_eq!(audio_stream.header.suggested_buffer_size, 176_400);
    match &audio_stream.format {
        Some(StreamFormat::Audio(format)) => {
            assert_eq!(format.format_tag, 1);
            assert_eq!(format.block_align, 4);
            assert_eq!(format.avg_bytes_per_sec, 176_400);
        }
        other => panic!("unexpected format {:?}", other),
    }

    let pages: Vec<_> = inspection.index_pages.iter().map(|p| p.index.chunk_id).collect();
    assert_eq!(pages, vec![chunk_ids::VIDEO_FRAME, chunk_ids::AUDIO_SAMPLES]);

    let video_page = &inspection.index_pages[0].index;
    let key_frames: Vec<bool> = video_page.entries.iter().map(|e| e.key_frame).collect();
    assert_eq!(key_frames, vec![true, false, false, false, false]);
    assert!(inspection.index_pages[1].index.entries.iter().all(|e| e.key_frame));

    assert_eq!(paged_offsets(&inspection), data_chunk_offsets(&inspection));
}

#[test]
fn test_legacy_index() {
    let audio = AudioConfig::new(1, 8, 8000);
    let bytes = write_in_memory(WriterConfig::basic(), Some(audio), |w| {
        w.append_video_frame(&[1; 10], true).unwrap();
        w.append_audio(&[2; 7]).unwrap();
        w.append_video_frame(&[3; 12], false).unwrap();
    });
    let inspection = inspect(Cursor::new(bytes)).unwrap();

    assert!(inspection.odml.is_none());
    assert!(inspection.streams.iter().all(|s| s.super_index.is_none()));
    assert!(inspection.index_pages.is_empty());
    assert!(inspection.find(chunk_ids::IDX1).is_some());

    let movi = inspection.movi_offset.unwrap();
    let entries = &inspection.legacy_index;
    assert_eq!(entries.len(), 3);

    let ids: Vec<_> = entries.iter().map(|e| e.chunk_id).collect();
    assert_eq!(
        ids,
        vec![chunk_ids::VIDEO_FRAME, chunk_ids::AUDIO_SAMPLES, chunk_ids::VIDEO_FRAME]
    );
    assert!(entries[0].is_keyframe());
    assert!(entries[1].is_keyframe());
    assert!(!entries[2].is_keyframe());
    assert_eq!(entries[0].offset, 4);
    assert_eq!(entries[1].size, 7);

    let positions: Vec<u64> = entries.iter().map(|e| movi + u64::from(e.offset)).collect();
    assert_eq!(positions, data_chunk_offsets(&inspection));
}

#[test]
fn test_odd_lengths_are_padded() {
    let audio = AudioConfig::new(1, 8, 8000);
    let bytes = write_in_memory(WriterConfig::default(), Some(audio), |w| {
        w.append_video_frame(&[0xAA; 3], true).unwrap();
        w.append_audio(&[0xBB; 5]).unwrap();
        w.append_video_frame(&[0xCC; 1], false).unwrap();
    });
    assert_eq!(bytes.len() % 2, 0);

    let inspection = inspect(Cursor::new(bytes.clone())).unwrap();
    let chunks = inspection.movi_chunks();
    for pair in chunks.windows(2) {
        let end = pair[0].offset as usize + 8 + pair[0].size as usize;
        if pair[0].size % 2 == 1 {
            assert_eq!(bytes[end], 0);
            assert_eq!(pair[1].offset as usize, end + 1);
        } else {
            assert_eq!(pair[1].offset as usize, end);
        }
    }
    assert_eq!(inspection.streams[1].header.length, 6);
}

#[test]
fn test_movi_size_covers_payload() {
    let bytes = write_in_memory(WriterConfig::default(), None, |w| {
        for len in [5usize, 8, 13, 2] {
            w.append_video_frame(&vec![0; len], true).unwrap();
        }
    });
    let inspection = inspect(Cursor::new(bytes)).unwrap();

    let movi = inspection.find(chunk_ids::MOVI).unwrap();
    let span: u64 = movi
        .children
        .iter()
        .map(|c| 8 + u64::from(c.size) + u64::from(c.size & 1))
        .sum();
    assert_eq!(u64::from(movi.size), 4 + span);
}

#[test]
fn test_setters_reach_the_file() {
    let bytes = write_in_memory(WriterConfig::default(), None, |w| {
        w.append_video_frame(&[0; 4], true).unwrap();
        w.set_frame_rate(50.0).unwrap();
        w.set_codec(*b"XVID").unwrap();
        w.set_size(128, 96).unwrap();
    });
    let inspection = inspect(Cursor::new(bytes)).unwrap();

    let header = inspection.main_header.as_ref().unwrap();
    assert_eq!(header.microseconds_per_frame, 20_000);
    assert_eq!((header.width, header.height), (128, 96));
    assert_eq!(header.suggested_buffer_size, 128 * 96 * 3);

    let stream = &inspection.streams[0];
    assert_eq!(stream.header.handler.as_str(), "XVID");
    assert_eq!(stream.header.scale, 20_000);
    assert_eq!(stream.header.frame.right, 128);
}

// =============================================================================
// Index paging
// =============================================================================

/// Frames of 1000 bytes occupy 1008 bytes; with a 10_100 byte window the
/// twelfth frame is the first to start past it.
#[test]
fn test_overflow_flushes_once_at_boundary() {
    let config = WriterConfig {
        max_page_span: 10_100,
        ..Default::default()
    };
    let bytes = write_in_memory(config, None, |w| {
        for i in 0..11 {
            w.append_video_frame(&[0; 1000], i % 5 == 0).unwrap();
            assert!(w.super_index(StreamKind::Video).unwrap().entries.is_empty());
        }
        w.append_video_frame(&[0; 1000], false).unwrap();
        assert_eq!(w.super_index(StreamKind::Video).unwrap().entries.len(), 1);
        assert_eq!(w.pending_records().len(), 1);
    });
    let inspection = inspect(Cursor::new(bytes)).unwrap();

    let super_index = inspection.streams[0].super_index.as_ref().unwrap();
    let durations: Vec<u32> = super_index.entries.iter().map(|e| e.duration).collect();
    assert_eq!(durations, vec![11, 1]);

    // the first page sits inside movi, right before the frame that overflowed
    let first = &inspection.index_pages[0];
    assert!(inspection
        .movi_chunks()
        .iter()
        .any(|c| c.offset == first.offset && c.id == chunk_ids::VIDEO_INDEX));

    // the second page is based on the frame that triggered the flush
    let second = &inspection.index_pages[1];
    assert_eq!(second.index.entries.len(), 1);
    assert_eq!(second.index.entries[0].offset, 8);
    assert_eq!(second.index.base_offset, first.offset + 8 + 24 + 11 * 8);

    assert_eq!(paged_offsets(&inspection), data_chunk_offsets(&inspection));
}

#[test]
fn test_every_record_indexed_once_across_flushes() {
    let config = WriterConfig {
        max_page_span: 300,
        ..Default::default()
    };
    let audio = AudioConfig::new(1, 8, 8000);
    let bytes = write_in_memory(config, Some(audio), |w| {
        for i in 0..40usize {
            w.append_video_frame(&vec![0; 20 + i % 7], i % 10 == 0).unwrap();
            if i % 3 == 0 {
                w.append_audio(&vec![0; 11 + i % 4]).unwrap();
            }
        }
    });
    let inspection = inspect(Cursor::new(bytes)).unwrap();

    assert!(inspection.index_pages.len() > 4);
    let offsets = paged_offsets(&inspection);
    let mut deduped = offsets.clone();
    deduped.dedup();
    assert_eq!(offsets, deduped);
    assert_eq!(offsets, data_chunk_offsets(&inspection));

    let video_total = inspection.streams[0].super_index.as_ref().unwrap().total_entries();
    assert_eq!(video_total, 40);
    let audio_total = inspection.streams[1].super_index.as_ref().unwrap().total_entries();
    assert_eq!(audio_total, 14);
}

#[test]
fn test_full_super_index_is_reported() {
    let config = WriterConfig {
        max_page_span: 10,
        super_index_capacity: 2,
        ..Default::default()
    };
    let video = VideoConfig::new(16, 16, *b"MJPG", 30.0);
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), video, None, config).unwrap();

    // every frame past the first overflows the tiny window
    writer.append_video_frame(&[0; 16], true).unwrap();
    writer.append_video_frame(&[0; 16], true).unwrap();
    writer.append_video_frame(&[0; 16], true).unwrap();
    let result = writer.append_video_frame(&[0; 16], true);

    assert!(matches!(
        result,
        Err(AviError::SuperIndexFull { capacity: 2, .. })
    ));
}

#[test]
fn test_report_mentions_pages() {
    let bytes = write_in_memory(WriterConfig::default(), None, |w| {
        w.append_video_frame(&[0; 8], true).unwrap();
    });
    let report = inspect(Cursor::new(bytes)).unwrap().to_string();

    assert!(report.contains("LIST 'hdrl'"));
    assert!(report.contains("Main header: 64x48, 1 frames"));
    assert!(report.contains("Index page 00dc"));
}
