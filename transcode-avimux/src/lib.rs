//! Incremental AVI writer
//!
//! Records one video stream and an optional PCM audio stream into a RIFF AVI
//! file, frame by frame, without knowing the length of the recording up
//! front. The header is written with placeholder counters at open and
//! rewritten in place at close.
//!
//! Two index styles are supported:
//!
//! - OpenDML (default): each stream carries a fixed-size super index in its
//!   header that points at standard index pages (`ix00`, `ix01`). A new page
//!   starts whenever the next video chunk would lie more than 2^31 - 1 bytes
//!   past the base of the current page, keeping every 32-bit relative offset
//!   valid.
//! - Basic: a single legacy `idx1` index after the `movi` list.
//!
//! # Example
//!
//! ```no_run
//! use transcode_avimux::{AudioConfig, AviWriter, VideoConfig};
//!
//! let video = VideoConfig::new(320, 240, *b"I420", 30.0);
//! let audio = AudioConfig::new(2, 16, 44100);
//! let mut writer = AviWriter::open("capture.avi", video, Some(audio))?;
//!
//! let frame = vec![0u8; 320 * 240 * 3 / 2];
//! writer.append_video_frame(&frame, true)?;
//! writer.append_audio(&[0u8; 5880])?;
//!
//! writer.close()?;
//! # Ok::<(), transcode_avimux::AviError>(())
//! ```
//!
//! An existing file can be checked with [`inspect`]:
//!
//! ```no_run
//! let file = std::fs::File::open("capture.avi")?;
//! let report = transcode_avimux::inspect(file)?;
//! println!("{}", report);
//! # Ok::<(), transcode_avimux::AviError>(())
//! ```

mod chunks;
mod config;
mod error;
mod header;
mod index;
mod inspect;
mod muxer;

pub use chunks::{chunk_ids, padded_len, ChunkWriter, FourCC, IndexEntry, RiffChunk};
pub use config::{
    AudioConfig, VideoConfig, WriterConfig, DEFAULT_MAX_PAGE_SPAN, DEFAULT_SUPER_INDEX_CAPACITY,
};
pub use error::{AviError, Result};
pub use header::{
    bits_per_pixel, AudioFormat, AviFlags, AviHeader, OdmlHeader, Rect, StreamDescriptor,
    StreamFormat, StreamHeader, StreamType, VideoFormat,
};
pub use index::{
    IndexStyle, PlacementRecord, StandardIndex, StandardIndexEntry, StreamKind, SuperIndex,
    SuperIndexEntry,
};
pub use inspect::{inspect, ChunkNode, IndexPage, Inspection, StreamInfo};
pub use muxer::AviWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ids() {
        assert_eq!(chunk_ids::RIFF.as_str(), "RIFF");
        assert_eq!(chunk_ids::AVI.as_str(), "AVI ");
        assert_eq!(chunk_ids::MOVI.as_str(), "movi");
        assert_eq!(StreamKind::Video.index_chunk_id().as_str(), "ix00");
        assert_eq!(StreamKind::Audio.chunk_id().as_str(), "01wb");
    }
}
