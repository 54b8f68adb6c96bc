//! AVI writer
//!
//! Writes the file in two phases. `open` serializes the complete header
//! model with placeholder sizes and counters, then opens the `movi` list.
//! Appends only ever write forward. `close` flushes the index, then seeks back
//! to patch the `movi` size, rewrite the header region in place and patch the
//! RIFF size.
//!
//! Resulting layout:
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     avih
//!     LIST 'strl' { strh strf [indx] }      video
//!     LIST 'strl' { strh strf [indx] }      audio, optional
//!     [LIST 'odml' { dmlh }]
//!   LIST 'movi' { 00dc | 01wb | ix00 | ix01 ... }
//!   idx1 | ix00 [ix01]
//! ```

use crate::chunks::{chunk_ids, list_chunk, padded_len, size_field, ChunkWriter, FourCC, RiffChunk};
use crate::config::{AudioConfig, VideoConfig, WriterConfig};
use crate::error::{AviError, Result};
use crate::header::{
    bits_per_pixel, frame_interval_us, image_size, max_bytes_per_sec, AviFlags, AviHeader,
    OdmlHeader, Rect, StreamDescriptor,
};
use crate::index::{IndexBuilder, IndexStyle, PlacementRecord, StreamKind, SuperIndex};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

/// Offset of the RIFF size field from the start of the file
const RIFF_SIZE_OFFSET: u64 = 4;
/// Offset of the header list: after 'RIFF', size and 'AVI '
const HEADER_OFFSET: u64 = 12;

/// Incremental AVI writer for one video and an optional PCM audio stream.
///
/// Consuming `close` makes appends after close, or a second close,
/// impossible to express.
pub struct AviWriter<W: Write + Seek> {
    out: ChunkWriter<W>,
    config: WriterConfig,
    main_header: AviHeader,
    video: StreamDescriptor,
    audio: Option<StreamDescriptor>,
    /// Fixed at open; codec changes do not recompute it
    bits_per_pixel: u16,
    index: IndexBuilder,
    /// Where the RIFF header starts in the underlying writer
    riff_offset: u64,
    /// Bytes taken by the header list, identical at open and close
    header_len: u64,
    /// Offset of the movi LIST size field
    movi_size_offset: u64,
    /// Offset of the 'movi' list type; idx1 offsets are relative to it
    movi_start: u64,
    guard: CloseGuard,
}

impl AviWriter<BufWriter<File>> {
    /// Create `path` and start an AVI with the default (OpenDML) index
    pub fn open<P: AsRef<Path>>(
        path: P,
        video: VideoConfig,
        audio: Option<AudioConfig>,
    ) -> Result<Self> {
        Self::open_with_config(path, video, audio, WriterConfig::default())
    }

    /// Create `path` and start an AVI with explicit index options
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        video: VideoConfig,
        audio: Option<AudioConfig>,
        config: WriterConfig,
    ) -> Result<Self> {
        // Reject bad options before anything touches the file system
        config.validate()?;
        frame_interval_us(video.fps)?;

        let path = path.as_ref();
        let file = File::create(path)?;
        log::debug!("Opened {} for AVI output", path.display());

        Self::new(BufWriter::new(file), video, audio, config)
    }
}

impl<W: Write + Seek> AviWriter<W> {
    /// Start an AVI at the current position of `writer`
    pub fn new(
        writer: W,
        video: VideoConfig,
        audio: Option<AudioConfig>,
        config: WriterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let interval = frame_interval_us(video.fps)?;

        if !video.fourcc.is_plausible() {
            log::warn!("Given fourcc does not seem to be valid: {:?}", video.fourcc);
        }

        let bits_per_pixel = bits_per_pixel(video.fourcc);
        let video_stream = StreamDescriptor::video(
            video.width,
            video.height,
            video.fourcc,
            interval,
            bits_per_pixel,
        );
        let buffer_size = video_stream.header.suggested_buffer_size;
        let audio_stream = audio.map(|a| StreamDescriptor::audio(&a));

        let main_header = AviHeader {
            microseconds_per_frame: interval,
            max_bytes_per_sec: max_bytes_per_sec(video.width, video.height, video.fps),
            padding_granularity: 0,
            flags: AviFlags {
                has_index: true,
                ..Default::default()
            },
            total_frames: 0,
            initial_frames: 0,
            streams: if audio_stream.is_some() { 2 } else { 1 },
            suggested_buffer_size: buffer_size,
            width: video.width,
            height: video.height,
        };

        let out = ChunkWriter::new(writer)?;
        let riff_offset = out.position();

        let mut writer = AviWriter {
            out,
            index: IndexBuilder::new(&config, audio_stream.is_some()),
            config,
            main_header,
            video: video_stream,
            audio: audio_stream,
            bits_per_pixel,
            riff_offset,
            header_len: 0,
            movi_size_offset: 0,
            movi_start: 0,
            guard: CloseGuard { armed: true },
        };
        writer.write_preamble()?;

        Ok(writer)
    }

    /// RIFF header, header list with placeholder counters, and the start of
    /// the movi list
    fn write_preamble(&mut self) -> Result<()> {
        self.out.write_fourcc(chunk_ids::RIFF)?;
        self.out.write_u32(0)?; // patched at close
        self.out.write_fourcc(chunk_ids::AVI)?;

        self.header_len = self.write_header_list()?;

        self.out.write_fourcc(chunk_ids::LIST)?;
        self.movi_size_offset = self.out.position();
        self.out.write_u32(0)?; // patched at close
        self.movi_start = self.out.position();
        self.out.write_fourcc(chunk_ids::MOVI)?;

        log::debug!(
            "Header written ({} bytes, {} index), movi starts at {}",
            self.header_len,
            self.index.style(),
            self.movi_start
        );

        Ok(())
    }

    /// Append one encoded video frame as a `00dc` chunk
    pub fn append_video_frame(&mut self, data: &[u8], key_frame: bool) -> Result<()> {
        if data.is_empty() {
            return Err(AviError::invalid_argument("video frame is empty"));
        }
        let len = chunk_len(data)?;

        if self.index.video_overflows(self.out.position()) {
            log::debug!(
                "Index page window exceeded at {}, flushing {} records",
                self.out.position(),
                self.index.pending().len()
            );
            self.index.flush_pages(&mut self.out)?;
        }

        self.video.header.length = self.video.header.length.saturating_add(1);

        let position = self.out.position();
        self.index.record(PlacementRecord {
            position,
            len,
            kind: StreamKind::Video,
            key_frame,
        });
        self.out.write_chunk(chunk_ids::VIDEO_FRAME, data)?;

        log::trace!("Video frame {} ({} bytes) at {}", self.video.header.length, len, position);
        Ok(())
    }

    /// Append PCM samples as a `01wb` chunk.
    ///
    /// Audio shares the offset space with video but never triggers an index
    /// page flush itself.
    pub fn append_audio(&mut self, data: &[u8]) -> Result<()> {
        let Some(audio) = self.audio.as_mut() else {
            return Err(AviError::invalid_argument(
                "writer was opened without an audio stream",
            ));
        };
        if data.is_empty() {
            return Err(AviError::invalid_argument("audio buffer is empty"));
        }
        let len = chunk_len(data)?;

        let position = self.out.position();
        self.index.record(PlacementRecord {
            position,
            len,
            kind: StreamKind::Audio,
            key_frame: true,
        });
        self.out.write_chunk(chunk_ids::AUDIO_SAMPLES, data)?;

        let padded = u32::try_from(padded_len(u64::from(len))).unwrap_or(u32::MAX);
        audio.header.length = audio.header.length.saturating_add(padded);

        log::trace!("Audio chunk ({} bytes) at {}", len, position);
        Ok(())
    }

    /// Change the frame rate recorded in the headers
    pub fn set_frame_rate(&mut self, fps: f64) -> Result<()> {
        let interval = frame_interval_us(fps)?;

        self.main_header.microseconds_per_frame = interval;
        self.video.header.scale = interval;
        self.video.header.rate = 1_000_000;

        Ok(())
    }

    /// Change the codec tag recorded in the headers.
    ///
    /// Bits per pixel keeps the value derived from the codec given at open.
    pub fn set_codec(&mut self, fourcc: impl Into<FourCC>) -> Result<()> {
        let fourcc = fourcc.into();
        if !fourcc.is_plausible() {
            log::warn!("Given fourcc does not seem to be valid: {:?}", fourcc);
        }

        self.video.header.handler = fourcc;
        if let Some(format) = self.video.video_format_mut() {
            format.compression = fourcc;
        }

        Ok(())
    }

    /// Change the frame dimensions recorded in the headers
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        let size = image_size(width, height, self.bits_per_pixel);

        self.main_header.max_bytes_per_sec = size;
        self.main_header.width = width;
        self.main_header.height = height;
        self.main_header.suggested_buffer_size = size;

        self.video.header.suggested_buffer_size = size;
        self.video.header.frame = Rect::sized(width, height);
        if let Some(format) = self.video.video_format_mut() {
            format.width = i32::try_from(width).unwrap_or(i32::MAX);
            format.height = i32::try_from(height).unwrap_or(i32::MAX);
            format.image_size = size;
        }

        Ok(())
    }

    /// Finish the file: size the movi list, write the remaining index,
    /// rewrite the header with final counters and size the RIFF.
    ///
    /// Returns the underlying writer, flushed. On error the file is left
    /// structurally invalid.
    pub fn close(mut self) -> Result<W> {
        let movi_end = self.out.position();
        let movi_size = movi_end - self.movi_size_offset - 4;
        self.out
            .patch_u32(self.movi_size_offset, size_field("movi size", movi_size))?;

        self.index.finish(&mut self.out, self.movi_start)?;

        self.main_header.total_frames = self.video.header.length;

        let end = self.out.position();
        self.out.seek_to(self.riff_offset + HEADER_OFFSET)?;
        let rewritten = self.write_header_list()?;
        debug_assert_eq!(rewritten, self.header_len, "header region changed size");
        self.out.seek_to(end)?;

        let riff_size = end - self.riff_offset - 8;
        self.out.patch_u32(
            self.riff_offset + RIFF_SIZE_OFFSET,
            size_field("RIFF size", riff_size),
        )?;
        self.out.flush()?;

        log::debug!(
            "AVI finalized: {} frames, {} bytes",
            self.main_header.total_frames,
            end - self.riff_offset
        );

        self.guard.armed = false;
        Ok(self.out.into_inner())
    }

    /// Serialize and write the whole header list at the current position
    fn write_header_list(&mut self) -> Result<u64> {
        let chunk = self.header_list()?;
        let mut bytes = Vec::with_capacity(chunk.total_size());
        chunk.write(&mut bytes)?;
        self.out.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    fn header_list(&self) -> Result<RiffChunk> {
        let mut children = vec![RiffChunk::new(chunk_ids::AVIH, self.main_header.encode()?)];

        children.push(self.stream_list(&self.video, StreamKind::Video)?);
        if let Some(audio) = &self.audio {
            children.push(self.stream_list(audio, StreamKind::Audio)?);
        }

        if self.index.style() == IndexStyle::OpenDml {
            let dmlh = OdmlHeader {
                total_frames: self.main_header.total_frames,
            };
            children.push(list_chunk(
                chunk_ids::ODML,
                &[RiffChunk::new(chunk_ids::DMLH, dmlh.encode()?)],
            )?);
        }

        list_chunk(chunk_ids::HDRL, &children)
    }

    fn stream_list(&self, stream: &StreamDescriptor, kind: StreamKind) -> Result<RiffChunk> {
        let mut children = vec![
            RiffChunk::new(chunk_ids::STRH, stream.header.encode()?),
            RiffChunk::new(chunk_ids::STRF, stream.format.encode()?),
        ];

        if self.index.style() == IndexStyle::OpenDml {
            if let Some(index) = self.index.super_index(kind) {
                children.push(RiffChunk::new(chunk_ids::INDX, index.encode()?));
            }
        }

        list_chunk(chunk_ids::STRL, &children)
    }

    /// Video frames appended so far
    pub fn frame_count(&self) -> u32 {
        self.video.header.length
    }

    /// Padded audio bytes appended so far, `None` without an audio stream
    pub fn audio_bytes(&self) -> Option<u32> {
        self.audio.as_ref().map(|a| a.header.length)
    }

    /// Current absolute write offset
    pub fn position(&self) -> u64 {
        self.out.position()
    }

    /// Placement records not yet written to an index chunk
    pub fn pending_records(&self) -> &[PlacementRecord] {
        self.index.pending()
    }

    /// Super index of a stream as it will be written at close
    pub fn super_index(&self, kind: StreamKind) -> Option<&SuperIndex> {
        self.index.super_index(kind)
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Main header as it will be written at close
    pub fn main_header(&self) -> &AviHeader {
        &self.main_header
    }

    pub fn video_stream(&self) -> &StreamDescriptor {
        &self.video
    }

    pub fn audio_stream(&self) -> Option<&StreamDescriptor> {
        self.audio.as_ref()
    }
}

/// Declared length of a data chunk
fn chunk_len(data: &[u8]) -> Result<u32> {
    u32::try_from(data.len()).map_err(|_| {
        AviError::invalid_argument(format!("{} byte chunk exceeds 32-bit length", data.len()))
    })
}

/// Warns when a writer is dropped before `close`
struct CloseGuard {
    armed: bool,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if self.armed {
            log::warn!("AVI writer dropped without close; file is left unfinalized");
        }
    }
}
