//! AVI header model
//!
//! In-memory state for the `avih` main header, the per-stream `strh`/`strf`
//! pair and the OpenDML `dmlh` extended header. Every type has an explicit
//! little-endian `encode`/`decode` pair so the on-disk layout never depends on
//! host byte order or struct padding.

use crate::chunks::FourCC;
use crate::config::AudioConfig;
use crate::error::{AviError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Bits per pixel for codecs storing 4:2:0 data
const BPP_420: u16 = 12;
/// Bits per pixel for everything else (packed RGB24)
const BPP_DEFAULT: u16 = 24;

/// Bits per pixel implied by a codec tag.
///
/// I420, X264 and H265 carry 4:2:0 data; any other tag is treated as RGB24.
pub fn bits_per_pixel(fourcc: FourCC) -> u16 {
    match fourcc.as_bytes() {
        b"I420" | b"X264" | b"H265" => BPP_420,
        _ => BPP_DEFAULT,
    }
}

/// Frame interval in microseconds, rounded to nearest
pub fn frame_interval_us(fps: f64) -> Result<u32> {
    // Written as a negated comparison so NaN is rejected too.
    if !(fps >= 1.0) {
        return Err(AviError::invalid_argument(format!(
            "frame rate must be at least 1 fps, got {}",
            fps
        )));
    }
    Ok((1_000_000.0 / fps).round() as u32)
}

/// Uncompressed frame size in bytes for the given geometry
pub fn image_size(width: u32, height: u32, bits_per_pixel: u16) -> u32 {
    let bits = (u64::from(width) * u64::from(height)).saturating_mul(u64::from(bits_per_pixel));
    if bits % 8 != 0 {
        log::warn!(
            "Video buffer size not on a byte boundary: {}x{} at {} bpp",
            width,
            height,
            bits_per_pixel
        );
    }
    u32::try_from(bits / 8).unwrap_or(u32::MAX)
}

/// Data rate advertised in `avih`: RGB24 frames at one more than the
/// integral frame rate.
pub fn max_bytes_per_sec(width: u32, height: u32, fps: f64) -> u32 {
    let rate = (u64::from(width) * u64::from(height))
        .saturating_mul(3)
        .saturating_mul(u64::from(fps as u32) + 1);
    u32::try_from(rate).unwrap_or(u32::MAX)
}

/// AVI main header (avih chunk)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AviHeader {
    /// Microseconds per frame
    pub microseconds_per_frame: u32,
    /// Maximum bytes per second
    pub max_bytes_per_sec: u32,
    /// Padding granularity
    pub padding_granularity: u32,
    /// AVI flags
    pub flags: AviFlags,
    /// Total number of frames
    pub total_frames: u32,
    /// Initial frames (for interleaved files)
    pub initial_frames: u32,
    /// Number of streams
    pub streams: u32,
    /// Suggested buffer size
    pub suggested_buffer_size: u32,
    /// Video width
    pub width: u32,
    /// Video height
    pub height: u32,
}

impl AviHeader {
    /// Encoded payload size
    pub const SIZE: usize = 56;

    /// Calculate frame rate in fps
    pub fn frame_rate(&self) -> f64 {
        if self.microseconds_per_frame > 0 {
            1_000_000.0 / self.microseconds_per_frame as f64
        } else {
            0.0
        }
    }

    /// Serialize the 56-byte payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = Cursor::new(Vec::with_capacity(Self::SIZE));

        data.write_u32::<LittleEndian>(self.microseconds_per_frame)?;
        data.write_u32::<LittleEndian>(self.max_bytes_per_sec)?;
        data.write_u32::<LittleEndian>(self.padding_granularity)?;
        data.write_u32::<LittleEndian>(self.flags.to_u32())?;
        data.write_u32::<LittleEndian>(self.total_frames)?;
        data.write_u32::<LittleEndian>(self.initial_frames)?;
        data.write_u32::<LittleEndian>(self.streams)?;
        data.write_u32::<LittleEndian>(self.suggested_buffer_size)?;
        data.write_u32::<LittleEndian>(self.width)?;
        data.write_u32::<LittleEndian>(self.height)?;
        data.write_all(&[0u8; 16])?; // reserved

        Ok(data.into_inner())
    }

    /// Parse an avih payload
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 40 {
            return Err(AviError::InvalidChunk {
                id: *b"avih",
                message: "Header too short".into(),
            });
        }

        let mut cursor = Cursor::new(data);

        Ok(AviHeader {
            microseconds_per_frame: cursor.read_u32::<LittleEndian>()?,
            max_bytes_per_sec: cursor.read_u32::<LittleEndian>()?,
            padding_granularity: cursor.read_u32::<LittleEndian>()?,
            flags: AviFlags::from_u32(cursor.read_u32::<LittleEndian>()?),
            total_frames: cursor.read_u32::<LittleEndian>()?,
            initial_frames: cursor.read_u32::<LittleEndian>()?,
            streams: cursor.read_u32::<LittleEndian>()?,
            suggested_buffer_size: cursor.read_u32::<LittleEndian>()?,
            width: cursor.read_u32::<LittleEndian>()?,
            height: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// AVI header flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AviFlags {
    /// File has an index
    pub has_index: bool,
    /// File must use index
    pub must_use_index: bool,
    /// File is interleaved
    pub is_interleaved: bool,
    /// Trust chunk type for seeking
    pub trust_chunk_type: bool,
    /// File was captured
    pub was_captured: bool,
    /// File is copyrighted
    pub is_copyrighted: bool,
}

impl AviFlags {
    pub fn from_u32(value: u32) -> Self {
        AviFlags {
            has_index: (value & 0x10) != 0,
            must_use_index: (value & 0x20) != 0,
            is_interleaved: (value & 0x100) != 0,
            trust_chunk_type: (value & 0x800) != 0,
            was_captured: (value & 0x10000) != 0,
            is_copyrighted: (value & 0x20000) != 0,
        }
    }

    pub fn to_u32(self) -> u32 {
        let mut value = 0u32;
        if self.has_index {
            value |= 0x10;
        }
        if self.must_use_index {
            value |= 0x20;
        }
        if self.is_interleaved {
            value |= 0x100;
        }
        if self.trust_chunk_type {
            value |= 0x800;
        }
        if self.was_captured {
            value |= 0x10000;
        }
        if self.is_copyrighted {
            value |= 0x20000;
        }
        value
    }
}

/// Stream header (strh chunk)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Stream type (vids, auds, ...)
    pub stream_type: StreamType,
    /// FourCC handler/codec
    pub handler: FourCC,
    /// Stream flags
    pub flags: u32,
    /// Priority
    pub priority: u16,
    /// Language
    pub language: u16,
    /// Initial frames
    pub initial_frames: u32,
    /// Time scale
    pub scale: u32,
    /// Rate (samples per second = rate/scale)
    pub rate: u32,
    /// Start time
    pub start: u32,
    /// Length (frames for video, accumulated bytes for audio)
    pub length: u32,
    /// Suggested buffer size
    pub suggested_buffer_size: u32,
    /// Quality, -1 lets drivers pick their default
    pub quality: i32,
    /// Sample size (0 for variable)
    pub sample_size: u32,
    /// Frame rectangle
    pub frame: Rect,
}

impl StreamHeader {
    /// Encoded payload size
    pub const SIZE: usize = 56;

    /// Serialize the 56-byte payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = Cursor::new(Vec::with_capacity(Self::SIZE));

        data.write_all(&self.stream_type.to_fourcc())?;
        data.write_all(self.handler.as_bytes())?;
        data.write_u32::<LittleEndian>(self.flags)?;
        data.write_u16::<LittleEndian>(self.priority)?;
        data.write_u16::<LittleEndian>(self.language)?;
        data.write_u32::<LittleEndian>(self.initial_frames)?;
        data.write_u32::<LittleEndian>(self.scale)?;
        data.write_u32::<LittleEndian>(self.rate)?;
        data.write_u32::<LittleEndian>(self.start)?;
        data.write_u32::<LittleEndian>(self.length)?;
        data.write_u32::<LittleEndian>(self.suggested_buffer_size)?;
        data.write_i32::<LittleEndian>(self.quality)?;
        data.write_u32::<LittleEndian>(self.sample_size)?;
        data.write_i16::<LittleEndian>(self.frame.left)?;
        data.write_i16::<LittleEndian>(self.frame.top)?;
        data.write_i16::<LittleEndian>(self.frame.right)?;
        data.write_i16::<LittleEndian>(self.frame.bottom)?;

        Ok(data.into_inner())
    }

    /// Parse a strh payload
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 48 {
            return Err(AviError::InvalidChunk {
                id: *b"strh",
                message: "Stream header too short".into(),
            });
        }

        let mut cursor = Cursor::new(data);
        let mut stream_type = [0u8; 4];
        cursor.read_exact(&mut stream_type)?;
        let mut handler = [0u8; 4];
        cursor.read_exact(&mut handler)?;

        let mut header = StreamHeader {
            stream_type: StreamType::from_fourcc(&stream_type),
            handler: FourCC(handler),
            flags: cursor.read_u32::<LittleEndian>()?,
            priority: cursor.read_u16::<LittleEndian>()?,
            language: cursor.read_u16::<LittleEndian>()?,
            initial_frames: cursor.read_u32::<LittleEndian>()?,
            scale: cursor.read_u32::<LittleEndian>()?,
            rate: cursor.read_u32::<LittleEndian>()?,
            start: cursor.read_u32::<LittleEndian>()?,
            length: cursor.read_u32::<LittleEndian>()?,
            suggested_buffer_size: cursor.read_u32::<LittleEndian>()?,
            quality: cursor.read_i32::<LittleEndian>()?,
            sample_size: cursor.read_u32::<LittleEndian>()?,
            frame: Rect::default(),
        };

        // Some writers emit the short 48-byte form without a frame rectangle
        if data.len() >= Self::SIZE {
            header.frame = Rect {
                left: cursor.read_i16::<LittleEndian>()?,
                top: cursor.read_i16::<LittleEndian>()?,
                right: cursor.read_i16::<LittleEndian>()?,
                bottom: cursor.read_i16::<LittleEndian>()?,
            };
        }

        Ok(header)
    }
}

/// Stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Video,
    Audio,
    Text,
    Midi,
    Unknown([u8; 4]),
}

impl StreamType {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Self {
        match fourcc {
            b"vids" => StreamType::Video,
            b"auds" => StreamType::Audio,
            b"txts" => StreamType::Text,
            b"mids" => StreamType::Midi,
            _ => StreamType::Unknown(*fourcc),
        }
    }

    pub fn to_fourcc(self) -> [u8; 4] {
        match self {
            StreamType::Video => *b"vids",
            StreamType::Audio => *b"auds",
            StreamType::Text => *b"txts",
            StreamType::Midi => *b"mids",
            StreamType::Unknown(fourcc) => fourcc,
        }
    }
}

/// Rectangle structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

impl Rect {
    /// Rectangle anchored at the origin, saturating to the i16 range
    pub fn sized(width: u32, height: u32) -> Self {
        Rect {
            left: 0,
            top: 0,
            right: i16::try_from(width).unwrap_or(i16::MAX),
            bottom: i16::try_from(height).unwrap_or(i16::MAX),
        }
    }
}

/// Video format (BITMAPINFOHEADER)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFormat {
    /// Structure size
    pub size: u32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels (negative for top-down)
    pub height: i32,
    /// Number of planes (always 1)
    pub planes: u16,
    /// Bits per pixel
    pub bit_count: u16,
    /// Compression FourCC
    pub compression: FourCC,
    /// Image size in bytes
    pub image_size: u32,
    /// Horizontal resolution
    pub x_pels_per_meter: i32,
    /// Vertical resolution
    pub y_pels_per_meter: i32,
    /// Colors used
    pub colors_used: u32,
    /// Important colors
    pub colors_important: u32,
}

impl Default for VideoFormat {
    fn default() -> Self {
        VideoFormat {
            size: 40,
            width: 0,
            height: 0,
            planes: 1,
            bit_count: BPP_DEFAULT,
            compression: FourCC(*b"DIB "),
            image_size: 0,
            x_pels_per_meter: 0,
            y_pels_per_meter: 0,
            colors_used: 0,
            colors_important: 0,
        }
    }
}

impl VideoFormat {
    /// Encoded payload size
    pub const SIZE: usize = 40;

    /// Serialize the 40-byte payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = Cursor::new(Vec::with_capacity(Self::SIZE));

        data.write_u32::<LittleEndian>(self.size)?;
        data.write_i32::<LittleEndian>(self.width)?;
        data.write_i32::<LittleEndian>(self.height)?;
        data.write_u16::<LittleEndian>(self.planes)?;
        data.write_u16::<LittleEndian>(self.bit_count)?;
        data.write_all(self.compression.as_bytes())?;
        data.write_u32::<LittleEndian>(self.image_size)?;
        data.write_i32::<LittleEndian>(self.x_pels_per_meter)?;
        data.write_i32::<LittleEndian>(self.y_pels_per_meter)?;
        data.write_u32::<LittleEndian>(self.colors_used)?;
        data.write_u32::<LittleEndian>(self.colors_important)?;

        Ok(data.into_inner())
    }

    /// Parse a video strf payload
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(AviError::InvalidChunk {
                id: *b"strf",
                message: "Video format too short".into(),
            });
        }

        let mut cursor = Cursor::new(data);
        let size = cursor.read_u32::<LittleEndian>()?;
        let width = cursor.read_i32::<LittleEndian>()?;
        let height = cursor.read_i32::<LittleEndian>()?;
        let planes = cursor.read_u16::<LittleEndian>()?;
        let bit_count = cursor.read_u16::<LittleEndian>()?;
        let mut compression = [0u8; 4];
        cursor.read_exact(&mut compression)?;

        Ok(VideoFormat {
            size,
            width,
            height,
            planes,
            bit_count,
            compression: FourCC(compression),
            image_size: cursor.read_u32::<LittleEndian>()?,
            x_pels_per_meter: cursor.read_i32::<LittleEndian>()?,
            y_pels_per_meter: cursor.read_i32::<LittleEndian>()?,
            colors_used: cursor.read_u32::<LittleEndian>()?,
            colors_important: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// Audio format (WAVEFORMATEX)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    /// Format tag
    pub format_tag: u16,
    /// Number of channels
    pub channels: u16,
    /// Samples per second
    pub samples_per_sec: u32,
    /// Average bytes per second
    pub avg_bytes_per_sec: u32,
    /// Block alignment
    pub block_align: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Extra data size
    pub extra_size: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        AudioFormat {
            format_tag: 1, // PCM
            channels: 2,
            samples_per_sec: 44100,
            avg_bytes_per_sec: 176400,
            block_align: 4,
            bits_per_sample: 16,
            extra_size: 0,
        }
    }
}

impl AudioFormat {
    /// Encoded payload size
    pub const SIZE: usize = 18;

    /// Get format name
    pub fn format_name(&self) -> &'static str {
        match self.format_tag {
            0x0001 => "PCM",
            0x0003 => "IEEE Float",
            0x0006 => "A-Law",
            0x0007 => "u-Law",
            0x0055 => "MP3",
            0x00FF => "AAC",
            0x2000 => "AC-3",
            0xFFFE => "Extensible",
            _ => "Unknown",
        }
    }

    /// Serialize the 18-byte payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = Cursor::new(Vec::with_capacity(Self::SIZE));

        data.write_u16::<LittleEndian>(self.format_tag)?;
        data.write_u16::<LittleEndian>(self.channels)?;
        data.write_u32::<LittleEndian>(self.samples_per_sec)?;
        data.write_u32::<LittleEndian>(self.avg_bytes_per_sec)?;
        data.write_u16::<LittleEndian>(self.block_align)?;
        data.write_u16::<LittleEndian>(self.bits_per_sample)?;
        data.write_u16::<LittleEndian>(self.extra_size)?;

        Ok(data.into_inner())
    }

    /// Parse an audio strf payload (16-byte PCMWAVEFORMAT is accepted)
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 16 {
            return Err(AviError::InvalidChunk {
                id: *b"strf",
                message: "Audio format too short".into(),
            });
        }

        let mut cursor = Cursor::new(data);

        Ok(AudioFormat {
            format_tag: cursor.read_u16::<LittleEndian>()?,
            channels: cursor.read_u16::<LittleEndian>()?,
            samples_per_sec: cursor.read_u32::<LittleEndian>()?,
            avg_bytes_per_sec: cursor.read_u32::<LittleEndian>()?,
            block_align: cursor.read_u16::<LittleEndian>()?,
            bits_per_sample: cursor.read_u16::<LittleEndian>()?,
            extra_size: if data.len() >= Self::SIZE {
                cursor.read_u16::<LittleEndian>()?
            } else {
                0
            },
        })
    }
}

/// OpenDML extended header (dmlh chunk inside LIST odml)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OdmlHeader {
    /// Frames in the whole file, across every RIFF
    pub total_frames: u32,
}

impl OdmlHeader {
    /// Encoded payload size: one counter plus 61 reserved words
    pub const SIZE: usize = 248;

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = Cursor::new(Vec::with_capacity(Self::SIZE));
        data.write_u32::<LittleEndian>(self.total_frames)?;
        data.write_all(&[0u8; Self::SIZE - 4])?;
        Ok(data.into_inner())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(AviError::InvalidChunk {
                id: *b"dmlh",
                message: "Extended header too short".into(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(OdmlHeader {
            total_frames: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// Type-specific format block of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFormat {
    Video(VideoFormat),
    Audio(AudioFormat),
}

impl StreamFormat {
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            StreamFormat::Video(format) => format.encode(),
            StreamFormat::Audio(format) => format.encode(),
        }
    }
}

/// Header and format of one stream, as written into its `strl` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub header: StreamHeader,
    pub format: StreamFormat,
}

impl StreamDescriptor {
    /// Video stream descriptor
    pub fn video(
        width: u32,
        height: u32,
        fourcc: FourCC,
        frame_interval_us: u32,
        bits_per_pixel: u16,
    ) -> Self {
        let size = image_size(width, height, bits_per_pixel);

        StreamDescriptor {
            header: StreamHeader {
                stream_type: StreamType::Video,
                handler: fourcc,
                flags: 0,
                priority: 0,
                language: 0,
                initial_frames: 0,
                scale: frame_interval_us,
                rate: 1_000_000,
                start: 0,
                length: 0,
                suggested_buffer_size: size,
                quality: 0,
                sample_size: 0,
                frame: Rect::sized(width, height),
            },
            format: StreamFormat::Video(VideoFormat {
                width: i32::try_from(width).unwrap_or(i32::MAX),
                height: i32::try_from(height).unwrap_or(i32::MAX),
                bit_count: bits_per_pixel,
                compression: fourcc,
                image_size: size,
                ..Default::default()
            }),
        }
    }

    /// PCM audio stream descriptor
    pub fn audio(config: &AudioConfig) -> Self {
        let block_align = config.block_align();
        let samples_per_second = config.samples_per_second;
        let bytes_per_second = u32::from(block_align).saturating_mul(samples_per_second);

        StreamDescriptor {
            header: StreamHeader {
                stream_type: StreamType::Audio,
                handler: FourCC([1, 0, 0, 0]),
                flags: 0,
                priority: 0,
                language: 0,
                initial_frames: 0,
                scale: 1,
                rate: samples_per_second,
                start: 0,
                length: 0,
                suggested_buffer_size: bytes_per_second,
                quality: -1,
                sample_size: u32::from(block_align),
                frame: Rect::default(),
            },
            format: StreamFormat::Audio(AudioFormat {
                format_tag: 1,
                channels: config.channels,
                samples_per_sec: samples_per_second,
                avg_bytes_per_sec: bytes_per_second,
                block_align,
                bits_per_sample: config.bits,
                extra_size: 0,
            }),
        }
    }

    /// Video format block, if this is a video stream
    pub fn video_format_mut(&mut self) -> Option<&mut VideoFormat> {
        match &mut self.format {
            StreamFormat::Video(format) => Some(format),
            StreamFormat::Audio(_) => None,
        }
    }
}
