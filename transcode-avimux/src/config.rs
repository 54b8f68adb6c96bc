//! Writer configuration

use crate::chunks::{FourCC, CHUNK_HEADER_SIZE};
use crate::error::{AviError, Result};
use crate::index::IndexStyle;
use serde::{Deserialize, Serialize};

/// Relative-offset window of one standard index page (2^31 - 1)
pub const DEFAULT_MAX_PAGE_SPAN: u64 = 0x7FFF_FFFF;

/// Super index slots reserved per stream
pub const DEFAULT_SUPER_INDEX_CAPACITY: u32 = 256;

/// Index and layout options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Which index structure to emit
    pub index_style: IndexStyle,
    /// Super index slots reserved in each stream header.
    ///
    /// The header is rewritten in place at close, so this bounds the number
    /// of index pages (and thus the recording length) per stream.
    pub super_index_capacity: u32,
    /// Relative offset from the video index base beyond which the pending
    /// records are flushed into a new page
    pub max_page_span: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            index_style: IndexStyle::OpenDml,
            super_index_capacity: DEFAULT_SUPER_INDEX_CAPACITY,
            max_page_span: DEFAULT_MAX_PAGE_SPAN,
        }
    }
}

impl WriterConfig {
    /// Legacy idx1-only configuration
    pub fn basic() -> Self {
        WriterConfig {
            index_style: IndexStyle::Basic,
            ..Default::default()
        }
    }

    /// Check that every page the configuration allows can be finalized.
    ///
    /// A standard index entry stores `offset + 8` in a u32, so the page span
    /// may not exceed `u32::MAX - 8`.
    pub fn validate(&self) -> Result<()> {
        if self.super_index_capacity == 0 {
            return Err(AviError::invalid_argument(
                "super index capacity must be at least 1",
            ));
        }
        let limit = u64::from(u32::MAX) - CHUNK_HEADER_SIZE;
        if self.max_page_span > limit {
            return Err(AviError::invalid_argument(format!(
                "max page span {} exceeds {}",
                self.max_page_span, limit
            )));
        }
        Ok(())
    }
}

/// Video stream parameters given at open
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Codec tag
    #[serde(with = "fourcc_string")]
    pub fourcc: FourCC,
    /// Frames per second, at least 1
    pub fps: f64,
}

impl VideoConfig {
    pub fn new(width: u32, height: u32, fourcc: impl Into<FourCC>, fps: f64) -> Self {
        VideoConfig {
            width,
            height,
            fourcc: fourcc.into(),
            fps,
        }
    }
}

/// PCM audio parameters; the audio stream exists only when this is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Channel count
    pub channels: u16,
    /// Bits per sample
    pub bits: u16,
    /// Sample rate in Hz
    pub samples_per_second: u32,
}

impl AudioConfig {
    pub fn new(channels: u16, bits: u16, samples_per_second: u32) -> Self {
        AudioConfig {
            channels,
            bits,
            samples_per_second,
        }
    }

    /// Bytes per sample frame across all channels
    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(self.bits / 8)
    }
}

mod fourcc_string {
    use crate::chunks::FourCC;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(fourcc: &FourCC, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&fourcc.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FourCC, D::Error> {
        let s = String::deserialize(deserializer)?;
        FourCC::from_str(&s)
            .ok_or_else(|| D::Error::custom(format!("fourcc must be 4 bytes, got {:?}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WriterConfig::default();
        assert_eq!(config.index_style, IndexStyle::OpenDml);
        assert_eq!(config.max_page_span, 0x7FFF_FFFF);
        assert_eq!(config.super_index_capacity, 256);

        assert_eq!(WriterConfig::basic().index_style, IndexStyle::Basic);
    }

    #[test]
    fn test_validate() {
        assert!(WriterConfig::default().validate().is_ok());
        assert!(WriterConfig::basic().validate().is_ok());

        let zero_capacity = WriterConfig {
            super_index_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_capacity.validate(),
            Err(AviError::InvalidArgument(_))
        ));

        let widest = WriterConfig {
            max_page_span: u64::from(u32::MAX) - 8,
            ..Default::default()
        };
        assert!(widest.validate().is_ok());

        let too_wide = WriterConfig {
            max_page_span: u64::from(u32::MAX) - 7,
            ..Default::default()
        };
        assert!(matches!(too_wide.validate(), Err(AviError::InvalidArgument(_))));

        let unbounded = WriterConfig {
            max_page_span: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(unbounded.validate(), Err(AviError::InvalidArgument(_))));
    }

    #[test]
    fn test_writer_config_json() {
        let config: WriterConfig = serde_json::from_str(r#"{"index_style":"basic"}"#).unwrap();
        assert_eq!(config.index_style, IndexStyle::Basic);
        assert_eq!(config.max_page_span, DEFAULT_MAX_PAGE_SPAN);

        let json = serde_json::to_string(&WriterConfig::default()).unwrap();
        assert!(json.contains("\"opendml\""));
        let decoded: WriterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, WriterConfig::default());
    }

    #[test]
    fn test_video_config_json() {
        let config = VideoConfig::new(320, 240, *b"I420", 30.0);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"I420\""));
        let decoded: VideoConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);

        let bad = r#"{"width":1,"height":1,"fourcc":"H26","fps":30.0}"#;
        assert!(serde_json::from_str::<VideoConfig>(bad).is_err());
    }

    #[test]
    fn test_audio_block_align() {
        assert_eq!(AudioConfig::new(2, 16, 44100).block_align(), 4);
        assert_eq!(AudioConfig::new(1, 8, 8000).block_align(), 1);
    }
}
