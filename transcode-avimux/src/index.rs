//! Index builder
//!
//! Collects one [`PlacementRecord`] per chunk written into `movi` and turns
//! them into index chunks. Two layouts are supported:
//!
//! - OpenDML: records are grouped per stream into standard index pages
//!   (`ix00`/`ix01`) whose entries hold 32-bit offsets relative to a 64-bit
//!   page base. Each page is referenced from the stream's super index
//!   (`indx`), which lives in the header and is rewritten at close. A page is
//!   cut whenever the next video chunk would land more than
//!   `max_page_span` bytes past the video base, which keeps the pending record
//!   list bounded regardless of recording length.
//! - Basic: a single `idx1` chunk written at close, with offsets relative to
//!   the `movi` list. Files beyond 4 GiB of movi data cannot be indexed this
//!   way.

use crate::chunks::{chunk_ids, ChunkWriter, FourCC, IndexEntry, CHUNK_HEADER_SIZE};
use crate::config::WriterConfig;
use crate::error::{AviError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Seek, Write};
use std::str::FromStr;

/// Which index structure the writer emits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStyle {
    /// Legacy `idx1`, readable by every AVI 1.0 player
    Basic,
    /// OpenDML super index with standard index pages
    #[default]
    OpenDml,
}

impl FromStr for IndexStyle {
    type Err = AviError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(IndexStyle::Basic),
            "opendml" => Ok(IndexStyle::OpenDml),
            other => Err(AviError::invalid_argument(format!(
                "unknown index style '{}', expected 'basic' or 'opendml'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for IndexStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexStyle::Basic => write!(f, "basic"),
            IndexStyle::OpenDml => write!(f, "opendml"),
        }
    }
}

/// The two streams a file can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    /// Chunk id used for this stream's data chunks in `movi`
    pub fn chunk_id(self) -> FourCC {
        match self {
            StreamKind::Video => chunk_ids::VIDEO_FRAME,
            StreamKind::Audio => chunk_ids::AUDIO_SAMPLES,
        }
    }

    /// Chunk id of this stream's standard index pages
    pub fn index_chunk_id(self) -> FourCC {
        match self {
            StreamKind::Video => chunk_ids::VIDEO_INDEX,
            StreamKind::Audio => chunk_ids::AUDIO_INDEX,
        }
    }
}

/// Where one data chunk landed in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRecord {
    /// Absolute offset of the chunk header
    pub position: u64,
    /// Declared (unpadded) payload length
    pub len: u32,
    /// Stream the chunk belongs to
    pub kind: StreamKind,
    /// Whether the chunk can be decoded on its own
    pub key_frame: bool,
}

/// One entry of a standard index page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardIndexEntry {
    /// Offset of the chunk payload, relative to the page base
    pub offset: u32,
    /// Declared payload length
    pub size: u32,
    /// Key frame flag, stored inverted in bit 31 of the size word
    pub key_frame: bool,
}

/// OpenDML standard index page (AVISTDINDEX)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardIndex {
    /// Data chunk id this page indexes
    pub chunk_id: FourCC,
    /// Absolute offset every entry is relative to
    pub base_offset: u64,
    pub entries: Vec<StandardIndexEntry>,
}

impl StandardIndex {
    /// Bytes before the first entry
    pub const HEADER_SIZE: usize = 24;
    /// Bytes per entry
    pub const ENTRY_SIZE: usize = 8;
    /// Size-word bit marking a chunk that is not a key frame
    pub const NOT_KEYFRAME: u32 = 0x8000_0000;

    const LONGS_PER_ENTRY: u16 = 2;
    const INDEX_OF_CHUNKS: u8 = 0x01;

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = Cursor::new(Vec::with_capacity(
            Self::HEADER_SIZE + self.entries.len() * Self::ENTRY_SIZE,
        ));

        data.write_u16::<LittleEndian>(Self::LONGS_PER_ENTRY)?;
        data.write_u8(0)?; // sub type
        data.write_u8(Self::INDEX_OF_CHUNKS)?;
        data.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        data.write_all(self.chunk_id.as_bytes())?;
        data.write_u64::<LittleEndian>(self.base_offset)?;
        data.write_u32::<LittleEndian>(0)?; // reserved

        for entry in &self.entries {
            data.write_u32::<LittleEndian>(entry.offset)?;
            let mut size = entry.size;
            if !entry.key_frame {
                size |= Self::NOT_KEYFRAME;
            }
            data.write_u32::<LittleEndian>(size)?;
        }

        Ok(data.into_inner())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::HEADER_SIZE {
            return Err(AviError::InsufficientData {
                needed: Self::HEADER_SIZE,
                available: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let _longs_per_entry = cursor.read_u16::<LittleEndian>()?;
        let _sub_type = cursor.read_u8()?;
        let index_type = cursor.read_u8()?;
        if index_type != Self::INDEX_OF_CHUNKS {
            return Err(AviError::InvalidChunk {
                id: *b"ix##",
                message: format!("expected index of chunks, got type {}", index_type),
            });
        }

        let count = cursor.read_u32::<LittleEndian>()? as usize;
        let mut chunk_id = [0u8; 4];
        cursor.read_exact(&mut chunk_id)?;
        let base_offset = cursor.read_u64::<LittleEndian>()?;
        let _reserved = cursor.read_u32::<LittleEndian>()?;

        let needed = Self::HEADER_SIZE + count * Self::ENTRY_SIZE;
        if data.len() < needed {
            return Err(AviError::InsufficientData {
                needed,
                available: data.len(),
            });
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = cursor.read_u32::<LittleEndian>()?;
            let size = cursor.read_u32::<LittleEndian>()?;
            entries.push(StandardIndexEntry {
                offset,
                size: size & !Self::NOT_KEYFRAME,
                key_frame: size & Self::NOT_KEYFRAME == 0,
            });
        }

        Ok(StandardIndex {
            chunk_id: FourCC(chunk_id),
            base_offset,
            entries,
        })
    }
}

/// Reference from a super index to one standard index page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperIndexEntry {
    /// Absolute offset of the page chunk
    pub offset: u64,
    /// Page chunk size including its 8-byte header
    pub size: u32,
    /// Entries in the page
    pub duration: u32,
}

/// OpenDML super index (AVISUPERINDEX) with a fixed number of slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperIndex {
    /// Data chunk id of the indexed stream
    pub chunk_id: FourCC,
    /// Slots reserved on disk
    pub capacity: u32,
    pub entries: Vec<SuperIndexEntry>,
}

impl SuperIndex {
    /// Bytes before the first slot
    pub const HEADER_SIZE: usize = 24;
    /// Bytes per slot
    pub const ENTRY_SIZE: usize = 16;

    const LONGS_PER_ENTRY: u16 = 4;
    const INDEX_OF_INDEXES: u8 = 0x00;

    pub fn new(chunk_id: FourCC, capacity: u32) -> Self {
        SuperIndex {
            chunk_id,
            capacity,
            entries: Vec::new(),
        }
    }

    /// Encoded payload size, independent of how many slots are used
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.capacity as usize * Self::ENTRY_SIZE
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity as usize
    }

    /// Total records across every referenced page
    pub fn total_entries(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.duration)).sum()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = Cursor::new(Vec::with_capacity(self.encoded_len()));

        data.write_u16::<LittleEndian>(Self::LONGS_PER_ENTRY)?;
        data.write_u8(0)?; // sub type
        data.write_u8(Self::INDEX_OF_INDEXES)?;
        data.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        data.write_all(self.chunk_id.as_bytes())?;
        data.write_all(&[0u8; 12])?; // reserved

        for entry in &self.entries {
            data.write_u64::<LittleEndian>(entry.offset)?;
            data.write_u32::<LittleEndian>(entry.size)?;
            data.write_u32::<LittleEndian>(entry.duration)?;
        }
        let unused = (self.capacity as usize).saturating_sub(self.entries.len());
        data.write_all(&vec![0u8; unused * Self::ENTRY_SIZE])?;

        Ok(data.into_inner())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::HEADER_SIZE {
            return Err(AviError::InsufficientData {
                needed: Self::HEADER_SIZE,
                available: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let _longs_per_entry = cursor.read_u16::<LittleEndian>()?;
        let _sub_type = cursor.read_u8()?;
        let index_type = cursor.read_u8()?;
        if index_type != Self::INDEX_OF_INDEXES {
            return Err(AviError::InvalidChunk {
                id: *b"indx",
                message: format!("expected index of indexes, got type {}", index_type),
            });
        }

        let in_use = cursor.read_u32::<LittleEndian>()? as usize;
        let mut chunk_id = [0u8; 4];
        cursor.read_exact(&mut chunk_id)?;
        let mut reserved = [0u8; 12];
        cursor.read_exact(&mut reserved)?;

        let capacity = (data.len() - Self::HEADER_SIZE) / Self::ENTRY_SIZE;
        if in_use > capacity {
            return Err(AviError::InvalidChunk {
                id: *b"indx",
                message: format!("{} entries in use but room for {}", in_use, capacity),
            });
        }

        let mut entries = Vec::with_capacity(in_use);
        for _ in 0..in_use {
            entries.push(SuperIndexEntry {
                offset: cursor.read_u64::<LittleEndian>()?,
                size: cursor.read_u32::<LittleEndian>()?,
                duration: cursor.read_u32::<LittleEndian>()?,
            });
        }

        Ok(SuperIndex {
            chunk_id: FourCC(chunk_id),
            capacity: capacity as u32,
            entries,
        })
    }
}

/// Accumulates placement records and writes index chunks
#[derive(Debug)]
pub struct IndexBuilder {
    style: IndexStyle,
    max_page_span: u64,
    records: Vec<PlacementRecord>,
    video_base: Option<u64>,
    audio_base: Option<u64>,
    video_index: SuperIndex,
    audio_index: Option<SuperIndex>,
}

impl IndexBuilder {
    pub fn new(config: &WriterConfig, has_audio: bool) -> Self {
        let capacity = config.super_index_capacity;
        IndexBuilder {
            style: config.index_style,
            max_page_span: config.max_page_span,
            records: Vec::new(),
            video_base: None,
            audio_base: None,
            video_index: SuperIndex::new(StreamKind::Video.chunk_id(), capacity),
            audio_index: has_audio.then(|| SuperIndex::new(StreamKind::Audio.chunk_id(), capacity)),
        }
    }

    pub fn style(&self) -> IndexStyle {
        self.style
    }

    /// Records not yet written to any index chunk
    pub fn pending(&self) -> &[PlacementRecord] {
        &self.records
    }

    /// Base offset of the page currently being filled for `kind`
    pub fn base(&self, kind: StreamKind) -> Option<u64> {
        match kind {
            StreamKind::Video => self.video_base,
            StreamKind::Audio => self.audio_base,
        }
    }

    /// Super index of a stream; `None` for audio when there is no audio stream
    pub fn super_index(&self, kind: StreamKind) -> Option<&SuperIndex> {
        match kind {
            StreamKind::Video => Some(&self.video_index),
            StreamKind::Audio => self.audio_index.as_ref(),
        }
    }

    /// Whether a video chunk about to be written at `position` falls outside
    /// the current page window.
    ///
    /// The first video chunk after a flush fixes the video base. Only video
    /// appends consult this; audio shares the offset space without checking.
    pub fn video_overflows(&mut self, position: u64) -> bool {
        let base = *self.video_base.get_or_insert(position);
        self.style == IndexStyle::OpenDml && position.saturating_sub(base) > self.max_page_span
    }

    /// Remember where a chunk was written
    pub fn record(&mut self, record: PlacementRecord) {
        let base = match record.kind {
            StreamKind::Video => &mut self.video_base,
            StreamKind::Audio => &mut self.audio_base,
        };
        base.get_or_insert(record.position);
        self.records.push(record);
    }

    /// Write one standard index page per stream with pending records and
    /// reference each from its super index. Clears the records and both
    /// bases.
    pub fn flush_pages<W: Write + Seek>(&mut self, out: &mut ChunkWriter<W>) -> Result<()> {
        let kinds: &[StreamKind] = if self.audio_index.is_some() {
            &[StreamKind::Video, StreamKind::Audio]
        } else {
            &[StreamKind::Video]
        };

        // Refuse before writing anything so a full index never leaves half a flush behind
        for &kind in kinds {
            let index = self.super_index(kind).ok_or_else(|| {
                AviError::invalid_argument("flush for a stream that does not exist")
            })?;
            if index.is_full() && self.records.iter().any(|r| r.kind == kind) {
                return Err(AviError::SuperIndexFull {
                    stream: kind.chunk_id().as_str(),
                    capacity: index.capacity,
                });
            }
        }

        for &kind in kinds {
            let Some(page) = self.build_page(kind)? else {
                continue;
            };

            let offset = out.position();
            let size = out.write_chunk(kind.index_chunk_id(), &page.encode()?)?;
            let entry = SuperIndexEntry {
                offset,
                size: size as u32,
                duration: page.entries.len() as u32,
            };

            log::debug!(
                "Wrote {} page at {} with {} entries (base {})",
                kind.index_chunk_id(),
                offset,
                entry.duration,
                page.base_offset
            );

            match kind {
                StreamKind::Video => self.video_index.entries.push(entry),
                StreamKind::Audio => {
                    if let Some(index) = self.audio_index.as_mut() {
                        index.entries.push(entry);
                    }
                }
            }
        }

        self.reset();
        Ok(())
    }

    /// Write every pending record into one `idx1` chunk.
    ///
    /// `movi_start` is the offset of the `movi` list type field.
    pub fn write_legacy<W: Write + Seek>(
        &mut self,
        out: &mut ChunkWriter<W>,
        movi_start: u64,
    ) -> Result<()> {
        let mut data = Cursor::new(Vec::with_capacity(self.records.len() * IndexEntry::SIZE));

        for record in &self.records {
            let relative = record.position.saturating_sub(movi_start);
            let offset = u32::try_from(relative).map_err(|_| AviError::OffsetOverflow {
                what: "idx1 offset",
                value: relative,
            })?;

            IndexEntry {
                chunk_id: record.kind.chunk_id(),
                flags: if record.key_frame { IndexEntry::KEYFRAME } else { 0 },
                offset,
                size: record.len,
            }
            .write(&mut data)?;
        }

        out.write_chunk(chunk_ids::IDX1, &data.into_inner())?;
        log::debug!("Wrote idx1 with {} entries", self.records.len());

        self.reset();
        Ok(())
    }

    /// Write whatever the configured style needs at close
    pub fn finish<W: Write + Seek>(
        &mut self,
        out: &mut ChunkWriter<W>,
        movi_start: u64,
    ) -> Result<()> {
        match self.style {
            IndexStyle::Basic => self.write_legacy(out, movi_start),
            IndexStyle::OpenDml => self.flush_pages(out),
        }
    }

    fn build_page(&self, kind: StreamKind) -> Result<Option<StandardIndex>> {
        let mut records = self.records.iter().filter(|r| r.kind == kind).peekable();
        let Some(first) = records.peek() else {
            return Ok(None);
        };
        let base_offset = self.base(kind).unwrap_or(first.position);

        let entries = records
            .map(|record| {
                let relative = record.position.saturating_sub(base_offset) + CHUNK_HEADER_SIZE;
                let offset = u32::try_from(relative).map_err(|_| AviError::OffsetOverflow {
                    what: "standard index offset",
                    value: relative,
                })?;
                if record.len & StandardIndex::NOT_KEYFRAME != 0 {
                    return Err(AviError::OffsetOverflow {
                        what: "standard index chunk size",
                        value: u64::from(record.len),
                    });
                }
                Ok(StandardIndexEntry {
                    offset,
                    size: record.len,
                    key_frame: record.key_frame,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(StandardIndex {
            chunk_id: kind.chunk_id(),
            base_offset,
            entries,
        }))
    }

    fn reset(&mut self) {
        self.records.clear();
        self.video_base = None;
        self.audio_base = None;
    }
}
