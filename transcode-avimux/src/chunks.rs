//! RIFF chunk framing
//!
//! Every chunk is a 4-byte id, a little-endian 32-bit payload length and the
//! payload itself. Payloads of odd length are followed by one zero pad byte
//! that is not counted in the length field.

use crate::error::{AviError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// FourCC (Four Character Code) identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create from bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }

    /// Create from string (must be exactly 4 bytes)
    pub fn from_str(s: &str) -> Option<Self> {
        let bytes: [u8; 4] = s.as_bytes().try_into().ok()?;
        Some(FourCC(bytes))
    }

    /// Get as string
    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.0).to_string()
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// True when every byte is an ASCII letter, digit or space.
    ///
    /// Codec tags outside that alphabet are legal on disk but almost always a
    /// caller mistake, so the writer only warns about them.
    pub fn is_plausible(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_alphanumeric() || *b == b' ')
    }
}

impl std::fmt::Debug for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCC(\"{}\")", self.as_str())
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(bytes: &[u8; 4]) -> Self {
        FourCC(*bytes)
    }
}

/// Well-known chunk IDs
pub mod chunk_ids {
    use super::FourCC;

    pub const RIFF: FourCC = FourCC(*b"RIFF");
    pub const AVI: FourCC = FourCC(*b"AVI ");
    pub const LIST: FourCC = FourCC(*b"LIST");
    pub const HDRL: FourCC = FourCC(*b"hdrl");
    pub const AVIH: FourCC = FourCC(*b"avih");
    pub const STRL: FourCC = FourCC(*b"strl");
    pub const STRH: FourCC = FourCC(*b"strh");
    pub const STRF: FourCC = FourCC(*b"strf");
    pub const INDX: FourCC = FourCC(*b"indx");
    pub const MOVI: FourCC = FourCC(*b"movi");
    pub const IDX1: FourCC = FourCC(*b"idx1");
    pub const ODML: FourCC = FourCC(*b"odml");
    pub const DMLH: FourCC = FourCC(*b"dmlh");

    /// Video frame chunk of stream 0
    pub const VIDEO_FRAME: FourCC = FourCC(*b"00dc");
    /// Audio chunk of stream 1
    pub const AUDIO_SAMPLES: FourCC = FourCC(*b"01wb");
    /// Standard index page of stream 0
    pub const VIDEO_INDEX: FourCC = FourCC(*b"ix00");
    /// Standard index page of stream 1
    pub const AUDIO_INDEX: FourCC = FourCC(*b"ix01");
}

/// Size of a chunk header (id + length)
pub const CHUNK_HEADER_SIZE: u64 = 8;

/// Payload length rounded up to the RIFF word boundary
pub fn padded_len(len: u64) -> u64 {
    len + (len & 1)
}

/// Writer that frames RIFF chunks and tracks its own file position.
///
/// The position is counted rather than queried so that appends through a
/// `BufWriter` never force a flush; only the explicit seeks used for
/// patch-back touch the underlying stream position.
pub struct ChunkWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write + Seek> ChunkWriter<W> {
    /// Wrap a writer, starting from its current position
    pub fn new(mut inner: W) -> Result<Self> {
        let position = inner.stream_position()?;
        Ok(ChunkWriter { inner, position })
    }

    /// Current absolute offset
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write raw bytes
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Write a FourCC
    pub fn write_fourcc(&mut self, id: FourCC) -> Result<()> {
        self.write_all(id.as_bytes())
    }

    /// Write a little-endian u32
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.inner.write_u32::<LittleEndian>(value)?;
        self.position += 4;
        Ok(())
    }

    /// Write a complete chunk, padding odd payloads.
    ///
    /// Returns the number of bytes written including header and padding.
    pub fn write_chunk(&mut self, id: FourCC, payload: &[u8]) -> Result<u64> {
        let len = u32::try_from(payload.len()).map_err(|_| AviError::OffsetOverflow {
            what: "chunk length",
            value: payload.len() as u64,
        })?;

        self.write_fourcc(id)?;
        self.write_u32(len)?;
        self.write_all(payload)?;
        if len % 2 != 0 {
            self.write_all(&[0])?;
        }

        Ok(CHUNK_HEADER_SIZE + padded_len(u64::from(len)))
    }

    /// Move to an absolute offset
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.position = self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Overwrite a u32 at `offset`, then return to the current position
    pub fn patch_u32(&mut self, offset: u64, value: u32) -> Result<()> {
        let resume = self.position;
        self.seek_to(offset)?;
        self.write_u32(value)?;
        self.seek_to(resume)
    }

    /// Flush buffered bytes to the underlying writer
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Clamp a 64-bit size to a 32-bit RIFF size field
pub(crate) fn size_field(what: &str, value: u64) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| {
        log::warn!("{} {} exceeds 32 bits, saturating", what, value);
        u32::MAX
    })
}

/// RIFF chunk
#[derive(Debug, Clone)]
pub struct RiffChunk {
    /// Chunk ID
    pub id: FourCC,
    /// Chunk data
    pub data: Vec<u8>,
}

impl RiffChunk {
    /// Create new chunk
    pub fn new(id: FourCC, data: Vec<u8>) -> Self {
        RiffChunk { id, data }
    }

    /// Write chunk to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.id.as_bytes())?;
        writer.write_u32::<LittleEndian>(self.data.len() as u32)?;
        writer.write_all(&self.data)?;

        // Pad to word boundary
        if self.data.len() % 2 != 0 {
            writer.write_all(&[0])?;
        }

        Ok(())
    }

    /// Total size including header and padding
    pub fn total_size(&self) -> usize {
        8 + ((self.data.len() + 1) & !1)
    }
}

/// Build a LIST chunk around already-encoded child chunks
pub(crate) fn list_chunk(list_type: FourCC, children: &[RiffChunk]) -> Result<RiffChunk> {
    let mut data = Cursor::new(Vec::new());
    data.write_all(list_type.as_bytes())?;
    for child in children {
        child.write(&mut data)?;
    }
    Ok(RiffChunk::new(chunk_ids::LIST, data.into_inner()))
}

/// Read a chunk header, returning id and declared payload length
pub(crate) fn read_chunk_header<R: Read>(reader: &mut R) -> Result<(FourCC, u32)> {
    let mut id = [0u8; 4];
    reader.read_exact(&mut id)?;
    let size = reader.read_u32::<LittleEndian>()?;
    Ok((FourCC(id), size))
}

/// AVI index entry (idx1 format)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Chunk ID
    pub chunk_id: FourCC,
    /// Flags
    pub flags: u32,
    /// Offset from the movi list type field
    pub offset: u32,
    /// Size of chunk data
    pub size: u32,
}

impl IndexEntry {
    /// Index flags
    pub const KEYFRAME: u32 = 0x10;

    /// Encoded size of one entry
    pub const SIZE: usize = 16;

    /// Read from data
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(AviError::InsufficientData {
                needed: Self::SIZE,
                available: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let mut id_bytes = [0u8; 4];
        cursor.read_exact(&mut id_bytes)?;

        Ok(IndexEntry {
            chunk_id: FourCC(id_bytes),
            flags: cursor.read_u32::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
            size: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Write to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.chunk_id.as_bytes())?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    /// Check if this is a keyframe
    pub fn is_keyframe(&self) -> bool {
        (self.flags & Self::KEYFRAME) != 0
    }
}

/// Parse idx1 index
pub fn parse_index(data: &[u8]) -> Vec<IndexEntry> {
    data.chunks_exact(IndexEntry::SIZE)
        .filter_map(|entry| IndexEntry::read(entry).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc() {
        let fourcc = FourCC::new(*b"RIFF");
        assert_eq!(fourcc.as_str(), "RIFF");
        assert_eq!(fourcc.as_bytes(), b"RIFF");

        let fourcc2 = FourCC::from_str("AVI ").unwrap();
        assert_eq!(fourcc2.as_str(), "AVI ");
        assert!(FourCC::from_str("H26").is_none());
        assert!(FourCC::from_str("H2655").is_none());
    }

    #[test]
    fn test_fourcc_plausible() {
        assert!(FourCC::new(*b"I420").is_plausible());
        assert!(FourCC::new(*b"DIB ").is_plausible());
        assert!(!FourCC::new([1, 0, 0, 0]).is_plausible());
        assert!(!FourCC::new(*b"x-26").is_plausible());
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 2);
        assert_eq!(padded_len(2), 2);
        assert_eq!(padded_len(115_201), 115_202);
    }

    #[test]
    fn test_chunk_writer_pads_odd_payload() {
        let mut out = ChunkWriter::new(Cursor::new(Vec::new())).unwrap();
        let written = out.write_chunk(FourCC(*b"00dc"), &[1, 2, 3]).unwrap();
        assert_eq!(written, 12);
        assert_eq!(out.position(), 12);

        let bytes = out.into_inner().into_inner();
        assert_eq!(&bytes[0..4], b"00dc");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 3);
        assert_eq!(&bytes[8..], &[1, 2, 3, 0]);
    }

    #[test]
    fn test_chunk_writer_patch_restores_position() {
        let mut out = ChunkWriter::new(Cursor::new(Vec::new())).unwrap();
        out.write_fourcc(chunk_ids::RIFF).unwrap();
        out.write_u32(0).unwrap();
        out.write_all(&[0xAA; 10]).unwrap();

        out.patch_u32(4, 0xDEAD_BEEF).unwrap();
        assert_eq!(out.position(), 18);
        out.write_all(&[0xBB]).unwrap();

        let bytes = out.into_inner().into_inner();
        assert_eq!(bytes.len(), 19);
        assert_eq!(&bytes[4..8], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(bytes[18], 0xBB);
    }

    #[test]
    fn test_chunk_writer_starts_at_stream_position() {
        let mut cursor = Cursor::new(vec![0u8; 6]);
        cursor.set_position(6);
        let out = ChunkWriter::new(cursor).unwrap();
        assert_eq!(out.position(), 6);
    }

    #[test]
    fn test_size_field_saturates() {
        assert_eq!(size_field("RIFF size", 10), 10);
        assert_eq!(size_field("RIFF size", u64::from(u32::MAX) + 7), u32::MAX);
    }

    #[test]
    fn test_list_chunk() {
        let list = list_chunk(
            chunk_ids::STRL,
            &[
                RiffChunk::new(chunk_ids::STRH, vec![0; 56]),
                RiffChunk::new(FourCC(*b"test"), vec![1, 2, 3]),
            ],
        )
        .unwrap();

        assert_eq!(list.id, chunk_ids::LIST);
        assert_eq!(&list.data[0..4], b"strl");
        // type + strh(8+56) + test(8+3+1)
        assert_eq!(list.data.len(), 4 + 64 + 12);
    }

    #[test]
    fn test_index_entry() {
        let entry = IndexEntry {
            chunk_id: FourCC(*b"00dc"),
            flags: IndexEntry::KEYFRAME,
            offset: 1000,
            size: 5000,
        };

        assert!(entry.is_keyframe());

        let mut buffer = Vec::new();
        entry.write(&mut buffer).unwrap();
        assert_eq!(buffer.len(), IndexEntry::SIZE);
        assert_eq!(IndexEntry::read(&buffer).unwrap(), entry);
    }

    #[test]
    fn test_parse_index_ignores_trailing_bytes() {
        let mut data = Vec::new();
        for (id, flags) in [(*b"00dc", IndexEntry::KEYFRAME), (*b"01wb", 0)] {
            IndexEntry {
                chunk_id: FourCC(id),
                flags,
                offset: 4,
                size: 10,
            }
            .write(&mut data)
            .unwrap();
        }
        data.extend_from_slice(&[0xFF; 7]);

        let entries = parse_index(&data);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_keyframe());
        assert!(!entries[1].is_keyframe());
    }
}
