//! Read-only AVI inspector
//!
//! Walks the chunk tree of an existing file, decodes the headers and every
//! index it finds, and renders a plain-text report. Nothing here is used by
//! the writer.

use crate::chunks::{chunk_ids, parse_index, read_chunk_header, FourCC, IndexEntry, CHUNK_HEADER_SIZE};
use crate::error::{AviError, Result};
use crate::header::{AudioFormat, AviHeader, OdmlHeader, StreamFormat, StreamHeader, StreamType, VideoFormat};
use crate::index::{StandardIndex, SuperIndex};
use std::fmt;
use std::io::{Read, Seek, SeekFrom};

/// Lists nested deeper than this are rejected
const MAX_DEPTH: usize = 16;

/// Children of one list printed before the rest is summarized
const REPORT_CHILDREN: usize = 6;

/// One chunk or list in the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkNode {
    /// Chunk id (`LIST` for lists)
    pub id: FourCC,
    /// List type, for `LIST` chunks
    pub list_type: Option<FourCC>,
    /// Absolute offset of the chunk header
    pub offset: u64,
    /// Declared payload length
    pub size: u32,
    pub children: Vec<ChunkNode>,
}

impl ChunkNode {
    /// Depth-first search for a chunk id or list type
    pub fn find(&self, id: FourCC) -> Option<&ChunkNode> {
        if self.id == id || self.list_type == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

/// Headers of one `strl` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub header: StreamHeader,
    pub format: Option<StreamFormat>,
    pub super_index: Option<SuperIndex>,
}

impl StreamInfo {
    pub fn is_video(&self) -> bool {
        self.header.stream_type == StreamType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.header.stream_type == StreamType::Audio
    }
}

/// Standard index page reached through a super index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPage {
    /// Stream whose super index references the page
    pub stream: usize,
    /// Absolute offset of the page chunk
    pub offset: u64,
    pub index: StandardIndex,
}

impl IndexPage {
    /// Absolute chunk header offsets of every entry
    pub fn chunk_positions(&self) -> impl Iterator<Item = u64> + '_ {
        self.index.entries.iter().map(move |e| {
            (self.index.base_offset + u64::from(e.offset)).saturating_sub(CHUNK_HEADER_SIZE)
        })
    }
}

/// Everything decoded from a file
#[derive(Debug, Clone, Default)]
pub struct Inspection {
    /// Bytes in the underlying file
    pub file_size: u64,
    /// Declared RIFF payload length
    pub riff_size: u32,
    /// Top-level chunks inside the RIFF
    pub chunks: Vec<ChunkNode>,
    pub main_header: Option<AviHeader>,
    pub streams: Vec<StreamInfo>,
    pub odml: Option<OdmlHeader>,
    /// Offset of the 'movi' list type field
    pub movi_offset: Option<u64>,
    /// Legacy idx1 entries
    pub legacy_index: Vec<IndexEntry>,
    pub index_pages: Vec<IndexPage>,
}

impl Inspection {
    /// Depth-first search across the whole tree
    pub fn find(&self, id: FourCC) -> Option<&ChunkNode> {
        self.chunks.iter().find_map(|c| c.find(id))
    }

    /// Data and index chunks directly inside the movi list
    pub fn movi_chunks(&self) -> &[ChunkNode] {
        self.find(chunk_ids::MOVI)
            .map(|movi| movi.children.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the declared RIFF size covers the file exactly
    pub fn riff_size_matches(&self) -> bool {
        u64::from(self.riff_size) + CHUNK_HEADER_SIZE == self.file_size
    }
}

/// Walk and decode an AVI file
pub fn inspect<R: Read + Seek>(mut reader: R) -> Result<Inspection> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    if file_size < 12 {
        return Err(AviError::InsufficientData {
            needed: 12,
            available: file_size as usize,
        });
    }

    let (riff, riff_size) = read_chunk_header(&mut reader)?;
    if riff != chunk_ids::RIFF {
        return Err(AviError::InvalidRiff);
    }
    let mut form = [0u8; 4];
    reader.read_exact(&mut form)?;
    if FourCC(form) != chunk_ids::AVI {
        return Err(AviError::InvalidAvi);
    }

    let declared_end = CHUNK_HEADER_SIZE + u64::from(riff_size);
    let end = if riff_size == 0 || declared_end > file_size {
        log::warn!(
            "RIFF size {} does not fit a {} byte file, walking to end of file",
            riff_size,
            file_size
        );
        file_size
    } else {
        declared_end
    };

    let mut walker = Walker {
        reader,
        inspection: Inspection {
            file_size,
            riff_size,
            ..Default::default()
        },
    };
    walker.inspection.chunks = walker.walk(12, end, 0)?;
    walker.follow_super_indexes()?;

    log::debug!(
        "Inspected {} bytes: {} streams, {} idx1 entries, {} index pages",
        file_size,
        walker.inspection.streams.len(),
        walker.inspection.legacy_index.len(),
        walker.inspection.index_pages.len()
    );

    Ok(walker.inspection)
}

struct Walker<R> {
    reader: R,
    inspection: Inspection,
}

impl<R: Read + Seek> Walker<R> {
    /// Parse the chunks laid out in `[start, end)`
    fn walk(&mut self, start: u64, end: u64, depth: usize) -> Result<Vec<ChunkNode>> {
        if depth > MAX_DEPTH {
            return Err(AviError::InvalidChunk {
                id: *b"LIST",
                message: format!("lists nested deeper than {}", MAX_DEPTH),
            });
        }

        let mut nodes = Vec::new();
        let mut pos = start;

        while pos + CHUNK_HEADER_SIZE <= end {
            self.reader.seek(SeekFrom::Start(pos))?;
            let (id, size) = read_chunk_header(&mut self.reader)?;
            let data_start = pos + CHUNK_HEADER_SIZE;
            let data_end = data_start + u64::from(size);
            if data_end > end {
                return Err(AviError::InvalidChunk {
                    id: id.0,
                    message: format!("{} bytes at {} run past offset {}", size, pos, end),
                });
            }

            let mut node = ChunkNode {
                id,
                list_type: None,
                offset: pos,
                size,
                children: Vec::new(),
            };

            if id == chunk_ids::LIST && size >= 4 {
                let mut list_type = [0u8; 4];
                self.reader.read_exact(&mut list_type)?;
                let list_type = FourCC(list_type);
                if list_type == chunk_ids::MOVI {
                    self.inspection.movi_offset = Some(data_start);
                }
                node.list_type = Some(list_type);
                node.children = self.walk(data_start + 4, data_end, depth + 1)?;
            } else {
                self.decode_leaf(id, size)?;
            }

            nodes.push(node);
            pos = data_end + u64::from(size & 1);
        }

        Ok(nodes)
    }

    /// Decode a known leaf; the reader sits at its payload
    fn decode_leaf(&mut self, id: FourCC, size: u32) -> Result<()> {
        let wanted = [
            chunk_ids::AVIH,
            chunk_ids::STRH,
            chunk_ids::STRF,
            chunk_ids::INDX,
            chunk_ids::DMLH,
            chunk_ids::IDX1,
        ];
        if !wanted.contains(&id) {
            return Ok(());
        }

        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;

        match id {
            chunk_ids::AVIH => {
                let header = AviHeader::decode(&data)?;
                log::debug!(
                    "avih: {}x{}, {} frames, {:.2} fps",
                    header.width,
                    header.height,
                    header.total_frames,
                    header.frame_rate()
                );
                self.inspection.main_header = Some(header);
            }
            chunk_ids::STRH => {
                self.inspection.streams.push(StreamInfo {
                    header: StreamHeader::decode(&data)?,
                    format: None,
                    super_index: None,
                });
            }
            chunk_ids::STRF => {
                let stream = self.current_stream(id)?;
                stream.format = match stream.header.stream_type {
                    StreamType::Video => Some(StreamFormat::Video(VideoFormat::decode(&data)?)),
                    StreamType::Audio => Some(StreamFormat::Audio(AudioFormat::decode(&data)?)),
                    _ => None,
                };
            }
            chunk_ids::INDX => {
                let index = SuperIndex::decode(&data)?;
                self.current_stream(id)?.super_index = Some(index);
            }
            chunk_ids::DMLH => {
                self.inspection.odml = Some(OdmlHeader::decode(&data)?);
            }
            chunk_ids::IDX1 => {
                self.inspection.legacy_index = parse_index(&data);
            }
            _ => {}
        }

        Ok(())
    }

    fn current_stream(&mut self, id: FourCC) -> Result<&mut StreamInfo> {
        self.inspection
            .streams
            .last_mut()
            .ok_or_else(|| AviError::InvalidChunk {
                id: id.0,
                message: "appears before any stream header".into(),
            })
    }

    /// Decode every page a super index points at
    fn follow_super_indexes(&mut self) -> Result<()> {
        let file_size = self.inspection.file_size;
        let mut pages = Vec::new();

        for (stream, info) in self.inspection.streams.iter().enumerate() {
            let Some(super_index) = &info.super_index else {
                continue;
            };

            for entry in &super_index.entries {
                let header_end = entry.offset.saturating_add(CHUNK_HEADER_SIZE);
                if header_end > file_size {
                    return Err(AviError::InvalidChunk {
                        id: *b"indx",
                        message: format!("page offset {} is outside the file", entry.offset),
                    });
                }

                self.reader.seek(SeekFrom::Start(entry.offset))?;
                let (id, size) = read_chunk_header(&mut self.reader)?;
                if header_end + u64::from(size) > file_size {
                    return Err(AviError::InvalidChunk {
                        id: id.0,
                        message: format!("page at {} runs past end of file", entry.offset),
                    });
                }

                let mut data = vec![0u8; size as usize];
                self.reader.read_exact(&mut data)?;
                pages.push(IndexPage {
                    stream,
                    offset: entry.offset,
                    index: StandardIndex::decode(&data)?,
                });
            }
        }

        self.inspection.index_pages = pages;
        Ok(())
    }
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "RIFF 'AVI ' size {} ({} byte file{})",
            self.riff_size,
            self.file_size,
            if self.riff_size_matches() { "" } else { ", size mismatch" }
        )?;
        for node in &self.chunks {
            write_node(f, node, 1)?;
        }

        if let Some(header) = &self.main_header {
            writeln!(f)?;
            writeln!(
                f,
                "Main header: {}x{}, {} frames, {:.3} fps, {} streams, flags {:#x}",
                header.width,
                header.height,
                header.total_frames,
                header.frame_rate(),
                header.streams,
                header.flags.to_u32()
            )?;
        }
        if let Some(odml) = &self.odml {
            writeln!(f, "OpenDML total frames: {}", odml.total_frames)?;
        }

        for (i, stream) in self.streams.iter().enumerate() {
            let header = &stream.header;
            writeln!(
                f,
                "Stream {}: {:?} handler {} scale {} rate {} length {} buffer {}",
                i,
                header.stream_type,
                header.handler,
                header.scale,
                header.rate,
                header.length,
                header.suggested_buffer_size
            )?;
            match &stream.format {
                Some(StreamFormat::Video(v)) => writeln!(
                    f,
                    "  format: {}x{} {} bpp, compression {}, image size {}",
                    v.width, v.height, v.bit_count, v.compression, v.image_size
                )?,
                Some(StreamFormat::Audio(a)) => writeln!(
                    f,
                    "  format: {} {} ch, {} Hz, {} bits",
                    a.format_name(),
                    a.channels,
                    a.samples_per_sec,
                    a.bits_per_sample
                )?,
                None => {}
            }
            if let Some(index) = &stream.super_index {
                writeln!(
                    f,
                    "  super index: {}/{} slots, {} entries",
                    index.entries.len(),
                    index.capacity,
                    index.total_entries()
                )?;
            }
        }

        for page in &self.index_pages {
            let key_frames = page.index.entries.iter().filter(|e| e.key_frame).count();
            writeln!(
                f,
                "Index page {} @{} (stream {}): base {}, {} entries, {} key frames",
                page.index.chunk_id,
                page.offset,
                page.stream,
                page.index.base_offset,
                page.index.entries.len(),
                key_frames
            )?;
        }

        if !self.legacy_index.is_empty() {
            let key_frames = self.legacy_index.iter().filter(|e| e.is_keyframe()).count();
            writeln!(
                f,
                "idx1: {} entries, {} key frames",
                self.legacy_index.len(),
                key_frames
            )?;
        }

        Ok(())
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &ChunkNode, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match node.list_type {
        Some(list_type) => writeln!(
            f,
            "{}LIST '{}' @{} size {}",
            indent, list_type, node.offset, node.size
        )?,
        None => writeln!(f, "{}{} @{} size {}", indent, node.id, node.offset, node.size)?,
    }

    for child in node.children.iter().take(REPORT_CHILDREN) {
        write_node(f, child, depth + 1)?;
    }
    if node.children.len() > REPORT_CHILDREN {
        writeln!(
            f,
            "{}  ... {} more chunks",
            indent,
            node.children.len() - REPORT_CHILDREN
        )?;
    }

    Ok(())
}
