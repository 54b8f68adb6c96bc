//! AVI inspection command.

use super::format_size;
use clap::Args;
use console::style;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use transcode_avimux::{inspect, Inspection, StreamFormat};

/// Stream summary for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub index: usize,
    /// Stream type fourcc (vids/auds).
    #[serde(rename = "type")]
    pub stream_type: String,
    pub handler: String,
    /// Frames for video, bytes for audio.
    pub length: u32,
    pub scale: u32,
    pub rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    /// Pages referenced from the stream's super index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_pages: Option<usize>,
    /// Chunks listed across those pages.
    pub indexed_chunks: usize,
}

/// Whole-file summary for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct AviSummary {
    pub file: String,
    pub size_bytes: u64,
    pub riff_size: u32,
    /// Whether the RIFF size field covers the file exactly.
    pub finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odml_total_frames: Option<u32>,
    pub movi_chunks: usize,
    pub legacy_index_entries: usize,
    pub streams: Vec<StreamSummary>,
}

impl AviSummary {
    pub fn new(file: String, inspection: &Inspection) -> Self {
        let streams = inspection
            .streams
            .iter()
            .enumerate()
            .map(|(index, stream)| {
                let (width, height) = match &stream.format {
                    Some(StreamFormat::Video(v)) => (Some(v.width), Some(v.height)),
                    _ => (None, None),
                };
                let (sample_rate, channels) = match &stream.format {
                    Some(StreamFormat::Audio(a)) => (Some(a.samples_per_sec), Some(a.channels)),
                    _ => (None, None),
                };
                let indexed_chunks = inspection
                    .index_pages
                    .iter()
                    .filter(|p| p.stream == index)
                    .map(|p| p.index.entries.len())
                    .sum();

                StreamSummary {
                    index,
                    stream_type: String::from_utf8_lossy(&stream.header.stream_type.to_fourcc())
                        .into_owned(),
                    handler: stream.header.handler.as_str(),
                    length: stream.header.length,
                    scale: stream.header.scale,
                    rate: stream.header.rate,
                    width,
                    height,
                    sample_rate,
                    channels,
                    index_pages: stream.super_index.as_ref().map(|s| s.entries.len()),
                    indexed_chunks,
                }
            })
            .collect();

        AviSummary {
            file,
            size_bytes: inspection.file_size,
            riff_size: inspection.riff_size,
            finalized: inspection.riff_size_matches(),
            total_frames: inspection.main_header.as_ref().map(|h| h.total_frames),
            frame_rate: inspection.main_header.as_ref().map(|h| h.frame_rate()),
            odml_total_frames: inspection.odml.map(|o| o.total_frames),
            movi_chunks: inspection.movi_chunks().len(),
            legacy_index_entries: inspection.legacy_index.len(),
            streams,
        }
    }
}

/// Inspect an AVI file.
#[derive(Args, Debug)]
pub struct CmdInspect {
    /// Path to the AVI file.
    pub file: PathBuf,

    /// Output a JSON summary instead of the chunk report.
    #[arg(long)]
    pub json: bool,
}

impl CmdInspect {
    /// Execute the inspect command.
    pub fn run(&self) -> anyhow::Result<()> {
        if !self.file.exists() {
            anyhow::bail!("File not found: {}", self.file.display());
        }

        let file = File::open(&self.file)?;
        let inspection = inspect(BufReader::new(file))?;
        let summary = AviSummary::new(self.file.display().to_string(), &inspection);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            self.print_report(&summary, &inspection);
        }

        Ok(())
    }

    fn print_report(&self, summary: &AviSummary, inspection: &Inspection) {
        println!();
        println!("{}", style("AVI Inspection").cyan().bold());
        println!();
        println!("  {:<16} {}", style("File:").white(), summary.file);
        println!(
            "  {:<16} {}",
            style("Size:").white(),
            format_size(summary.size_bytes)
        );
        let status = if summary.finalized {
            style("finalized").green()
        } else {
            style("size fields do not match file").red()
        };
        println!("  {:<16} {}", style("Status:").white(), status);
        println!();

        print!("{}", inspection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use transcode_avimux::{AudioConfig, AviWriter, VideoConfig, WriterConfig};

    #[test]
    fn test_summary_of_written_file() {
        let video = VideoConfig::new(32, 16, *b"I420", 25.0);
        let audio = AudioConfig::new(2, 16, 8000);
        let mut writer =
            AviWriter::new(Cursor::new(Vec::new()), video, Some(audio), WriterConfig::default())
                .unwrap();
        for i in 0..3 {
            writer.append_video_frame(&[0; 768], i == 0).unwrap();
            writer.append_audio(&[0; 1280]).unwrap();
        }
        let bytes = writer.close().unwrap().into_inner();

        let inspection = inspect(Cursor::new(bytes)).unwrap();
        let summary = AviSummary::new("test.avi".into(), &inspection);

        assert!(summary.finalized);
        assert_eq!(summary.total_frames, Some(3));
        assert_eq!(summary.odml_total_frames, Some(3));
        assert_eq!(summary.movi_chunks, 6);
        assert_eq!(summary.streams.len(), 2);
        assert_eq!(summary.streams[0].stream_type, "vids");
        assert_eq!(summary.streams[0].handler, "I420");
        assert_eq!(summary.streams[0].indexed_chunks, 3);
        assert_eq!(summary.streams[1].stream_type, "auds");
        assert_eq!(summary.streams[1].channels, Some(2));
        assert_eq!(summary.streams[1].length, 3840);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["streams"][0]["type"], "vids");
        assert!(json["streams"][0].get("sample_rate").is_none());
    }

    #[test]
    fn test_missing_file() {
        let cmd = CmdInspect {
            file: PathBuf::from("/nonexistent/never.avi"),
            json: false,
        };
        assert!(cmd.run().is_err());
    }
}
