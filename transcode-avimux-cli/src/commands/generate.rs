//! Test-pattern recording command.

use super::format_size;
use anyhow::Context;
use clap::Args;
use console::style;
use std::f64::consts::TAU;
use std::path::PathBuf;
use transcode_avimux::{
    bits_per_pixel, AudioConfig, AviWriter, FourCC, IndexStyle, VideoConfig, WriterConfig,
};

/// Tone written into the audio track, in Hz.
const TONE_HZ: f64 = 440.0;

/// Write a synthetic AVI recording.
#[derive(Args, Debug)]
pub struct CmdGenerate {
    /// Output file path.
    pub output: PathBuf,

    /// Frame width in pixels.
    #[arg(long, default_value_t = 320)]
    pub width: u32,

    /// Frame height in pixels.
    #[arg(long, default_value_t = 240)]
    pub height: u32,

    /// Frames per second.
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// Codec tag written to the headers (I420 gives planar YUV frames,
    /// anything else packed 24-bit pixels).
    #[arg(long, default_value = "I420")]
    pub fourcc: String,

    /// Number of video frames.
    #[arg(long, default_value_t = 90)]
    pub frames: u32,

    /// Key frame interval.
    #[arg(long, default_value_t = 30)]
    pub gop: u32,

    /// Add a 16-bit stereo PCM tone at this sample rate.
    #[arg(long)]
    pub audio_rate: Option<u32>,

    /// Index style (opendml, basic).
    #[arg(long, default_value = "opendml")]
    pub index: IndexStyle,
}

impl CmdGenerate {
    /// Execute the generate command.
    pub fn run(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.width > 0 && self.height > 0,
            "frame size must be non-zero, got {}x{}",
            self.width,
            self.height
        );
        let fourcc = FourCC::from_str(&self.fourcc)
            .with_context(|| format!("fourcc must be exactly 4 bytes, got {:?}", self.fourcc))?;

        let video = VideoConfig::new(self.width, self.height, fourcc, self.fps);
        let audio = self.audio_rate.map(|rate| AudioConfig::new(2, 16, rate));
        let config = WriterConfig {
            index_style: self.index,
            ..Default::default()
        };

        let mut writer = AviWriter::open_with_config(&self.output, video, audio, config)
            .with_context(|| format!("cannot start {}", self.output.display()))?;

        let bpp = bits_per_pixel(fourcc);
        let gop = self.gop.max(1);
        for frame_no in 0..self.frames {
            let frame = test_pattern(self.width, self.height, bpp, frame_no);
            writer.append_video_frame(&frame, frame_no % gop == 0)?;

            if let Some(rate) = self.audio_rate {
                let samples = tone(rate, self.fps, frame_no);
                if !samples.is_empty() {
                    writer.append_audio(&samples)?;
                }
            }
        }

        let frames = writer.frame_count();
        let size = writer.position();
        writer.close()?;

        tracing::info!("Wrote {} frames to {}", frames, self.output.display());
        println!(
            "{} {} ({} frames, {}, {} index)",
            style("Wrote").green().bold(),
            self.output.display(),
            frames,
            format_size(size),
            self.index
        );

        Ok(())
    }
}

/// Moving gradient. I420 frames get a luma ramp over neutral chroma, other
/// codecs eight vertical colour bars.
fn test_pattern(width: u32, height: u32, bits_per_pixel: u16, frame_no: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let shift = frame_no as usize * 4;

    if bits_per_pixel == 12 {
        let mut data = vec![128u8; w * h * 3 / 2];
        for y in 0..h {
            for x in 0..w {
                data[y * w + x] = ((x + y + shift) & 0xFF) as u8;
            }
        }
        data
    } else {
        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            let green = ((y + shift) & 0xFF) as u8;
            for x in 0..w {
                let bar = (x * 8 / w) as u8;
                data.extend_from_slice(&[bar * 32, green, 255 - bar * 32]);
            }
        }
        data
    }
}

/// One frame's worth of stereo 16-bit sine samples
fn tone(sample_rate: u32, fps: f64, frame_no: u32) -> Vec<u8> {
    let per_frame = (f64::from(sample_rate) / fps).round() as u64;
    let start = u64::from(frame_no) * per_frame;

    let mut data = Vec::with_capacity(per_frame as usize * 4);
    for n in start..start + per_frame {
        let t = n as f64 / f64::from(sample_rate);
        let value = ((t * TONE_HZ * TAU).sin() * 8000.0) as i16;
        data.extend_from_slice(&value.to_le_bytes());
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}
