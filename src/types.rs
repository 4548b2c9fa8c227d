//! Core data model shared by capture, encoders and the export session

use bytes::Bytes;
use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::ExportError;

/// One rasterized RGBA snapshot of the surface.
///
/// Frames are immutable once captured and are moved into the encoder that
/// consumes them.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub sequence: u64,
    /// Capture time relative to the start of capture
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, ExportError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 {
            return Err(ExportError::InvalidArgument(format!(
                "frame dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        if data.len() != expected {
            return Err(ExportError::InvalidArgument(format!(
                "RGBA buffer for {}x{} must be {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            sequence: 0,
            timestamp_us: 0,
            width,
            height,
            data,
        })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            sequence: 0,
            timestamp_us: 0,
            width,
            height,
            data: image.into_raw(),
        }
    }

    pub fn with_timing(mut self, sequence: u64, timestamp_us: u64) -> Self {
        self.sequence = sequence;
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Consume the frame and hand back its pixel buffer as an image.
    pub fn into_image(self) -> Result<RgbaImage, ExportError> {
        let (w, h) = (self.width, self.height);
        RgbaImage::from_raw(w, h, self.data).ok_or_else(|| {
            ExportError::InvalidArgument(format!("frame buffer does not match {}x{}", w, h))
        })
    }

    /// Draw the frame onto an opaque black canvas of the given size.
    ///
    /// Anything outside the canvas is clipped; uncovered canvas stays black.
    pub fn to_canvas(self, width: u32, height: u32) -> Result<RgbaImage, ExportError> {
        if self.width == width && self.height == height {
            return self.into_image();
        }
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        let image = self.into_image()?;
        imageops::overlay(&mut canvas, &image, 0, 0);
        Ok(canvas)
    }
}

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Mp4,
    Gif,
}

impl ExportFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "video/mp4",
            ExportFormat::Gif => "image/gif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Gif => "gif",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "mp4" => Some(ExportFormat::Mp4),
            "gif" => Some(ExportFormat::Gif),
            _ => None,
        }
    }
}

/// H.264 coder profile picked by quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoProfile {
    Baseline,
    Main,
    High,
}

/// Quality presets for export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

/// Parameters a quality tier resolves to
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityParams {
    /// MP4 target bitrate in bits per second
    pub bitrate: u32,
    /// Capture oversampling factor
    pub pixel_ratio: f32,
    /// Number of colors in each GIF frame palette
    pub palette_size: usize,
    pub profile: VideoProfile,
}

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::Low, Quality::Medium, Quality::High];

    pub fn params(&self) -> QualityParams {
        match self {
            Quality::Low => QualityParams {
                bitrate: 2_000_000,
                pixel_ratio: 1.0,
                palette_size: 64,
                profile: VideoProfile::Baseline,
            },
            Quality::Medium => QualityParams {
                bitrate: 5_000_000,
                pixel_ratio: 1.5,
                palette_size: 128,
                profile: VideoProfile::Main,
            },
            Quality::High => QualityParams {
                bitrate: 10_000_000,
                pixel_ratio: 2.0,
                palette_size: 256,
                profile: VideoProfile::High,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Some(Quality::Low),
            "medium" => Some(Quality::Medium),
            "high" => Some(Quality::High),
            _ => None,
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Medium
    }
}

/// How many times a GIF plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopCount {
    /// Play once; no loop extension is written
    Once,
    Infinite,
    /// Repeat `n` extra times after the first play
    Times(u16),
}

impl LoopCount {
    /// Value stored in the Netscape extension, if one is written
    pub fn netscape_value(&self) -> Option<u16> {
        match self {
            LoopCount::Once => None,
            LoopCount::Infinite => Some(0),
            LoopCount::Times(n) => Some(*n),
        }
    }
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::Infinite
    }
}

/// Options chosen for one export
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodingOptions {
    pub format: ExportFormat,
    pub quality: Quality,
    pub frame_rate: u32,
}

impl EncodingOptions {
    pub const MAX_FRAME_RATE: u32 = 120;

    pub fn new(format: ExportFormat, quality: Quality, frame_rate: u32) -> Self {
        Self {
            format,
            quality,
            frame_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        if self.frame_rate == 0 || self.frame_rate > Self::MAX_FRAME_RATE {
            return Err(ExportError::InvalidArgument(format!(
                "frame rate must be 1-{}, got {}",
                Self::MAX_FRAME_RATE,
                self.frame_rate
            )));
        }
        Ok(())
    }

    pub fn params(&self) -> QualityParams {
        self.quality.params()
    }

    /// Frame delay in GIF centiseconds
    pub fn gif_delay_cs(&self) -> u16 {
        let ms = 1000.0 / self.frame_rate.max(1) as f64;
        ((ms / 10.0).round() as u16).max(1)
    }
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self::new(ExportFormat::Gif, Quality::Medium, 30)
    }
}

/// Finished export output
#[derive(Debug, Clone)]
pub struct ExportBlob {
    pub mime_type: &'static str,
    pub filename: String,
    pub data: Bytes,
}

impl ExportBlob {
    pub fn new(format: ExportFormat, prefix: &str, data: Bytes) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        Self {
            mime_type: format.mime_type(),
            filename: blob_filename(prefix, timestamp, format),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the blob into `dir` under its own filename
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, ExportError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.data)?;
        log::info!("Wrote {} ({} bytes)", path.display(), self.data.len());
        Ok(path)
    }
}

/// `<prefix>-<timestamp>.<ext>`
pub fn blob_filename(prefix: &str, timestamp_ms: i64, format: ExportFormat) -> String {
    format!("{}-{}.{}", prefix, timestamp_ms, format.extension())
}

/// Round up to the nearest even value
pub fn even_ceil(value: u32) -> u32 {
    value + (value & 1)
}
