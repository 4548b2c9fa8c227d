//! Configuration management for reelcap
//!
//! Loads and saves the capture, encoding and output defaults used by the CLI
//! and by hosts that embed the exporter.

use crate::capture::CaptureSettings;
use crate::errors::ExportError;
use crate::gif::neuquant::MAX_SAMPLE_FACTOR;
use crate::session::ExportRequest;
use crate::types::{EncodingOptions, ExportFormat, LoopCount, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReelcapConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Capture loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Target frames per second
    pub frame_rate: u32,
    /// Paint loop period in milliseconds
    pub paint_interval_ms: u64,
    /// Hard cap on buffered frames
    pub max_frames: usize,
    /// Longest capture in seconds; also caps the frame buffer
    pub max_duration_secs: u64,
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub format: ExportFormat,
    pub quality: Quality,
    /// NeuQuant sampling stride (1 = best, 30 = fastest)
    pub gif_sample_factor: u32,
    pub gif_repeat: LoopCount,
}

/// Output file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Prefix of `<prefix>-<timestamp>.<ext>`
    pub filename_prefix: String,
    pub output_directory: String,
}

impl CaptureConfig {
    /// One hour
    pub const MAX_DURATION_SECS: u64 = 3600;
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            paint_interval_ms: 16,
            max_frames: 1800,
            max_duration_secs: 120,
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Gif,
            quality: Quality::Medium,
            gif_sample_factor: 10,
            gif_repeat: LoopCount::Infinite,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            filename_prefix: "chat".to_string(),
            output_directory: "./exports".to_string(),
        }
    }
}

impl ReelcapConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ExportError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ReelcapConfig = toml::from_str(&contents)
            .map_err(|e| ExportError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ExportError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ExportError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ExportError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("reelcap.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ExportError> {
        let invalid = |msg: String| Err(ExportError::Config(msg));

        if self.capture.frame_rate == 0 || self.capture.frame_rate > EncodingOptions::MAX_FRAME_RATE {
            return invalid(format!(
                "Frame rate must be between 1 and {}",
                EncodingOptions::MAX_FRAME_RATE
            ));
        }
        if self.capture.paint_interval_ms == 0 || self.capture.paint_interval_ms > 1000 {
            return invalid("Paint interval must be between 1 and 1000 ms".to_string());
        }
        if self.capture.max_frames == 0 {
            return invalid("Frame cap must be at least 1".to_string());
        }
        if self.capture.max_duration_secs == 0
            || self.capture.max_duration_secs > CaptureConfig::MAX_DURATION_SECS
        {
            return invalid(format!(
                "Maximum duration must be between 1 and {} seconds",
                CaptureConfig::MAX_DURATION_SECS
            ));
        }

        if !(1..=MAX_SAMPLE_FACTOR).contains(&self.encoding.gif_sample_factor) {
            return invalid(format!(
                "GIF sample factor must be between 1 and {}",
                MAX_SAMPLE_FACTOR
            ));
        }

        if self.output.filename_prefix.is_empty() {
            return invalid("Filename prefix must not be empty".to_string());
        }
        if self.output.filename_prefix.contains(['/', '\\']) {
            return invalid("Filename prefix must not contain path separators".to_string());
        }

        Ok(())
    }

    pub fn encoding_options(&self) -> EncodingOptions {
        EncodingOptions::new(
            self.encoding.format,
            self.encoding.quality,
            self.capture.frame_rate,
        )
    }

    /// Buffer cap: the smaller of `max_frames` and `max_duration_secs × frame_rate`
    pub fn frame_cap(&self) -> usize {
        let by_duration = usize::try_from(self.capture.max_duration_secs)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.capture.frame_rate as usize);
        self.capture.max_frames.min(by_duration)
    }

    /// Capture settings with the quality tier's pixel ratio
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings::new(
            self.capture.frame_rate,
            self.encoding.quality.params().pixel_ratio,
        )
        .with_paint_interval(Duration::from_millis(self.capture.paint_interval_ms))
        .with_max_frames(self.frame_cap())
    }

    pub fn export_request(&self) -> ExportRequest {
        ExportRequest::new(self.encoding_options())
            .with_capture(self.capture_settings())
            .with_gif(self.encoding.gif_sample_factor, self.encoding.gif_repeat)
            .with_prefix(self.output.filename_prefix.clone())
    }

    pub fn output_directory(&self) -> PathBuf {
        PathBuf::from(&self.output.output_directory)
    }
}
