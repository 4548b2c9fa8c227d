//! Video export configuration types

use serde::{Deserialize, Serialize};

use crate::types::{even_ceil, EncodingOptions, VideoProfile};

/// Frames between forced keyframes
pub const KEYFRAME_INTERVAL: u32 = 30;

/// Encoder and container settings for one MP4 export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Canvas width in pixels, always even
    pub width: u32,
    /// Canvas height in pixels, always even
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    pub profile: VideoProfile,
    pub keyframe_interval: u32,
    /// Enable fast-start for web playback (moov before mdat)
    pub fast_start: bool,
    /// Optional title metadata
    pub title: Option<String>,
}

impl VideoConfig {
    /// Configuration for frames of `width × height`, rounded up to even
    /// dimensions, with bitrate and profile taken from the quality tier.
    pub fn new(width: u32, height: u32, options: &EncodingOptions) -> Self {
        let params = options.params();
        Self {
            width: even_ceil(width),
            height: even_ceil(height),
            fps: options.frame_rate.max(1),
            bitrate: params.bitrate,
            profile: params.profile,
            keyframe_interval: KEYFRAME_INTERVAL,
            fast_start: true,
            title: None,
        }
    }

    /// Set the title metadata
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set fast-start mode
    pub fn with_fast_start(mut self, enabled: bool) -> Self {
        self.fast_start = enabled;
        self
    }

    /// Presentation timestamp of frame `index` in microseconds
    pub fn timestamp_us(&self, index: u64) -> u64 {
        index * 1_000_000 / self.fps as u64
    }

    /// Duration of one frame in microseconds
    pub fn frame_duration_us(&self) -> u64 {
        1_000_000 / self.fps as u64
    }

    pub fn is_keyframe_index(&self, index: u64) -> bool {
        index % self.keyframe_interval.max(1) as u64 == 0
    }
}

/// Statistics returned after finishing a video
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingStats {
    /// Chunks handed to the muxer
    pub video_frames: u64,
    pub keyframes: u64,
    /// Frames the encoder produced no data for
    pub dropped_frames: u64,
    /// Duration in seconds
    pub duration_secs: f64,
    pub bytes_written: u64,
}

impl RecordingStats {
    /// Calculate the average bitrate achieved
    pub fn avg_bitrate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.bytes_written as f64 * 8.0) / self.duration_secs
        } else {
            0.0
        }
    }
}
