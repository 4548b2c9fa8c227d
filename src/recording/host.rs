//! Host-provided video primitives
//!
//! The MP4 path needs an encoder and a muxer from the platform. Builds with
//! the `recording` feature get openh264 + muxide; without it there is no
//! platform host and MP4 export fails with `UnsupportedPlatform`.

use std::sync::Arc;

use super::config::VideoConfig;
use super::encoder::{ChunkEncoder, EncodedChunk};
use crate::errors::ExportError;
use crate::sink::ByteSink;

/// What the muxer reports once the container is closed
#[derive(Debug, Clone, Default)]
pub struct MuxStats {
    pub video_frames: u64,
    pub duration_secs: f64,
    pub bytes_written: u64,
}

/// Container writer; it alone decides the byte layout of the output.
pub trait ChunkMuxer: Send {
    fn add_chunk(&mut self, chunk: &EncodedChunk) -> Result<(), ExportError>;

    /// Write the index/trailer and close the container.
    fn finalize(self: Box<Self>) -> Result<MuxStats, ExportError>;
}

/// Factory for the encoder/muxer pair of one export
pub trait VideoHost: Send + Sync {
    fn name(&self) -> &str;

    fn create_encoder(&self, config: &VideoConfig) -> Result<Box<dyn ChunkEncoder>, ExportError>;

    fn create_muxer(
        &self,
        config: &VideoConfig,
        sink: ByteSink,
    ) -> Result<Box<dyn ChunkMuxer>, ExportError>;
}

/// The video host this build provides, if any
pub fn platform_host() -> Option<Arc<dyn VideoHost>> {
    #[cfg(feature = "recording")]
    {
        Some(Arc::new(OpenH264Host))
    }
    #[cfg(not(feature = "recording"))]
    {
        None
    }
}

/// openh264 encoder + muxide MP4 muxer
#[cfg(feature = "recording")]
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenH264Host;

#[cfg(feature = "recording")]
impl VideoHost for OpenH264Host {
    fn name(&self) -> &str {
        "openh264+muxide"
    }

    fn create_encoder(&self, config: &VideoConfig) -> Result<Box<dyn ChunkEncoder>, ExportError> {
        Ok(Box::new(super::encoder::H264Encoder::new(config)?))
    }

    fn create_muxer(
        &self,
        config: &VideoConfig,
        sink: ByteSink,
    ) -> Result<Box<dyn ChunkMuxer>, ExportError> {
        Ok(Box::new(Mp4Muxer::new(config, sink)?))
    }
}

/// MP4 muxer writing into a [`ByteSink`]
#[cfg(feature = "recording")]
pub struct Mp4Muxer {
    muxer: muxide::api::Muxer<ByteSink>,
}

#[cfg(feature = "recording")]
impl Mp4Muxer {
    pub fn new(config: &VideoConfig, sink: ByteSink) -> Result<Self, ExportError> {
        use muxide::api::{Metadata, MuxerBuilder, VideoCodec};

        let mut metadata = Metadata::new().with_current_time();
        if let Some(ref title) = config.title {
            metadata = metadata.with_title(title);
        }

        let muxer = MuxerBuilder::new(sink)
            .video(VideoCodec::H264, config.width, config.height, config.fps as f64)
            .with_fast_start(config.fast_start)
            .with_metadata(metadata)
            .build()
            .map_err(|e| ExportError::EncodeFailure(format!("Failed to create muxer: {}", e)))?;

        Ok(Self { muxer })
    }
}

#[cfg(feature = "recording")]
impl ChunkMuxer for Mp4Muxer {
    fn add_chunk(&mut self, chunk: &EncodedChunk) -> Result<(), ExportError> {
        let pts = chunk.timestamp_us as f64 / 1_000_000.0;
        self.muxer
            .write_video(pts, &chunk.data, chunk.is_keyframe)
            .map_err(|e| ExportError::EncodeFailure(format!("Failed to write frame: {}", e)))
    }

    fn finalize(self: Box<Self>) -> Result<MuxStats, ExportError> {
        let stats = self
            .muxer
            .finish_with_stats()
            .map_err(|e| ExportError::EncodeFailure(format!("Failed to finalize MP4: {}", e)))?;
        Ok(MuxStats {
            video_frames: stats.video_frames,
            duration_secs: stats.duration_secs,
            bytes_written: stats.bytes_written,
        })
    }
}
