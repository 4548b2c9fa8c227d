//! Frame sequence → MP4, combining a host encoder and muxer

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};

use super::config::{RecordingStats, VideoConfig};
use super::encoder::{ChunkEncoder, EncodedChunk};
use super::host::{ChunkMuxer, VideoHost};
use crate::errors::ExportError;
use crate::sink::ByteSink;
use crate::types::{EncodingOptions, Frame};

/// Encodes captured frames and muxes them into an in-memory MP4
pub struct VideoFrameEncoder {
    config: VideoConfig,
    encoder: Box<dyn ChunkEncoder>,
    muxer: Box<dyn ChunkMuxer>,
    sink: ByteSink,
    frame_count: u64,
    chunks_written: u64,
    keyframes: u64,
    dropped_frames: u64,
}

impl VideoFrameEncoder {
    /// Set up encoder and muxer for frames of `width × height`.
    ///
    /// Fails with `UnsupportedPlatform` when no video host is available.
    pub fn new(
        host: Option<&dyn VideoHost>,
        width: u32,
        height: u32,
        options: &EncodingOptions,
    ) -> Result<Self, ExportError> {
        let host = host.ok_or_else(|| {
            ExportError::UnsupportedPlatform(
                "MP4 export needs a video encoder and muxer; this build has none".to_string(),
            )
        })?;
        if width == 0 || height == 0 {
            return Err(ExportError::InvalidArgument(format!(
                "video dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }

        let config = VideoConfig::new(width, height, options);
        let sink = ByteSink::with_capacity(1024 * 1024);
        let encoder = host.create_encoder(&config)?;
        let muxer = host.create_muxer(&config, sink.clone())?;

        log::info!(
            "MP4 export via {}: {}x{} (from {}x{}) @ {} fps, {} bps, {:?}",
            host.name(),
            config.width,
            config.height,
            width,
            height,
            config.fps,
            config.bitrate,
            config.profile
        );

        Ok(Self {
            config,
            encoder,
            muxer,
            sink,
            frame_count: 0,
            chunks_written: 0,
            keyframes: 0,
            dropped_frames: 0,
        })
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    /// Number of frames submitted so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Draw the frame onto the black canvas and submit it.
    pub fn write_frame(&mut self, frame: Frame) -> Result<(), ExportError> {
        let index = self.frame_count;
        let canvas = frame.to_canvas(self.config.width, self.config.height)?;
        let timestamp_us = self.config.timestamp_us(index);
        let duration_us = self.config.frame_duration_us();
        let force_keyframe = self.config.is_keyframe_index(index);

        let chunk = self
            .encoder
            .encode(&canvas, timestamp_us, duration_us, force_keyframe)?;
        self.frame_count += 1;

        match chunk {
            Some(chunk) => self.mux(&chunk),
            None => {
                self.dropped_frames += 1;
                Ok(())
            }
        }
    }

    fn mux(&mut self, chunk: &EncodedChunk) -> Result<(), ExportError> {
        self.muxer.add_chunk(chunk)?;
        self.chunks_written += 1;
        if chunk.is_keyframe {
            self.keyframes += 1;
        }
        Ok(())
    }

    /// Flush the encoder, close the container and return the file bytes.
    pub fn finish(mut self) -> Result<(Bytes, RecordingStats), ExportError> {
        for chunk in self.encoder.flush()? {
            self.mux(&chunk)?;
        }
        let mux_stats = self.muxer.finalize()?;
        let data = self.sink.take();

        let stats = RecordingStats {
            video_frames: self.chunks_written,
            keyframes: self.keyframes,
            dropped_frames: self.dropped_frames,
            duration_secs: if mux_stats.duration_secs > 0.0 {
                mux_stats.duration_secs
            } else {
                self.frame_count as f64 / self.config.fps as f64
            },
            bytes_written: data.len() as u64,
        };
        log::info!(
            "MP4 finished: {} frames ({} keyframes, {} dropped), {} bytes",
            stats.video_frames,
            stats.keyframes,
            stats.dropped_frames,
            stats.bytes_written
        );
        Ok((data, stats))
    }
}

/// Encode the whole frame list, checking `cancelled` before every frame.
///
/// The output dimensions come from the first frame.
pub fn encode_frames<F>(
    host: Option<&dyn VideoHost>,
    frames: Vec<Frame>,
    options: &EncodingOptions,
    cancelled: &AtomicBool,
    mut on_progress: F,
) -> Result<(Bytes, RecordingStats), ExportError>
where
    F: FnMut(usize, usize),
{
    let (width, height) = frames
        .first()
        .map(Frame::dimensions)
        .ok_or(ExportError::EmptyInput)?;
    let total = frames.len();
    let mut encoder = VideoFrameEncoder::new(host, width, height, options)?;

    for (index, frame) in frames.into_iter().enumerate() {
        if cancelled.load(Ordering::SeqCst) {
            log::info!("MP4 encode cancelled at frame {}/{}", index, total);
            return Err(ExportError::Cancelled);
        }
        encoder.write_frame(frame)?;
        on_progress(index + 1, total);
    }

    encoder.finish()
}
