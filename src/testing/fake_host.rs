//! In-memory video host for exercising the MP4 path without a codec

use std::sync::{Arc, Mutex};

use crate::errors::ExportError;
use crate::recording::{
    ChunkEncoder, ChunkMuxer, EncodedChunk, MuxStats, VideoConfig, VideoHost,
};
use crate::sink::ByteSink;
use image::RgbaImage;

/// Marker the fake muxer writes first
pub const FAKE_CONTAINER_MAGIC: &[u8; 8] = b"FAKEMP4\0";

/// One chunk as seen by the fake muxer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxedChunk {
    pub timestamp_us: u64,
    pub duration_us: u64,
    pub is_keyframe: bool,
    pub len: usize,
}

/// Everything the fake host observed
#[derive(Debug, Default)]
pub struct FakeVideoLog {
    pub configs: Vec<VideoConfig>,
    /// Canvas size of every frame handed to the encoder
    pub canvases: Vec<(u32, u32)>,
    /// Bottom-right pixel of every canvas, for checking the black fill
    pub corner_pixels: Vec<[u8; 4]>,
    pub chunks: Vec<MuxedChunk>,
    pub finalized: bool,
}

/// Video host whose encoder emits one small chunk per frame and whose muxer
/// writes a trivial container into the sink.
#[derive(Clone, Default)]
pub struct FakeVideoHost {
    log: Arc<Mutex<FakeVideoLog>>,
    fail_at_frame: Option<u64>,
    fail_finalize: bool,
}

impl FakeVideoHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the encoder fail on the frame with this index.
    pub fn failing_at(mut self, frame: u64) -> Self {
        self.fail_at_frame = Some(frame);
        self
    }

    /// Make the muxer fail when closing the container.
    pub fn failing_finalize(mut self) -> Self {
        self.fail_finalize = true;
        self
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, FakeVideoLog> {
        self.log.lock().expect("lock poisoned")
    }
}

impl VideoHost for FakeVideoHost {
    fn name(&self) -> &str {
        "fake"
    }

    fn create_encoder(&self, config: &VideoConfig) -> Result<Box<dyn ChunkEncoder>, ExportError> {
        self.log().configs.push(config.clone());
        Ok(Box::new(FakeEncoder {
            log: self.log.clone(),
            fail_at_frame: self.fail_at_frame,
            frames: 0,
        }))
    }

    fn create_muxer(
        &self,
        _config: &VideoConfig,
        sink: ByteSink,
    ) -> Result<Box<dyn ChunkMuxer>, ExportError> {
        sink.write_bytes(FAKE_CONTAINER_MAGIC);
        Ok(Box::new(FakeMuxer {
            log: self.log.clone(),
            sink,
            fail_finalize: self.fail_finalize,
            frames: 0,
            last_end_us: 0,
        }))
    }
}

struct FakeEncoder {
    log: Arc<Mutex<FakeVideoLog>>,
    fail_at_frame: Option<u64>,
    frames: u64,
}

impl ChunkEncoder for FakeEncoder {
    fn encode(
        &mut self,
        canvas: &RgbaImage,
        timestamp_us: u64,
        duration_us: u64,
        force_keyframe: bool,
    ) -> Result<Option<EncodedChunk>, ExportError> {
        let index = self.frames;
        self.frames += 1;
        if self.fail_at_frame == Some(index) {
            return Err(ExportError::EncodeFailure(format!(
                "fake encoder failed at frame {}",
                index
            )));
        }

        {
            let mut log = self.log.lock().expect("lock poisoned");
            log.canvases.push(canvas.dimensions());
            log.corner_pixels
                .push(canvas.get_pixel(canvas.width() - 1, canvas.height() - 1).0);
        }

        let mut data = vec![0, 0, 0, 1, if force_keyframe { 0x65 } else { 0x41 }];
        data.extend_from_slice(&index.to_le_bytes());
        Ok(Some(EncodedChunk {
            data,
            timestamp_us,
            duration_us,
            is_keyframe: force_keyframe,
        }))
    }
}

struct FakeMuxer {
    log: Arc<Mutex<FakeVideoLog>>,
    sink: ByteSink,
    fail_finalize: bool,
    frames: u64,
    last_end_us: u64,
}

impl ChunkMuxer for FakeMuxer {
    fn add_chunk(&mut self, chunk: &EncodedChunk) -> Result<(), ExportError> {
        self.sink.write_bytes(&chunk.data);
        self.frames += 1;
        self.last_end_us = chunk.timestamp_us + chunk.duration_us;
        self.log.lock().expect("lock poisoned").chunks.push(MuxedChunk {
            timestamp_us: chunk.timestamp_us,
            duration_us: chunk.duration_us,
            is_keyframe: chunk.is_keyframe,
            len: chunk.data.len(),
        });
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<MuxStats, ExportError> {
        if self.fail_finalize {
            return Err(ExportError::EncodeFailure("fake muxer failed to finalize".to_string()));
        }
        self.sink.write_bytes(b"moov");
        self.log.lock().expect("lock poisoned").finalized = true;
        Ok(MuxStats {
            video_frames: self.frames,
            duration_secs: self.last_end_us as f64 / 1_000_000.0,
            bytes_written: self.sink.len() as u64,
        })
    }
}
