//! Animated GIF export
//!
//! - `neuquant`: per-frame palette quantization
//! - `lzw`: GIF LZW compression into data sub-blocks
//! - `encoder`: GIF89a container bookkeeping
//! - `worker`: runs the encoder on its own thread behind a message protocol
//!
//! # Example
//! ```rust,ignore
//! use reelcap::gif::{encode_frames, GifJob};
//!
//! let job = GifJob::new(options, 10, LoopCount::Infinite);
//! let bytes = encode_frames(frames, &job, &cancelled, |done, total| {
//!     println!("{done}/{total}");
//! })?;
//! ```

pub mod encoder;
pub mod lzw;
pub mod neuquant;
pub mod worker;

pub use encoder::{GifEncoder, GifOptions};
pub use lzw::LzwCompressor;
pub use neuquant::NeuQuant;
pub use worker::{encode_loop, GifWorker, HostMessage, WorkerMessage};

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::ExportError;
use crate::types::{EncodingOptions, Frame, LoopCount};

/// What the worker needs to know besides the frames
#[derive(Debug, Clone, Copy)]
pub struct GifJob {
    pub options: EncodingOptions,
    pub sample_factor: u32,
    pub repeat: LoopCount,
}

impl GifJob {
    pub fn new(options: EncodingOptions, sample_factor: u32, repeat: LoopCount) -> Self {
        Self {
            options,
            sample_factor,
            repeat,
        }
    }
}

/// Spawns the worker for one export
pub type WorkerFactory = Arc<dyn Fn() -> Result<GifWorker, ExportError> + Send + Sync>;

pub fn default_worker_factory() -> WorkerFactory {
    Arc::new(GifWorker::spawn)
}

/// Encode `frames` on a fresh worker thread.
///
/// Frames are moved to the worker one at a time and freed once encoded.
/// Frames that differ in size from the first are drawn onto a black canvas of
/// the first frame's size. `cancelled` is checked before every submission;
/// `on_progress(done, total)` fires as the worker reports.
pub fn encode_frames<F>(
    frames: Vec<Frame>,
    job: &GifJob,
    cancelled: &AtomicBool,
    on_progress: F,
) -> Result<Bytes, ExportError>
where
    F: FnMut(usize, usize),
{
    encode_frames_with(&GifWorker::spawn, frames, job, cancelled, on_progress)
}

/// [`encode_frames`] on a worker from `spawn`.
pub fn encode_frames_with<S, F>(
    spawn: &S,
    frames: Vec<Frame>,
    job: &GifJob,
    cancelled: &AtomicBool,
    mut on_progress: F,
) -> Result<Bytes, ExportError>
where
    S: Fn() -> Result<GifWorker, ExportError> + ?Sized,
    F: FnMut(usize, usize),
{
    let (width, height) = frames
        .first()
        .map(Frame::dimensions)
        .ok_or(ExportError::EmptyInput)?;
    let (gif_width, gif_height) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(ExportError::InvalidArgument(format!(
                "{}x{} exceeds the GIF size limit",
                width, height
            )))
        }
    };
    let total = frames.len();

    log::info!(
        "Encoding {} frames to GIF at {}x{} ({} colors)",
        total,
        width,
        height,
        job.options.params().palette_size
    );

    let mut worker = spawn()?;
    worker.send(HostMessage::Start {
        width: gif_width,
        height: gif_height,
        delay: job.options.gif_delay_cs(),
        quality: job.options.quality,
        sample_factor: job.sample_factor,
        repeat: job.repeat,
    })?;
    match worker.recv()? {
        WorkerMessage::Started => {}
        other => {
            return Err(ExportError::WorkerFailure(format!(
                "expected start acknowledgement, got {:?}",
                other
            )))
        }
    }

    for (index, frame) in frames.into_iter().enumerate() {
        if cancelled.load(Ordering::SeqCst) {
            log::info!("GIF encode cancelled at frame {}/{}", index, total);
            return Err(ExportError::Cancelled);
        }
        let data = frame.to_canvas(width, height)?.into_raw();
        worker.send(HostMessage::Frame { data, index, total })?;

        while let Some(message) = worker.try_recv()? {
            if let WorkerMessage::Progress { current, total } = message {
                on_progress(current, total);
            }
        }
    }

    worker.send(HostMessage::Finish)?;
    loop {
        match worker.recv()? {
            WorkerMessage::Progress { current, total } => on_progress(current, total),
            WorkerMessage::Finished { data } => {
                worker.terminate();
                return Ok(data);
            }
            other => log::debug!("Ignoring worker message {:?}", other),
        }
    }
}
