//! Testing utilities for reelcap
//!
//! Synthetic chat frames, scriptable surfaces, scripted GIF workers and a fake
//! video host, so the capture and export paths can be exercised offline
//! without a display or a video codec.

mod fake_host;
mod gif_workers;
pub mod synthetic_data;

pub use gif_workers::{crashing_gif_worker, GatedGifWorker};
pub use fake_host::{FakeVideoHost, FakeVideoLog, MuxedChunk, FAKE_CONTAINER_MAGIC};
pub use synthetic_data::{
    synthetic_chat_frame, synthetic_chat_frames, synthetic_chat_image, CountingSurface,
    FailingSurface, FRAMES_PER_MESSAGE,
};
