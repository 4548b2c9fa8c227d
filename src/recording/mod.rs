//! MP4 export
//!
//! Frames are drawn on an even-sized black canvas, encoded to H.264 and
//! muxed into MP4. The encoder and muxer come from a [`VideoHost`]; with the
//! `recording` feature that is openh264 + muxide.
//!
//! # Example
//! ```rust,ignore
//! use reelcap::recording::{platform_host, VideoFrameEncoder};
//!
//! let host = platform_host();
//! let mut encoder = VideoFrameEncoder::new(host.as_deref(), 1280, 720, &options)?;
//! for frame in frames {
//!     encoder.write_frame(frame)?;
//! }
//! let (mp4, stats) = encoder.finish()?;
//! ```

mod config;
mod encoder;
mod host;
mod recorder;

pub use config::{RecordingStats, VideoConfig, KEYFRAME_INTERVAL};
#[cfg(feature = "recording")]
pub use encoder::H264Encoder;
pub use encoder::{rgba_to_yuv420, ChunkEncoder, EncodedChunk};
#[cfg(feature = "recording")]
pub use host::{Mp4Muxer, OpenH264Host};
pub use host::{platform_host, ChunkMuxer, MuxStats, VideoHost};
pub use recorder::{encode_frames, VideoFrameEncoder};

#[cfg(test)]
mod tests;
