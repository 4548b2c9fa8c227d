//! reelcap: capture an animated chat UI and export it as MP4 or animated GIF
//!
//! The pipeline samples a visual surface at a bounded frame rate, buffers the
//! frames, then encodes them either to H.264-in-MP4 through a host video
//! encoder or to GIF89a with a built-in NeuQuant quantizer and LZW coder
//! running on a worker thread.
//!
//! # Features
//! - Rate-limited surface capture with an explicit frame cap
//! - Animated GIF export with per-frame palettes and loop control
//! - MP4 export (openh264 + muxide) behind the `recording` feature
//! - A single-active-export session manager with progress reporting
//!
//! # Usage
//! ```toml
//! [dependencies]
//! reelcap = { version = "0.3", features = ["recording"] }
//! ```
//!
//! ```rust,ignore
//! use reelcap::{ExportRequest, SessionManager, SharedSurface};
//!
//! let surface = SharedSurface::new(first_screenshot);
//! let manager = SessionManager::new();
//! let token = manager
//!     .start(Box::new(surface.clone()), ExportRequest::new(options))?
//!     .expect("no export running");
//! // ... keep painting into `surface` ...
//! let blob = manager.stop(&token)?;
//! blob.write_to_dir("./exports")?;
//! ```
pub mod capture;
pub mod config;
pub mod errors;
pub mod gif;
pub mod invariant_ppt;
pub mod recording;
pub mod session;
pub mod sink;
pub mod types;

// Testing utilities - synthetic chat frames and fake hosts for offline testing
pub mod testing;

// Re-exports for convenience
pub use capture::{CaptureSettings, FrameCapturer, ImageSequenceSurface, SharedSurface, Surface};
pub use config::ReelcapConfig;
pub use errors::{ErrorKind, ExportError};
pub use session::{ExportRequest, Phase, SessionManager, SessionToken};
pub use sink::ByteSink;
pub use types::{
    EncodingOptions, ExportBlob, ExportFormat, Frame, LoopCount, Quality, QualityParams,
};

/// Initialize logging for the exporter
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "reelcap=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        mp4_supported: recording::platform_host().is_some(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub mp4_supported: bool,
}
