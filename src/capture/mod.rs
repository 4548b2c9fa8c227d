//! Frame capture
//!
//! A [`FrameCapturer`] runs a paint loop on its own thread. Every paint tick
//! it checks how long ago the last frame was accepted and rasterizes the
//! surface only once `1000 / frame_rate` ms have passed, so the sampling rate
//! never exceeds the target frame rate no matter how fast the loop ticks.
//! Accepted frames are appended to a shared, capped [`FrameBuffer`].

mod surface;

pub use surface::{scaled_size, ImageSequenceSurface, SharedSurface, Surface};

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::errors::ExportError;
use crate::types::Frame;

/// Timing and memory limits for one capture
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Target frames per second
    pub frame_rate: u32,
    /// Oversampling factor applied to the surface's logical size
    pub pixel_ratio: f32,
    /// Paint loop period
    pub paint_interval: Duration,
    /// Hard cap on buffered frames
    pub max_frames: usize,
}

impl CaptureSettings {
    pub const DEFAULT_PAINT_INTERVAL: Duration = Duration::from_millis(16);
    pub const DEFAULT_MAX_FRAMES: usize = 1800;

    pub fn new(frame_rate: u32, pixel_ratio: f32) -> Self {
        Self {
            frame_rate,
            pixel_ratio,
            paint_interval: Self::DEFAULT_PAINT_INTERVAL,
            max_frames: Self::DEFAULT_MAX_FRAMES,
        }
    }

    pub fn with_paint_interval(mut self, interval: Duration) -> Self {
        self.paint_interval = interval;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Minimum spacing between accepted frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.frame_rate.max(1) as u64)
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        if self.frame_rate == 0 {
            return Err(ExportError::InvalidArgument(
                "frame rate must be at least 1".to_string(),
            ));
        }
        if !(self.pixel_ratio > 0.0 && self.pixel_ratio <= 4.0) {
            return Err(ExportError::InvalidArgument(format!(
                "pixel ratio must be in (0, 4], got {}",
                self.pixel_ratio
            )));
        }
        if self.max_frames == 0 {
            return Err(ExportError::InvalidArgument(
                "frame cap must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

struct BufferInner {
    frames: Vec<Frame>,
    overflowed: bool,
}

/// Append-only frame list with an explicit cap.
///
/// Going over the cap drops everything buffered so far and marks the buffer
/// as overflowed; later pushes are refused.
pub struct FrameBuffer {
    inner: Mutex<BufferInner>,
    limit: usize,
}

impl FrameBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                frames: Vec::new(),
                overflowed: false,
            }),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn push(&self, frame: Frame) -> Result<usize, ExportError> {
        let mut g = self.inner.lock().expect("lock poisoned");
        if g.overflowed || g.frames.len() >= self.limit {
            if !g.overflowed {
                log::error!(
                    "Frame limit of {} reached; dropping {} buffered frames",
                    self.limit,
                    g.frames.len()
                );
            }
            g.overflowed = true;
            g.frames = Vec::new();
            return Err(ExportError::FrameLimitExceeded { limit: self.limit });
        }
        g.frames.push(frame);
        Ok(g.frames.len())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overflowed(&self) -> bool {
        self.inner.lock().expect("lock poisoned").overflowed
    }

    /// Take all buffered frames, leaving the buffer empty.
    pub fn drain(&self) -> Vec<Frame> {
        std::mem::take(&mut self.inner.lock().expect("lock poisoned").frames)
    }

    pub fn clear(&self) {
        self.inner.lock().expect("lock poisoned").frames.clear();
    }
}

/// Stop flag the capture loop sleeps on between paint ticks.
#[derive(Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock().expect("lock poisoned") = true;
        self.cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().expect("lock poisoned")
    }

    /// Sleep up to `timeout`; returns true as soon as the signal is stopped.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock().expect("lock poisoned");
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (g, _) = self
                .cv
                .wait_timeout(stopped, deadline - now)
                .expect("lock poisoned");
            stopped = g;
        }
        true
    }
}

/// What happened during one capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureReport {
    /// Frames appended to the buffer
    pub accepted: u64,
    /// Rasterizations that failed and were skipped
    pub skipped: u64,
    /// Paint loop iterations
    pub paint_ticks: u64,
    /// Set when the frame cap stopped the capture
    pub limit_reached: bool,
}

/// Starts capture loops with fixed settings.
#[derive(Debug, Clone)]
pub struct FrameCapturer {
    settings: CaptureSettings,
}

impl FrameCapturer {
    pub fn new(settings: CaptureSettings) -> Result<Self, ExportError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Spawn the capture thread, appending frames to a fresh buffer.
    pub fn start(&self, surface: Box<dyn Surface>) -> Result<CaptureHandle, ExportError> {
        let buffer = Arc::new(FrameBuffer::new(self.settings.max_frames));
        self.start_into(surface, buffer)
    }

    /// Spawn the capture thread, appending frames to `buffer`.
    pub fn start_into(
        &self,
        surface: Box<dyn Surface>,
        buffer: Arc<FrameBuffer>,
    ) -> Result<CaptureHandle, ExportError> {
        let signal = Arc::new(StopSignal::new());
        let running = Arc::new(AtomicBool::new(true));

        let loop_settings = self.settings.clone();
        let loop_signal = signal.clone();
        let loop_buffer = buffer.clone();
        let loop_running = running.clone();
        let thread = std::thread::Builder::new()
            .name("reelcap-capture".to_string())
            .spawn(move || {
                let report = capture_loop(surface, &loop_settings, &loop_signal, &loop_buffer);
                loop_running.store(false, Ordering::SeqCst);
                report
            })
            .map_err(|e| ExportError::CaptureFailure(format!("spawn failed: {e}")))?;

        log::info!(
            "Capture started: {} fps (every {:?}), pixel ratio {}, cap {} frames",
            self.settings.frame_rate,
            self.settings.frame_interval(),
            self.settings.pixel_ratio,
            self.settings.max_frames
        );

        Ok(CaptureHandle {
            signal,
            buffer,
            running,
            thread: Some(thread),
        })
    }
}

/// A running capture. Dropping the handle stops the loop.
pub struct CaptureHandle {
    signal: Arc<StopSignal>,
    buffer: Arc<FrameBuffer>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<CaptureReport>>,
}

impl CaptureHandle {
    pub fn frame_count(&self) -> usize {
        self.buffer.len()
    }

    /// False once the loop has exited, for example after hitting the frame cap.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn limit_reached(&self) -> bool {
        self.buffer.overflowed()
    }

    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }

    fn join(&mut self) -> Result<CaptureReport, ExportError> {
        self.signal.stop();
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ExportError::CaptureFailure("capture thread panicked".to_string())),
            None => Ok(CaptureReport::default()),
        }
    }

    /// Stop the loop and hand over the captured frames in capture order.
    pub fn stop_recording(mut self) -> Result<(Vec<Frame>, CaptureReport), ExportError> {
        let report = self.join()?;
        log::info!(
            "Capture stopped: {} accepted, {} skipped, {} paint ticks",
            report.accepted,
            report.skipped,
            report.paint_ticks
        );
        if self.buffer.overflowed() {
            return Err(ExportError::FrameLimitExceeded {
                limit: self.buffer.limit(),
            });
        }
        Ok((self.buffer.drain(), report))
    }

    /// Stop the loop and throw away everything captured.
    pub fn cancel(mut self) {
        if let Err(e) = self.join() {
            log::warn!("Error stopping capture: {}", e);
        }
        self.buffer.clear();
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.join() {
                log::warn!("Error stopping capture in drop: {}", e);
            }
        }
    }
}

fn capture_loop(
    mut surface: Box<dyn Surface>,
    settings: &CaptureSettings,
    signal: &StopSignal,
    buffer: &FrameBuffer,
) -> CaptureReport {
    let mut report = CaptureReport::default();
    let interval = settings.frame_interval();
    let started = Instant::now();
    let mut last_accepted: Option<Instant> = None;

    loop {
        if signal.is_stopped() {
            break;
        }
        report.paint_ticks += 1;

        let now = Instant::now();
        let due = last_accepted.map_or(true, |t| now.duration_since(t) >= interval);
        if due {
            match surface.rasterize(settings.pixel_ratio) {
                Ok(frame) => {
                    if signal.is_stopped() {
                        break;
                    }
                    last_accepted = Some(now);
                    let timestamp_us = now.duration_since(started).as_micros() as u64;
                    let frame = frame.with_timing(report.accepted, timestamp_us);
                    match buffer.push(frame) {
                        Ok(_) => report.accepted += 1,
                        Err(_) => {
                            report.limit_reached = true;
                            break;
                        }
                    }
                }
                Err(e) => {
                    report.skipped += 1;
                    log::warn!("Skipping frame: {}", e);
                }
            }
        }

        if signal.wait(settings.paint_interval) {
            break;
        }
    }

    report
}
