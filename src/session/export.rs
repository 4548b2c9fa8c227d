use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

use super::phase::{Phase, ProgressPlan};
use crate::assert_invariant;
use crate::capture::{CaptureHandle, CaptureReport, CaptureSettings, FrameBuffer, FrameCapturer, Surface};
use crate::errors::{ErrorKind, ExportError};
use crate::gif::{self, GifJob, WorkerFactory};
use crate::gif::neuquant::MAX_SAMPLE_FACTOR;
use crate::recording::{self, VideoHost};
use crate::types::{EncodingOptions, ExportBlob, ExportFormat, LoopCount};

/// Identifies one export; stale tokens are rejected by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionToken(Uuid);

impl SessionToken {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything needed to run one export
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub options: EncodingOptions,
    pub capture: CaptureSettings,
    /// NeuQuant sampling stride (1 = every pixel)
    pub gif_sample_factor: u32,
    pub gif_repeat: LoopCount,
    pub filename_prefix: String,
}

impl ExportRequest {
    pub const DEFAULT_SAMPLE_FACTOR: u32 = 10;
    pub const DEFAULT_PREFIX: &'static str = "chat";

    /// Request with capture settings derived from the options: the target
    /// frame rate and the quality tier's pixel ratio.
    pub fn new(options: EncodingOptions) -> Self {
        Self {
            options,
            capture: CaptureSettings::new(options.frame_rate, options.params().pixel_ratio),
            gif_sample_factor: Self::DEFAULT_SAMPLE_FACTOR,
            gif_repeat: LoopCount::Infinite,
            filename_prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn with_capture(mut self, capture: CaptureSettings) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_gif(mut self, sample_factor: u32, repeat: LoopCount) -> Self {
        self.gif_sample_factor = sample_factor;
        self.gif_repeat = repeat;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filename_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        self.options.validate()?;
        self.capture.validate()?;
        if self.capture.frame_rate != self.options.frame_rate {
            return Err(ExportError::InvalidArgument(format!(
                "capture rate {} does not match encoding rate {}",
                self.capture.frame_rate, self.options.frame_rate
            )));
        }
        if !(1..=MAX_SAMPLE_FACTOR).contains(&self.gif_sample_factor) {
            return Err(ExportError::InvalidArgument(format!(
                "GIF sample factor must be 1-{}, got {}",
                MAX_SAMPLE_FACTOR, self.gif_sample_factor
            )));
        }
        if self.filename_prefix.is_empty() {
            return Err(ExportError::InvalidArgument(
                "filename prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub token: SessionToken,
    pub phase: Phase,
    pub progress: u8,
    pub frame_count: usize,
    pub format: ExportFormat,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub output_filename: Option<String>,
    pub output_bytes: Option<usize>,
    pub capture: Option<CaptureReport>,
    pub started_at: DateTime<Utc>,
}

struct SessionState {
    phase: Phase,
    capture: Option<CaptureHandle>,
    output: Option<ExportBlob>,
    error: Option<(ErrorKind, String)>,
    report: Option<CaptureReport>,
}

/// One export: owns the frame buffer, the capture loop and the result.
pub struct ExportSession {
    token: SessionToken,
    request: ExportRequest,
    plan: ProgressPlan,
    state: Mutex<SessionState>,
    progress: AtomicU8,
    cancelled: AtomicBool,
    /// Frames handed to the encoder once capture stopped
    captured: AtomicUsize,
    buffer: Arc<FrameBuffer>,
    video_host: Option<Arc<dyn VideoHost>>,
    gif_worker: WorkerFactory,
    started_at: DateTime<Utc>,
    capture_started: Instant,
}

impl ExportSession {
    /// Validate the request and start capturing from `surface`.
    pub(crate) fn start(
        request: ExportRequest,
        surface: Box<dyn Surface>,
        video_host: Option<Arc<dyn VideoHost>>,
        gif_worker: WorkerFactory,
    ) -> Result<Arc<Self>, ExportError> {
        request.validate()?;

        let session = Arc::new(Self {
            token: SessionToken::new(),
            plan: ProgressPlan::for_format(request.options.format),
            buffer: Arc::new(FrameBuffer::new(request.capture.max_frames)),
            request,
            state: Mutex::new(SessionState {
                phase: Phase::Idle,
                capture: None,
                output: None,
                error: None,
                report: None,
            }),
            progress: AtomicU8::new(0),
            cancelled: AtomicBool::new(false),
            captured: AtomicUsize::new(0),
            video_host,
            gif_worker,
            started_at: Utc::now(),
            capture_started: Instant::now(),
        });

        let capturer = FrameCapturer::new(session.request.capture.clone())?;
        let handle = capturer.start_into(surface, session.buffer.clone())?;

        {
            let mut state = session.state.lock().expect("lock poisoned");
            state.capture = Some(handle);
            session.transition(&mut state, Phase::Capturing);
        }
        log::info!(
            "Session {} started: {} @ {} fps, {} quality",
            session.token,
            session.request.options.format.extension(),
            session.request.options.frame_rate,
            session.request.options.quality.as_str()
        );
        Ok(session)
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn request(&self) -> &ExportRequest {
        &self.request
    }

    pub fn phase(&self) -> Phase {
        let mut state = self.state.lock().expect("lock poisoned");
        self.refresh(&mut state);
        state.phase
    }

    /// 0-100
    pub fn progress(&self) -> u8 {
        let mut state = self.state.lock().expect("lock poisoned");
        self.refresh(&mut state);
        if state.phase == Phase::Capturing {
            let heartbeat = self.plan.capture(self.capture_started.elapsed());
            self.progress.fetch_max(heartbeat, Ordering::SeqCst);
        }
        let progress = self.progress.load(Ordering::SeqCst);
        assert_invariant!(
            progress <= 100,
            "Session progress stays within 0-100",
            "session::progress"
        );
        progress
    }

    /// Frames buffered so far, or handed to the encoder once capture stopped
    pub fn frame_count(&self) -> usize {
        let state = self.state.lock().expect("lock poisoned");
        match state.phase {
            Phase::Capturing => self.buffer.len(),
            Phase::Idle => 0,
            _ => self.captured.load(Ordering::SeqCst).max(self.buffer.len()),
        }
    }

    pub fn output(&self) -> Option<ExportBlob> {
        self.state.lock().expect("lock poisoned").output.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        let mut state = self.state.lock().expect("lock poisoned");
        self.refresh(&mut state);
        state.error.as_ref().map(|(_, message)| message.clone())
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        let mut state = self.state.lock().expect("lock poisoned");
        self.refresh(&mut state);
        state.error.as_ref().map(|(kind, _)| *kind)
    }

    pub fn capture_report(&self) -> Option<CaptureReport> {
        self.state.lock().expect("lock poisoned").report.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let progress = self.progress();
        let frame_count = self.frame_count();
        let state = self.state.lock().expect("lock poisoned");
        SessionSnapshot {
            token: self.token,
            phase: state.phase,
            progress,
            frame_count,
            format: self.request.options.format,
            error: state.error.as_ref().map(|(_, message)| message.clone()),
            error_kind: state.error.as_ref().map(|(kind, _)| *kind),
            output_filename: state.output.as_ref().map(|b| b.filename.clone()),
            output_bytes: state.output.as_ref().map(ExportBlob::len),
            capture: state.report.clone(),
            started_at: self.started_at,
        }
    }

    fn transition(&self, state: &mut SessionState, next: Phase) {
        assert_invariant!(
            state.phase.can_transition_to(next),
            "Session phase transitions follow the export lifecycle",
            "session::transition"
        );
        if state.phase != next {
            log::info!("Session {}: {} -> {}", self.token, state.phase, next);
        }
        state.phase = next;
    }

    /// Move to `Error` if the capture loop ended on the frame cap.
    fn refresh(&self, state: &mut SessionState) {
        if state.phase == Phase::Capturing && self.buffer.overflowed() {
            let err = ExportError::FrameLimitExceeded {
                limit: self.buffer.limit(),
            };
            if let Some(handle) = state.capture.take() {
                handle.cancel();
            }
            self.fail(state, &err);
        }
    }

    fn fail(&self, state: &mut SessionState, err: &ExportError) {
        assert_invariant!(
            err.is_terminal(),
            "Only terminal errors end a session",
            "session::fail"
        );
        log::error!("Session {} failed: {}", self.token, err);
        self.transition(state, Phase::Error);
        state.error = Some((err.kind(), err.to_string()));
        state.output = None;
        self.buffer.clear();
    }

    /// Freeze the frame list, encode it and return the finished blob.
    ///
    /// Runs the encoder on the calling thread (the GIF path additionally
    /// hands frames to its worker). Any failure ends the session in `Error`
    /// and no partial output is kept.
    pub(crate) fn stop(&self) -> Result<ExportBlob, ExportError> {
        let handle = {
            let mut state = self.state.lock().expect("lock poisoned");
            self.refresh(&mut state);
            match state.phase {
                Phase::Capturing => {}
                Phase::Error if self.buffer.overflowed() => {
                    return Err(ExportError::FrameLimitExceeded {
                        limit: self.buffer.limit(),
                    })
                }
                other => {
                    return Err(ExportError::InvalidState(format!(
                        "cannot stop a session that is {}",
                        other
                    )))
                }
            }
            self.transition(&mut state, Phase::Processing);
            self.progress
                .fetch_max(self.plan.capture_end, Ordering::SeqCst);
            state.capture.take()
        };

        let result = self.process(handle);

        let mut state = self.state.lock().expect("lock poisoned");
        if self.cancelled.load(Ordering::SeqCst) {
            log::info!("Session {} was reset while processing; discarding result", self.token);
            return Err(ExportError::Cancelled);
        }
        match result {
            Ok(blob) => {
                self.transition(&mut state, Phase::Done);
                self.progress.store(self.plan.done(), Ordering::SeqCst);
                state.output = Some(blob.clone());
                log::info!(
                    "Session {} done: {} ({}, {} bytes)",
                    self.token,
                    blob.filename,
                    blob.mime_type,
                    blob.len()
                );
                Ok(blob)
            }
            Err(err) => {
                self.fail(&mut state, &err);
                Err(err)
            }
        }
    }

    fn process(&self, handle: Option<CaptureHandle>) -> Result<ExportBlob, ExportError> {
        let handle = handle
            .ok_or_else(|| ExportError::CaptureFailure("capture loop is not running".to_string()))?;
        let (frames, report) = handle.stop_recording()?;
        self.captured.store(frames.len(), Ordering::SeqCst);
        self.state.lock().expect("lock poisoned").report = Some(report);

        if frames.is_empty() {
            return Err(ExportError::EmptyInput);
        }

        let options = self.request.options;
        let plan = self.plan;
        let on_progress = |done: usize, total: usize| {
            self.progress
                .fetch_max(plan.encode(done, total), Ordering::SeqCst);
        };

        let data = match options.format {
            ExportFormat::Gif => {
                let job = GifJob::new(
                    options,
                    self.request.gif_sample_factor,
                    self.request.gif_repeat,
                );
                gif::encode_frames_with(
                    &*self.gif_worker,
                    frames,
                    &job,
                    &self.cancelled,
                    on_progress,
                )?
            }
            ExportFormat::Mp4 => {
                let (data, stats) = recording::encode_frames(
                    self.video_host.as_deref(),
                    frames,
                    &options,
                    &self.cancelled,
                    on_progress,
                )?;
                log::debug!(
                    "MP4 stats: {} frames, {:.2}s, {:.0} bps average",
                    stats.video_frames,
                    stats.duration_secs,
                    stats.avg_bitrate()
                );
                data
            }
        };
        self.progress.fetch_max(plan.finalize(), Ordering::SeqCst);

        if data.is_empty() {
            return Err(ExportError::EncodeFailure(
                "encoder produced no output".to_string(),
            ));
        }
        Ok(ExportBlob::new(
            options.format,
            &self.request.filename_prefix,
            data,
        ))
    }

    /// Drop frames and output and return to `Idle`. Encoding in progress on
    /// another thread stops at its next frame boundary.
    pub(crate) fn reset(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let handle = {
            let mut state = self.state.lock().expect("lock poisoned");
            self.transition(&mut state, Phase::Idle);
            state.output = None;
            state.error = None;
            state.report = None;
            state.capture.take()
        };
        if let Some(handle) = handle {
            handle.cancel();
        }
        self.buffer.clear();
        self.captured.store(0, Ordering::SeqCst);
        self.progress.store(0, Ordering::SeqCst);
        log::info!("Session {} reset", self.token);
    }
}
