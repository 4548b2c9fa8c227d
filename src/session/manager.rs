use std::sync::{Arc, Mutex};

use super::export::{ExportRequest, ExportSession, SessionSnapshot, SessionToken};
use super::phase::Phase;
use crate::capture::Surface;
use crate::errors::{ErrorKind, ExportError};
use crate::gif::{default_worker_factory, WorkerFactory};
use crate::recording::{platform_host, VideoHost};
use crate::types::ExportBlob;

/// Holds the single active export.
///
/// `start` while an export is capturing or processing is a no-op that
/// returns `Ok(None)`; the running session is not touched. Every other call
/// addresses the session through its token.
pub struct SessionManager {
    active: Mutex<Option<Arc<ExportSession>>>,
    video_host: Option<Arc<dyn VideoHost>>,
    gif_worker: WorkerFactory,
}

impl SessionManager {
    /// Manager using this build's video host for MP4 exports
    pub fn new() -> Self {
        Self::with_video_host(platform_host())
    }

    pub fn with_video_host(video_host: Option<Arc<dyn VideoHost>>) -> Self {
        Self {
            active: Mutex::new(None),
            video_host,
            gif_worker: default_worker_factory(),
        }
    }

    /// Replace how GIF exports spawn their encoding worker.
    pub fn with_gif_worker(mut self, gif_worker: WorkerFactory) -> Self {
        self.gif_worker = gif_worker;
        self
    }

    pub fn supports_mp4(&self) -> bool {
        self.video_host.is_some()
    }

    /// Begin capturing `surface`.
    ///
    /// Returns the new session's token, or `None` when another export is
    /// still active. A finished or failed session is replaced.
    pub fn start(
        &self,
        surface: Box<dyn Surface>,
        request: ExportRequest,
    ) -> Result<Option<SessionToken>, ExportError> {
        let mut active = self.active.lock().expect("lock poisoned");

        if let Some(session) = active.as_ref() {
            let phase = session.phase();
            if phase.is_active() {
                log::info!(
                    "Export {} is {}; ignoring duplicate start",
                    session.token(),
                    phase
                );
                return Ok(None);
            }
        }
        if let Some(previous) = active.take() {
            previous.reset();
        }

        let session = ExportSession::start(
            request,
            surface,
            self.video_host.clone(),
            self.gif_worker.clone(),
        )?;
        let token = session.token();
        *active = Some(session);
        Ok(Some(token))
    }

    /// Stop capturing and encode. Blocks until the blob is ready.
    pub fn stop(&self, token: &SessionToken) -> Result<ExportBlob, ExportError> {
        let session = self.session(token)?;
        session.stop()
    }

    /// Discard the active session, its frames and its output.
    pub fn reset(&self) {
        let session = self.active.lock().expect("lock poisoned").take();
        if let Some(session) = session {
            session.reset();
        }
    }

    /// Look up the active session by token.
    pub fn session(&self, token: &SessionToken) -> Result<Arc<ExportSession>, ExportError> {
        let active = self.active.lock().expect("lock poisoned");
        match active.as_ref() {
            Some(session) if session.token() == *token => Ok(session.clone()),
            _ => Err(ExportError::UnknownSession(token.to_string())),
        }
    }

    pub fn active(&self) -> Option<Arc<ExportSession>> {
        self.active.lock().expect("lock poisoned").clone()
    }

    pub fn phase(&self) -> Phase {
        self.active().map_or(Phase::Idle, |s| s.phase())
    }

    pub fn progress(&self) -> u8 {
        self.active().map_or(0, |s| s.progress())
    }

    pub fn frame_count(&self) -> usize {
        self.active().map_or(0, |s| s.frame_count())
    }

    pub fn output(&self) -> Option<ExportBlob> {
        self.active().and_then(|s| s.output())
    }

    pub fn error_message(&self) -> Option<String> {
        self.active().and_then(|s| s.error_message())
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.active().and_then(|s| s.error_kind())
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.active().map(|s| s.snapshot())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
