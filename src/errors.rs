use serde::Serialize;
use thiserror::Error;

/// Flat error category, for callers that only need to branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedPlatform,
    CaptureFailure,
    EncodeFailure,
    WorkerFailure,
    EmptyInput,
    FrameLimitExceeded,
    InvalidArgument,
    InvalidState,
    UnknownSession,
    Cancelled,
    Config,
    Io,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("Capture error: {0}")]
    CaptureFailure(String),
    #[error("Encoding error: {0}")]
    EncodeFailure(String),
    #[error("GIF worker error: {0}")]
    WorkerFailure(String),
    #[error("No frames captured")]
    EmptyInput,
    #[error("Frame limit exceeded: capture is capped at {limit} frames")]
    FrameLimitExceeded { limit: usize },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid session state: {0}")]
    InvalidState(String),
    #[error("Unknown or stale session: {0}")]
    UnknownSession(String),
    #[error("Export cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            ExportError::CaptureFailure(_) => ErrorKind::CaptureFailure,
            ExportError::EncodeFailure(_) => ErrorKind::EncodeFailure,
            ExportError::WorkerFailure(_) => ErrorKind::WorkerFailure,
            ExportError::EmptyInput => ErrorKind::EmptyInput,
            ExportError::FrameLimitExceeded { .. } => ErrorKind::FrameLimitExceeded,
            ExportError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ExportError::InvalidState(_) => ErrorKind::InvalidState,
            ExportError::UnknownSession(_) => ErrorKind::UnknownSession,
            ExportError::Cancelled => ErrorKind::Cancelled,
            ExportError::Config(_) => ErrorKind::Config,
            ExportError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this error, raised while an export runs, ends it in `Error`.
    ///
    /// Calls made in the wrong phase or with a stale token leave the session
    /// as it was, and a cancelled export returns to `Idle` instead. Skipped
    /// rasterizations never reach the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ExportError::InvalidState(_)
                | ExportError::UnknownSession(_)
                | ExportError::Cancelled
                | ExportError::Config(_)
        )
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err.to_string())
    }
}

impl From<image::ImageError> for ExportError {
    fn from(err: image::ImageError) -> Self {
        ExportError::CaptureFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_message() {
        assert_eq!(ExportError::EmptyInput.to_string(), "No frames captured");
        assert_eq!(ExportError::EmptyInput.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!ExportError::InvalidState("done".into()).is_terminal());
        assert!(!ExportError::UnknownSession("x".into()).is_terminal());
        assert!(!ExportError::Cancelled.is_terminal());
        assert!(ExportError::EmptyInput.is_terminal());
        assert!(ExportError::InvalidArgument("too wide".into()).is_terminal());
        assert!(ExportError::CaptureFailure("no loop".into()).is_terminal());
        assert!(ExportError::EncodeFailure("boom".into()).is_terminal());
        assert!(ExportError::WorkerFailure("gone".into()).is_terminal());
        assert!(ExportError::FrameLimitExceeded { limit: 3 }.is_terminal());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ExportError = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("missing"));
    }
}
