use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::ExportFormat;

/// Lifecycle of one export.
///
/// `Idle → Capturing → Processing → Done | Error`; `reset` returns to `Idle`
/// from anywhere. A capture that hits the frame cap goes straight to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Capturing,
    Processing,
    Done,
    Error,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (_, Idle)
                | (Idle, Capturing)
                | (Done, Capturing)
                | (Error, Capturing)
                | (Capturing, Processing)
                | (Capturing, Error)
                | (Processing, Done)
                | (Processing, Error)
        )
    }

    /// Capturing or Processing
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Capturing | Phase::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Capturing => "capturing",
            Phase::Processing => "processing",
            Phase::Done => "done",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the 0-100 progress value is split between capture, encode and
/// finalize for one output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressPlan {
    /// Progress reached when capture ends
    pub capture_end: u8,
    /// Progress reached when the last frame is encoded
    pub encode_end: u8,
}

/// Capture time after which the heartbeat shows half the capture share
pub const CAPTURE_HALF_SHARE: Duration = Duration::from_secs(3);

impl ProgressPlan {
    pub const GIF: ProgressPlan = ProgressPlan {
        capture_end: 5,
        encode_end: 95,
    };
    pub const MP4: ProgressPlan = ProgressPlan {
        capture_end: 10,
        encode_end: 90,
    };

    pub fn for_format(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Gif => Self::GIF,
            ExportFormat::Mp4 => Self::MP4,
        }
    }

    /// Capture heartbeat: climbs toward the capture share as time passes
    /// and stays below it until capture stops.
    pub fn capture(&self, elapsed: Duration) -> u8 {
        let ms = elapsed.as_millis();
        let half = CAPTURE_HALF_SHARE.as_millis();
        (self.capture_end as u128 * ms / (ms + half)) as u8
    }

    pub fn encode(&self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.capture_end;
        }
        let span = (self.encode_end - self.capture_end) as usize;
        self.capture_end + (span * done.min(total) / total) as u8
    }

    pub fn finalize(&self) -> u8 {
        self.encode_end
    }

    pub fn done(&self) -> u8 {
        100
    }
}
