use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::DetectionOutcome;

use super::state::{LivenessMetrics, SessionStatus};

/// Shown for connection-level failures; the underlying transport detail is
/// logged, not displayed.
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error. Please try again.";
pub const CAMERA_ERROR_MESSAGE: &str =
    "Error: Cannot access camera. Please allow camera permissions.";
pub const FRAME_ERROR_MESSAGE: &str = "Error processing video frame.";
pub const RESET_FAILED_MESSAGE: &str = "Failed to reset detection counters. Please try again.";

/// Map one tick's outcome to a status.
///
/// Precedence is the classification order: a transport failure beats any
/// stale server-reported text, no-face beats a generic server error, and a
/// verified session beats plain face-detected.
pub fn derive_status(outcome: &DetectionOutcome, verified: bool) -> SessionStatus {
    match outcome {
        DetectionOutcome::Transport(_) => {
            SessionStatus::Error(CONNECTION_ERROR_MESSAGE.to_string())
        }
        DetectionOutcome::Capture(_) => SessionStatus::Error(FRAME_ERROR_MESSAGE.to_string()),
        DetectionOutcome::NoFace => SessionStatus::NoFace,
        DetectionOutcome::ServerError(text) => SessionStatus::Warning(text.clone()),
        DetectionOutcome::Face(_) => {
            if verified {
                SessionStatus::Verified
            } else {
                SessionStatus::FaceDetected
            }
        }
    }
}

/// Face-guide rendering hint: lit while the eyes read as closing. Computed
/// fresh every tick from the last-known EAR, whatever the outcome was.
pub fn guide_highlight(ear: Option<f64>, threshold: f64) -> bool {
    matches!(ear, Some(value) if value > 0.0 && value < threshold)
}

/// EAR meter fill, as a percentage of its track.
pub fn ear_meter_percent(ear: Option<f64>) -> f64 {
    (ear.unwrap_or(0.0) * 300.0).clamp(0.0, 100.0)
}

/// Rising-edge detector for the blink indicator.
///
/// Each edge of the rendered blink count re-arms a fixed pulse window, so
/// edges landing inside an open window still register. Time comes in as an
/// argument so callers (and tests) own the clock.
#[derive(Debug, Clone)]
pub struct BlinkPulse {
    window: Duration,
    last_rendered: u64,
    pulse_until: Option<Instant>,
}

impl BlinkPulse {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_rendered: 0,
            pulse_until: None,
        }
    }

    /// Feed the current blink count; returns whether the indicator is lit.
    pub fn observe(&mut self, blink_count: u64, now: Instant) -> bool {
        if blink_count > self.last_rendered {
            self.pulse_until = Some(now + self.window);
        }
        self.last_rendered = blink_count;
        self.pulse_until.is_some_and(|until| now < until)
    }

    pub fn clear(&mut self) {
        self.last_rendered = 0;
        self.pulse_until = None;
    }
}

/// What the view layer renders each tick.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewFrame {
    pub timestamp: DateTime<Utc>,
    pub status: SessionStatus,
    pub metrics: LivenessMetrics,
    pub guide_highlight: bool,
    pub blink_pulse: bool,
    pub debug_visible: bool,
}
