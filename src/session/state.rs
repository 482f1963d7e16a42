use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::{DetectionOutcome, FaceReading};

use super::presenter::{self, BlinkPulse, ViewFrame};

/// Reconciliation knobs. Defaults reproduce the production service's
/// thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionPolicy {
    /// Liveness score at which the session counts as verified.
    pub verify_threshold: u64,
    /// Treat a present-but-zero counter or EAR as "field absent" and keep
    /// the previous value, instead of taking it as a real zero.
    pub zero_is_missing: bool,
    /// EAR below this (and above zero) lights the face-guide hint.
    pub ear_guide_threshold: f64,
    /// How long the blink indicator stays lit after a rising edge.
    pub blink_pulse_ms: u64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            verify_threshold: 30,
            zero_is_missing: false,
            ear_guide_threshold: 0.30,
            blink_pulse_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    CameraConnecting,
    Ready,
    Active,
    NoFace,
    /// Recoverable service-reported failure; text comes through verbatim.
    Warning(String),
    /// Transport, capture, or reset failure with a generic message.
    Error(String),
    FaceDetected,
    Verified,
}

impl SessionStatus {
    /// User-facing status line.
    pub fn message(&self) -> String {
        match self {
            SessionStatus::Idle => "Waiting to start.".to_string(),
            SessionStatus::CameraConnecting => "Connecting to camera...".to_string(),
            SessionStatus::Ready => {
                "Camera connected. Start detection to begin.".to_string()
            }
            SessionStatus::Active => {
                "Detecting... Please look at the camera and blink normally.".to_string()
            }
            SessionStatus::NoFace => {
                "No face detected. Please center your face in the frame.".to_string()
            }
            SessionStatus::Warning(text) => format!("Error: {text}"),
            SessionStatus::Error(text) => text.clone(),
            SessionStatus::FaceDetected => "Face detected! Blink naturally...".to_string(),
            SessionStatus::Verified => "Liveness verified!".to_string(),
        }
    }

    /// Stable category tag so renderers can style retry-automatically
    /// conditions apart from action-needed ones.
    pub fn category(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::CameraConnecting => "connecting",
            SessionStatus::Ready => "ready",
            SessionStatus::Active => "active",
            SessionStatus::NoFace | SessionStatus::Warning(_) => "warning",
            SessionStatus::Error(_) => "error",
            SessionStatus::FaceDetected => "success",
            SessionStatus::Verified => "verified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessMetrics {
    pub blink_count: u64,
    pub liveness_score: u64,
    /// Last EAR the service reported. `None` until the first reading; kept
    /// across frames that omit the field so the display never snaps back to
    /// a stale default.
    pub ear: Option<f64>,
}

/// The single mutable aggregate for one detection run.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    pub metrics: LivenessMetrics,
    /// Polling is currently scheduled.
    pub active: bool,
    /// A detect request is awaiting its response; ticks skip while set.
    pub in_flight: bool,
    pub camera_ready: bool,
    /// Latched once the score crosses the verify threshold; only an explicit
    /// reset clears it.
    pub verified: bool,
    pub run_id: Option<Uuid>,
    pub debug_visible: bool,
    policy: SessionPolicy,
    pulse: BlinkPulse,
}

impl SessionState {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            status: SessionStatus::Idle,
            metrics: LivenessMetrics::default(),
            active: false,
            in_flight: false,
            camera_ready: false,
            verified: false,
            run_id: None,
            debug_visible: false,
            policy,
            pulse: BlinkPulse::new(Duration::from_millis(policy.blink_pulse_ms)),
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn mark_camera_connecting(&mut self) {
        self.camera_ready = false;
        self.status = SessionStatus::CameraConnecting;
    }

    pub fn mark_camera_ready(&mut self) {
        self.camera_ready = true;
        if !self.active {
            self.status = SessionStatus::Ready;
        }
    }

    pub fn mark_camera_failed(&mut self) {
        self.camera_ready = false;
        self.status = SessionStatus::Error(presenter::CAMERA_ERROR_MESSAGE.to_string());
    }

    /// Start a fresh detection run: counters zeroed, verified latch cleared,
    /// polling armed.
    pub fn begin_run(&mut self, run_id: Uuid) {
        self.active = true;
        self.run_id = Some(run_id);
        self.reset();
        self.pulse.clear();
    }

    /// Stop polling. Any response still in flight is discarded on arrival
    /// because its run id no longer matches.
    pub fn end_run(&mut self) {
        self.active = false;
        self.in_flight = false;
        self.run_id = None;
        self.status = if self.camera_ready {
            SessionStatus::Ready
        } else {
            SessionStatus::Idle
        };
    }

    /// Zero the counters and the verified latch. The last EAR is kept for
    /// display continuity.
    pub fn reset(&mut self) {
        self.metrics.blink_count = 0;
        self.metrics.liveness_score = 0;
        self.verified = false;
        self.in_flight = false;
        self.status = if self.active {
            SessionStatus::Active
        } else if self.camera_ready {
            SessionStatus::Ready
        } else {
            SessionStatus::Idle
        };
    }

    /// Fold one tick's outcome into metrics and status.
    pub fn reconcile(&mut self, outcome: &DetectionOutcome) {
        self.apply_metrics(outcome);
        self.status = presenter::derive_status(outcome, self.verified);
    }

    /// Produce the per-tick view payload. Advances the blink pulse window.
    pub fn render(&mut self, now: Instant) -> ViewFrame {
        let blink_pulse = self.pulse.observe(self.metrics.blink_count, now);
        ViewFrame {
            timestamp: chrono::Utc::now(),
            status: self.status.clone(),
            metrics: self.metrics,
            guide_highlight: presenter::guide_highlight(
                self.metrics.ear,
                self.policy.ear_guide_threshold,
            ),
            blink_pulse,
            debug_visible: self.debug_visible,
        }
    }

    /// Counters update only from frames with a face in them; every failure
    /// outcome leaves the metrics untouched.
    fn apply_metrics(&mut self, outcome: &DetectionOutcome) {
        let DetectionOutcome::Face(reading) = outcome else {
            return;
        };
        let FaceReading {
            blink_count,
            liveness_score,
            ear,
        } = *reading;

        let incoming = merge_counter(blink_count, self.metrics.blink_count, &self.policy);
        // A single frame update never lowers the rendered blink count.
        self.metrics.blink_count = self.metrics.blink_count.max(incoming);

        self.metrics.liveness_score =
            merge_counter(liveness_score, self.metrics.liveness_score, &self.policy);
        self.metrics.ear = merge_ear(ear, self.metrics.ear, &self.policy);

        if self.metrics.liveness_score >= self.policy.verify_threshold {
            self.verified = true;
        }
    }
}

fn merge_counter(incoming: Option<u64>, previous: u64, policy: &SessionPolicy) -> u64 {
    match incoming {
        Some(0) if policy.zero_is_missing => previous,
        Some(value) => value,
        None => previous,
    }
}

fn merge_ear(incoming: Option<f64>, previous: Option<f64>, policy: &SessionPolicy) -> Option<f64> {
    match incoming {
        Some(value) if value == 0.0 && policy.zero_is_missing => previous,
        Some(value) => Some(value),
        None => previous,
    }
}
