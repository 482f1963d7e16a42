use serde::Deserialize;

/// Error string the service uses when no face is in the frame. Any other
/// non-empty `error` is an ordinary server-reported failure.
pub const NO_FACE_ERROR: &str = "No face detected";

/// Body of a 2xx reply from `POST /detect`.
///
/// Every field is optional on the wire: error replies skip `ear`, and the
/// service still attaches its current counters to no-face replies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectResponse {
    pub status: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub blink_count: Option<u64>,
    pub liveness_score: Option<u64>,
    pub ear: Option<f64>,
}

/// Body of a 2xx reply from `POST /reset`. Only logged; the client zeroes
/// its own state independently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetResponse {
    pub status: Option<String>,
    pub blink_count: Option<u64>,
    pub liveness_score: Option<u64>,
}

/// A reading from a frame in which the service found a face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceReading {
    pub blink_count: Option<u64>,
    pub liveness_score: Option<u64>,
    pub ear: Option<f64>,
}

/// One tick's result as fed to the session, success or failure.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    /// Face found; counters and EAR from the reading.
    Face(FaceReading),
    /// Frame processed but no face in it. Counters in the reply are ignored.
    NoFace,
    /// Service-reported failure, surfaced verbatim.
    ServerError(String),
    /// Request never produced a usable reply (HTTP error, connection loss).
    Transport(String),
    /// The local frame grab or encode failed; no request was sent.
    Capture(String),
}

impl DetectResponse {
    /// Classify a reply. No-face wins over a generic error string; an empty
    /// `error` counts as success.
    pub fn into_outcome(self) -> DetectionOutcome {
        match self.error.as_deref() {
            Some(NO_FACE_ERROR) => DetectionOutcome::NoFace,
            Some(text) if !text.is_empty() => DetectionOutcome::ServerError(text.to_string()),
            _ => DetectionOutcome::Face(FaceReading {
                blink_count: self.blink_count,
                liveness_score: self.liveness_score,
                ear: self.ear,
            }),
        }
    }
}
