//! Detection service boundary.
//!
//! The service is an opaque `frame in, reading out` function reached over
//! HTTP/JSON. Everything the loop needs from it fits in two calls: submit a
//! frame, zero the counters.

mod http;
mod types;

use thiserror::Error;

pub use http::HttpDetectionClient;
pub use types::{DetectResponse, DetectionOutcome, FaceReading, ResetResponse, NO_FACE_ERROR};

#[derive(Error, Debug)]
pub enum ClientError {
    /// Non-2xx status from the service.
    #[error("detection service returned HTTP {0}")]
    Status(u16),
    /// Connection-level failure (refused, DNS, timeout, TLS).
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),
    /// 2xx response whose body was not the expected JSON.
    #[error("malformed response body: {0}")]
    Body(#[source] reqwest::Error),
}

/// Remote detection service contract.
#[async_trait::async_trait]
pub trait DetectionApi: Send + Sync {
    /// Submit one encoded frame for analysis.
    async fn detect(&self, frame: &str) -> Result<DetectResponse, ClientError>;

    /// Zero the server-side blink and liveness counters.
    async fn reset(&self) -> Result<ResetResponse, ClientError>;
}
