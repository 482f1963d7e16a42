use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::DEFAULT_JPEG_QUALITY;
use crate::session::SessionPolicy;

/// Client configuration. Every field has a default, so a settings file only
/// needs to spell out what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Base URL of the detection service.
    pub server_url: String,
    /// Polling cadence.
    pub poll_interval_ms: u64,
    /// JPEG quality for submitted frames.
    pub jpeg_quality: u8,
    pub session: SessionPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            poll_interval_ms: 150,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            session: SessionPolicy::default(),
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }
}
