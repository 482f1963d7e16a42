use log::{debug, info};
use serde::Serialize;

use super::{ClientError, DetectResponse, DetectionApi, ResetResponse};

/// `DetectionApi` over the service's HTTP/JSON endpoints.
pub struct HttpDetectionClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    frame: &'a str,
}

impl HttpDetectionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        response.json().await.map_err(ClientError::Body)
    }
}

#[async_trait::async_trait]
impl DetectionApi for HttpDetectionClient {
    async fn detect(&self, frame: &str) -> Result<DetectResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint("detect"))
            .json(&DetectRequest { frame })
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let parsed: DetectResponse = Self::parse(response).await?;
        debug!(
            "detect reply: blinks={:?} score={:?} ear={:?} error={:?}",
            parsed.blink_count, parsed.liveness_score, parsed.ear, parsed.error
        );
        Ok(parsed)
    }

    async fn reset(&self) -> Result<ResetResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint("reset"))
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let parsed: ResetResponse = Self::parse(response).await?;
        info!("detection service counters reset ({:?})", parsed.status);
        Ok(parsed)
    }
}
