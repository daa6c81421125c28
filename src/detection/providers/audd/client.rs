//! AudD HTTP client
//!
//! AudD recognizes audio it downloads itself, so the segment must carry a
//! publicly reachable `clip_url`. The request is a form-encoded POST.

use async_trait::async_trait;
use std::time::Duration;

use super::{adapter, dto};
use crate::detection::domain::{ProviderError, RecognitionResult, Segment};
use crate::detection::providers::http;
use crate::detection::traits::RecognitionProvider;

const DEFAULT_BASE_URL: &str = "https://api.audd.io/";

pub struct AudDClient {
    name: String,
    api_token: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl AudDClient {
    pub fn new(
        name: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            api_token: api_token.into(),
            http_client: http::build_client(timeout)?,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn form_body(&self, clip_url: &str) -> String {
        format!(
            "api_token={}&url={}&return=apple_music,spotify",
            urlencoding::encode(&self.api_token),
            urlencoding::encode(clip_url)
        )
    }
}

#[async_trait]
impl RecognitionProvider for AudDClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(&self, segment: &Segment) -> Result<RecognitionResult, ProviderError> {
        let Some(clip_url) = segment.clip_url.as_deref() else {
            return Err(ProviderError::Unsupported("segment has no clip URL".into()));
        };

        let response = self
            .http_client
            .post(&self.base_url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(self.form_body(clip_url))
            .send()
            .await
            .map_err(http::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http::status_error(status, &body));
        }

        let response = response
            .json::<dto::RecognizeResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        adapter::to_result(response, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::{Classification, Signature};

    #[test]
    fn test_form_body_encodes_values() {
        let client = AudDClient::new("audd", "tok&en", Duration::from_secs(5)).unwrap();
        let body = client.form_body("https://clips.example/a b.mp3");
        assert_eq!(
            body,
            "api_token=tok%26en&url=https%3A%2F%2Fclips.example%2Fa%20b.mp3&return=apple_music,spotify"
        );
    }

    #[tokio::test]
    async fn test_segment_without_clip_is_unsupported() {
        let client = AudDClient::new("audd", "token", Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:9/");
        let segment = Segment {
            station_id: 1,
            captured_at: chrono::Utc::now(),
            classification: Classification::Music,
            signature: Signature::new("AQAD", vec![]),
            span_secs: Some(10),
            metadata: Default::default(),
            reference: None,
            clip_url: None,
        };
        let result = client.detect(&segment).await;
        assert!(matches!(result, Err(ProviderError::Unsupported(_))));
    }
}
