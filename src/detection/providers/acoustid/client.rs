//! AcoustID HTTP client
//!
//! See: https://acoustid.org/webservice
//!
//! ## API Quirks
//!
//! The `meta` parameter uses a literal `+` as separator
//! (`recordings+releasegroups`). URL-encoding it to `%2B` makes the API
//! return results without metadata, so the URL is built by hand and only
//! the key and fingerprint are encoded.

use async_trait::async_trait;
use std::time::Duration;

use super::{adapter, dto};
use crate::detection::domain::{ProviderError, RecognitionResult, Segment};
use crate::detection::providers::http;
use crate::detection::traits::RecognitionProvider;

const DEFAULT_BASE_URL: &str = "https://api.acoustid.org/v2/lookup";

/// Fingerprint lookup against AcoustID.
pub struct AcoustIdClient {
    name: String,
    api_key: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl AcoustIdClient {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            api_key: api_key.into(),
            http_client: http::build_client(timeout)?,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn lookup_url(&self, fingerprint: &str, duration_secs: u32) -> String {
        format!(
            "{}?client={}&duration={}&fingerprint={}&meta=recordings+releasegroups+compress",
            self.base_url,
            urlencoding::encode(&self.api_key),
            duration_secs,
            urlencoding::encode(fingerprint)
        )
    }

    async fn send_lookup_request(&self, url: &str) -> Result<dto::LookupResponse, ProviderError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(http::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http::status_error(status, &body));
        }

        response
            .json::<dto::LookupResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[async_trait]
impl RecognitionProvider for AcoustIdClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(&self, segment: &Segment) -> Result<RecognitionResult, ProviderError> {
        // AcoustID requires the length of the fingerprinted audio
        let duration = match segment.signature.duration_secs {
            0 => segment.span_secs.unwrap_or(0),
            d => d,
        };
        if duration == 0 {
            return Err(ProviderError::Unsupported(
                "fingerprint lookup needs the audio duration".into(),
            ));
        }

        let url = self.lookup_url(&segment.signature.fingerprint, duration);
        let response = self.send_lookup_request(&url).await?;
        adapter::to_result(response, &self.name)
    }
}
