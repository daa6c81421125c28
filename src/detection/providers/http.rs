//! HTTP plumbing shared by the provider clients.

use std::time::Duration;

use reqwest::StatusCode;

use crate::detection::domain::ProviderError;

/// Build the HTTP client used by a provider.
///
/// Accepts gzip responses and identifies the application in the
/// User-Agent. The request timeout is a backstop; the chain applies its own.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .gzip(true)
        .timeout(timeout + Duration::from_secs(1))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {}", e)))
}

/// Map a transport error.
pub fn transport_error(error: reqwest::Error) -> ProviderError {
    ProviderError::Network(error.to_string())
}

/// Map a non-success HTTP status, keeping a short excerpt of the body.
pub fn status_error(status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited;
    }
    let message = format!(
        "HTTP {}: {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown"),
        body.chars().take(200).collect::<String>()
    );
    if status.is_server_error() {
        ProviderError::Network(message)
    } else {
        ProviderError::Api(message)
    }
}
