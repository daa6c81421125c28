//! Concrete recognition providers and construction from configuration.
//!
//! Each provider follows the same split:
//! - `dto.rs` - exact API response shapes
//! - `adapter.rs` - the only place DTOs become domain types
//! - `client.rs` - HTTP client implementing
//!   [`RecognitionProvider`](crate::detection::RecognitionProvider)

pub mod acoustid;
pub mod audd;
mod http;

use std::sync::Arc;

pub use acoustid::AcoustIdClient;
pub use audd::AudDClient;

use super::chain::{ChainEntry, RecognitionChain};
use super::confidence::ConfidenceModel;
use super::traits::RecognitionProvider;
use crate::config::{Config, ProviderConfig, ProviderKind};
use crate::error::{Error, Result};

/// Trust factors for the configured providers, by position.
pub fn confidence_model(providers: &[ProviderConfig]) -> ConfidenceModel {
    providers
        .iter()
        .enumerate()
        .fold(ConfidenceModel::new(), |model, (position, p)| {
            model.with_provider(p.name.clone(), p.trust_factor_at(position))
        })
}

/// Instantiate the client for one provider entry.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn RecognitionProvider>> {
    let api_key = config
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| Error::config(format!("provider '{}' has no api_key", config.name)))?;

    let provider: Arc<dyn RecognitionProvider> = match config.kind {
        ProviderKind::AcoustId => {
            let mut client = AcoustIdClient::new(&config.name, api_key, config.timeout())?;
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
        ProviderKind::AudD => {
            let mut client = AudDClient::new(&config.name, api_key, config.timeout())?;
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
    };
    Ok(provider)
}

/// Build the fallback chain in configured priority order.
pub fn build_chain(config: &Config, model: Arc<ConfidenceModel>) -> Result<RecognitionChain> {
    let entries = config
        .providers
        .iter()
        .map(|p| {
            let provider = build_provider(p)?;
            tracing::info!(target: "chain", provider = %p.name, kind = ?p.kind, "Provider enabled");
            Ok(ChainEntry::new(provider, p.timeout(), p.retries).with_backoff(p.retry_backoff()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RecognitionChain::new(
        entries,
        model,
        config.detection.acceptance_threshold,
    ))
}
