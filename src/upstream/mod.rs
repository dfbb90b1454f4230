//! Upstream model services
//!
//! Two clients exist: [`GeminiUpstream`] for `streamGenerateContent` and
//! [`OpenAiUpstream`] for OpenAI-compatible chat completions (OpenRouter and
//! friends). [`from_config`] picks one from `upstream.provider`.
//!
//! An [`Upstream`] turns a prompt into a stream of raw response chunks.
//! Chunk boundaries are arbitrary; reassembly happens in
//! [`crate::stream::StreamAssembler`]. Dropping the returned stream cancels
//! the request.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::{UpstreamConfig, UpstreamProvider};
use crate::error::Result;
use crate::stream::ResponseFormat;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiUpstream;
pub use openai::OpenAiUpstream;

/// Raw response chunks from an upstream request
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A streaming text-generation service
#[async_trait]
pub trait Upstream: Send + Sync + std::fmt::Debug {
    /// Start a streaming generation for `prompt`
    ///
    /// # Errors
    ///
    /// Returns `StreamforgeError::Upstream` when the request cannot be sent
    /// or the service answers with an error status.
    async fn stream(&self, prompt: &str) -> Result<ChunkStream>;

    /// Shape of the JSON values in the chunk stream
    fn format(&self) -> ResponseFormat {
        ResponseFormat::Gemini
    }
}

/// Build the upstream selected by `config.provider`
///
/// # Errors
///
/// Propagates the constructor error of the selected client.
pub fn from_config(config: &UpstreamConfig) -> Result<Arc<dyn Upstream>> {
    let upstream: Arc<dyn Upstream> = match config.provider {
        UpstreamProvider::Gemini => Arc::new(GeminiUpstream::new(config)?),
        UpstreamProvider::OpenAi => Arc::new(OpenAiUpstream::new(config)?),
    };
    tracing::debug!(provider = %config.provider, "Upstream selected");
    Ok(upstream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_selects_provider_format() {
        let mut config = UpstreamConfig {
            api_key: Some("k".to_string()),
            ..UpstreamConfig::default()
        };
        assert_eq!(from_config(&config).unwrap().format(), ResponseFormat::Gemini);

        config.provider = UpstreamProvider::OpenAi;
        config.base_url = "https://openrouter.ai/api/v1".to_string();
        assert_eq!(
            from_config(&config).unwrap().format(),
            ResponseFormat::ChatCompletion
        );
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let config = UpstreamConfig {
            provider: UpstreamProvider::OpenAi,
            ..UpstreamConfig::default()
        };
        assert!(from_config(&config).is_err());
    }
}
