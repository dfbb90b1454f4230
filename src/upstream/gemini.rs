//! Google Generative Language `streamGenerateContent` client

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{ChunkStream, Upstream};
use crate::config::UpstreamConfig;
use crate::error::{Result, StreamforgeError};

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: [GeminiContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

/// Streaming client for Gemini models
///
/// Without `alt=sse`, `streamGenerateContent` answers with one top-level
/// JSON array of response objects that grows as generation proceeds. The
/// extractor only yields complete top-level values, so the whole reply
/// surfaces as a single token once the closing `]` arrives. Servers that
/// stream bare sibling objects instead produce one token per object.
#[derive(Debug, Clone)]
pub struct GeminiUpstream {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl GeminiUpstream {
    /// Create a client from upstream configuration
    ///
    /// # Errors
    ///
    /// Returns `StreamforgeError::Config` when no API key is configured and
    /// `StreamforgeError::Upstream` if the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use streamforge::config::UpstreamConfig;
    /// use streamforge::upstream::GeminiUpstream;
    ///
    /// let config = UpstreamConfig {
    ///     api_key: Some("test-key".to_string()),
    ///     ..UpstreamConfig::default()
    /// };
    /// let upstream = GeminiUpstream::new(&config).unwrap();
    /// assert!(upstream.url().ends_with("/v1beta/models/gemini-2.0-flash:streamGenerateContent"));
    /// ```
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| StreamforgeError::Config("upstream.api_key is not configured".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("streamforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StreamforgeError::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        let url = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            config.stream_path.replace("{model}", &config.model)
        );

        tracing::info!("Initialized Gemini upstream: url={}, model={}", url, config.model);

        Ok(Self {
            client,
            url,
            api_key,
            model: config.model.clone(),
        })
    }

    /// Fully resolved stream endpoint, without the key parameter
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Configured model name
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Upstream for GeminiUpstream {
    async fn stream(&self, prompt: &str) -> Result<ChunkStream> {
        let preview: String = prompt.chars().take(50).collect();
        tracing::info!("Sending prompt to Gemini: '{}...'", preview);

        let body = GeminiRequest {
            contents: [GeminiContent {
                role: "user",
                parts: [GeminiPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to reach Gemini: {}", e);
                StreamforgeError::Upstream(format!("Failed to connect to Gemini: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Gemini returned error {}: {}", status, error_text);
            return Err(StreamforgeError::Upstream(format!(
                "Gemini API error {}: {}",
                status, error_text
            ))
            .into());
        }

        let chunks = response.bytes_stream().map_err(|e| {
            anyhow::Error::from(StreamforgeError::Upstream(format!(
                "Gemini stream interrupted: {}",
                e
            )))
        });
        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            api_key: Some("k".to_string()),
            model: "gemini-test".to_string(),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn test_url_substitutes_model() {
        let upstream = GeminiUpstream::new(&config("http://localhost:9/")).unwrap();
        assert_eq!(
            upstream.url(),
            "http://localhost:9/v1beta/models/gemini-test:streamGenerateContent"
        );
        assert_eq!(upstream.model(), "gemini-test");
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let mut cfg = config("http://localhost:9");
        cfg.api_key = Some("  ".to_string());
        let err = GeminiUpstream::new(&cfg).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StreamforgeError>(),
            Some(StreamforgeError::Config(_))
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let body = GeminiRequest {
            contents: [GeminiContent {
                role: "user",
                parts: [GeminiPart { text: "hi" }],
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"contents": [{"role": "user", "parts": [{"text": "hi"}]}]})
        );
    }
}
