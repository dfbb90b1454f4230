//! Configuration management for Streamforge
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, StreamforgeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Streamforge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream model service settings
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Durable store and cache backends
    #[serde(default)]
    pub storage: StorageConfig,
    /// Token stream behavior
    #[serde(default)]
    pub stream: StreamConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Date groups per page of `/stream/history`
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
    /// Messages per page of `/stream/history/messages`
    #[serde(default = "default_session_message_page_size")]
    pub session_message_page_size: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_history_page_size() -> usize {
    20
}

fn default_session_message_page_size() -> usize {
    6
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            history_page_size: default_history_page_size(),
            session_message_page_size: default_session_message_page_size(),
        }
    }
}

/// Which upstream protocol to speak
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpstreamProvider {
    /// Google Generative Language `streamGenerateContent`
    #[default]
    #[serde(rename = "gemini")]
    Gemini,
    /// OpenAI-compatible `chat/completions` (OpenRouter, vLLM, ...)
    #[serde(rename = "openai")]
    OpenAi,
}

impl std::fmt::Display for UpstreamProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamProvider::Gemini => write!(f, "gemini"),
            UpstreamProvider::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for UpstreamProvider {
    type Err = StreamforgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(UpstreamProvider::Gemini),
            "openai" | "openrouter" => Ok(UpstreamProvider::OpenAi),
            other => Err(StreamforgeError::Config(format!(
                "Invalid upstream provider: {}. Must be one of: gemini, openai",
                other
            ))),
        }
    }
}

/// Upstream model service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Protocol of the upstream service
    #[serde(default)]
    pub provider: UpstreamProvider,
    /// Scheme and host of the Generative Language API, or the API root of
    /// an OpenAI-compatible service (for example `https://openrouter.ai/api/v1`)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Gemini streaming path; `{model}` is replaced by `model`
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// Model name
    #[serde(default = "default_model")]
    pub model: String,
    /// API key sent as the `key` query parameter
    #[serde(default)]
    pub api_key: Option<String>,
    /// Whole-request timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_stream_path() -> String {
    "/v1beta/models/{model}:streamGenerateContent".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            provider: UpstreamProvider::default(),
            base_url: default_base_url(),
            stream_path: default_stream_path(),
            model: default_model(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Durable backend: `sqlite` or `memory`
    #[serde(default = "default_backend")]
    pub backend: String,
    /// SQLite file; defaults to the platform data directory
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Cache backend: `sled` or `memory`
    #[serde(default = "default_cache_backend")]
    pub cache_backend: String,
    /// sled directory; defaults to the platform data directory
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_cache_backend() -> String {
    "sled".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: None,
            cache_backend: default_cache_backend(),
            cache_path: None,
        }
    }
}

/// Token stream configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Double a single leading space on each token
    #[serde(default)]
    pub double_leading_space: bool,
}

impl Config {
    /// Load configuration from file, environment, and CLI overrides
    ///
    /// A missing file yields defaults with a warning.
    ///
    /// # Errors
    ///
    /// Returns `StreamforgeError::Config` if the file exists but cannot be
    /// read or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StreamforgeError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| StreamforgeError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(bind) = std::env::var("STREAMFORGE_BIND") {
            self.server.bind = bind;
        }

        if let Ok(size) = std::env::var("STREAMFORGE_HISTORY_PAGE_SIZE") {
            if let Ok(value) = size.parse() {
                self.server.history_page_size = value;
            } else {
                tracing::warn!("Invalid STREAMFORGE_HISTORY_PAGE_SIZE: {}", size);
            }
        }

        if let Ok(size) = std::env::var("STREAMFORGE_SESSION_MESSAGE_PAGE_SIZE") {
            if let Ok(value) = size.parse() {
                self.server.session_message_page_size = value;
            } else {
                tracing::warn!("Invalid STREAMFORGE_SESSION_MESSAGE_PAGE_SIZE: {}", size);
            }
        }

        if let Ok(provider) = std::env::var("STREAMFORGE_PROVIDER") {
            match provider.parse() {
                Ok(value) => self.upstream.provider = value,
                Err(e) => tracing::warn!("Invalid STREAMFORGE_PROVIDER: {}", e),
            }
        }

        if let Ok(base_url) = std::env::var("STREAMFORGE_BASE_URL") {
            self.upstream.base_url = base_url;
        }

        if let Ok(model) = std::env::var("STREAMFORGE_MODEL") {
            self.upstream.model = model;
        }

        if let Ok(api_key) = std::env::var("STREAMFORGE_API_KEY") {
            self.upstream.api_key = Some(api_key);
        }

        if let Ok(timeout) = std::env::var("STREAMFORGE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.upstream.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid STREAMFORGE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(backend) = std::env::var("STREAMFORGE_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }

        if let Ok(backend) = std::env::var("STREAMFORGE_CACHE_BACKEND") {
            self.storage.cache_backend = backend;
        }

        if let Ok(path) = std::env::var("STREAMFORGE_CACHE_PATH") {
            self.storage.cache_path = Some(PathBuf::from(path));
        }

        if let Ok(flag) = std::env::var("STREAMFORGE_DOUBLE_LEADING_SPACE") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.stream.double_leading_space = true,
                "0" | "false" | "no" => self.stream.double_leading_space = false,
                _ => tracing::warn!("Invalid STREAMFORGE_DOUBLE_LEADING_SPACE: {}", flag),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(path) = &cli.storage_path {
            self.storage.db_path = Some(path.clone());
        }

        if let crate::cli::Commands::Serve {
            bind: Some(bind), ..
        } = &cli.command
        {
            self.server.bind = bind.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `StreamforgeError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(StreamforgeError::Config("server.bind cannot be empty".to_string()).into());
        }

        if self.server.history_page_size == 0 {
            return Err(StreamforgeError::Config(
                "server.history_page_size must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.session_message_page_size == 0 {
            return Err(StreamforgeError::Config(
                "server.session_message_page_size must be greater than 0".to_string(),
            )
            .into());
        }

        if self.upstream.timeout_seconds == 0 {
            return Err(StreamforgeError::Config(
                "upstream.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.upstream.model.trim().is_empty() {
            return Err(
                StreamforgeError::Config("upstream.model cannot be empty".to_string()).into(),
            );
        }

        if let Err(e) = url::Url::parse(&self.upstream.base_url) {
            return Err(StreamforgeError::Config(format!(
                "upstream.base_url is not a valid URL: {}",
                e
            ))
            .into());
        }

        match self.upstream.provider {
            UpstreamProvider::Gemini => {
                if !self.upstream.stream_path.contains("{model}") {
                    return Err(StreamforgeError::Config(
                        "upstream.stream_path must contain the {model} placeholder".to_string(),
                    )
                    .into());
                }
            }
            UpstreamProvider::OpenAi => {
                if self.upstream.base_url == default_base_url() {
                    return Err(StreamforgeError::Config(
                        "upstream.base_url must point at the chat-completions API root for the openai provider"
                            .to_string(),
                    )
                    .into());
                }
            }
        }

        let valid_backends = ["sqlite", "memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(StreamforgeError::Config(format!(
                "Invalid storage backend: {}. Must be one of: {}",
                self.storage.backend,
                valid_backends.join(", ")
            ))
            .into());
        }

        let valid_caches = ["sled", "memory"];
        if !valid_caches.contains(&self.storage.cache_backend.as_str()) {
            return Err(StreamforgeError::Config(format!(
                "Invalid cache backend: {}. Must be one of: {}",
                self.storage.cache_backend,
                valid_caches.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}
