//! Error types for Streamforge
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Streamforge operations
///
/// Parsing errors (`MalformedUpstreamChunk`, `Projection`) are non-fatal and
/// only ever logged by the streaming pipeline. `NotFound` and `InvalidPage`
/// are surfaced to HTTP clients as 404 and 400 respectively.
#[derive(Error, Debug)]
pub enum StreamforgeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream model service errors (request failures, error statuses, broken streams)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Buffered upstream bytes that cannot currently be resolved into a JSON value
    #[error("Malformed upstream chunk: {0}")]
    MalformedUpstreamChunk(String),

    /// A complete JSON value that could not be projected into text
    #[error("Projection error: {0}")]
    Projection(String),

    /// Durable session store errors (system of record)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cache log errors (fast ordered message log)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Requested session does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Requested page is outside the valid range
    #[error("Invalid page number {page}. Page must be between 1 and {max}.")]
    InvalidPage {
        /// The page that was requested
        page: i64,
        /// Highest page number that may be requested
        max: usize,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Streamforge operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Callers that
/// need to branch on the failure kind downcast to [`StreamforgeError`].
pub type Result<T> = anyhow::Result<T>;
