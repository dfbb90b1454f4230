//! Streaming response pipeline
//!
//! Chunks from the upstream model service flow through three stages:
//!
//! - [`IncrementalJsonExtractor`]: reassembles complete JSON values from
//!   arbitrarily split byte chunks
//! - [`ResponseFormat`]: maps one response value to its text fragments
//! - [`StreamAssembler`]: emits tokens to a [`TokenSink`], accumulates the
//!   full reply, and reaches exactly one [`StreamOutcome`]

pub mod assembler;
pub mod extractor;
pub mod projector;

pub use assembler::{StreamAssembler, StreamOutcome, StreamState, TokenFilter};
pub use extractor::{ExtractedValue, IncrementalJsonExtractor};
pub use projector::{project, project_chat_completion, project_value, Field, ResponseFormat};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Event delivered to a streaming client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One non-empty token
    Token(String),
    /// The reply finished; carries the full text
    Completed(String),
    /// The upstream failed; carries a client-safe message
    Error(String),
}

/// Downstream consumer of emitted tokens
///
/// `accept` returns `false` once the consumer is gone, which the assembler
/// treats as cancellation.
#[async_trait]
pub trait TokenSink: Send {
    /// Deliver one token
    async fn accept(&mut self, token: &str) -> bool;
}

#[async_trait]
impl TokenSink for Vec<String> {
    async fn accept(&mut self, token: &str) -> bool {
        self.push(token.to_string());
        true
    }
}

#[async_trait]
impl TokenSink for mpsc::Sender<StreamEvent> {
    async fn accept(&mut self, token: &str) -> bool {
        self.send(StreamEvent::Token(token.to_string())).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_reports_closed_receiver() {
        let (mut tx, rx) = mpsc::channel::<StreamEvent>(4);
        assert!(tx.accept("a").await);
        drop(rx);
        assert!(!tx.accept("b").await);
    }

    #[tokio::test]
    async fn test_vec_sink_collects_in_order() {
        let mut sink: Vec<String> = Vec::new();
        sink.accept("a").await;
        sink.accept("b").await;
        assert_eq!(sink, vec!["a", "b"]);
    }
}
