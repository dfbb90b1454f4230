//! Stream assembly: chunk source to emitted tokens
//!
//! [`StreamAssembler`] pulls raw chunks from the upstream, feeds them through
//! the [`IncrementalJsonExtractor`] and a [`ResponseFormat`] projection, hands each non-empty
//! token to a [`TokenSink`], and accumulates the full response text. Every
//! run ends in exactly one [`StreamOutcome`]; the internal [`StreamState`]
//! only ever leaves `Running` once.
//!
//! Each chunk is completely processed (extraction, projection, emission)
//! before the next one is requested, so suspension only happens while
//! waiting on the chunk source or on sink backpressure.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::extractor::IncrementalJsonExtractor;
use super::projector::ResponseFormat;
use super::TokenSink;
use crate::error::Result;

/// Lifecycle of one outbound stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Chunks are still being consumed
    Running,
    /// The source ended and every token was delivered
    Completed,
    /// The source reported an error
    Errored,
    /// The consumer went away or cancellation was requested
    Cancelled,
}

impl StreamState {
    /// Move to a terminal state
    ///
    /// Returns `false` (and leaves the state untouched) when the stream has
    /// already terminated or when `to` is `Running`.
    pub fn transition(&mut self, to: StreamState) -> bool {
        if *self != StreamState::Running || to == StreamState::Running {
            return false;
        }
        *self = to;
        true
    }

    /// Returns true once a terminal state has been reached
    pub fn is_terminal(&self) -> bool {
        *self != StreamState::Running
    }
}

/// Terminal result of [`StreamAssembler::run`]
#[derive(Debug)]
pub enum StreamOutcome {
    /// Concatenation of every token handed to the sink
    Completed(String),
    /// The chunk source failed
    Errored(anyhow::Error),
    /// The stream was abandoned; no completion must be recorded
    Cancelled,
}

impl StreamOutcome {
    /// Metric label for this outcome
    pub fn label(&self) -> &'static str {
        match self {
            StreamOutcome::Completed(_) => "completed",
            StreamOutcome::Errored(_) => "errored",
            StreamOutcome::Cancelled => "cancelled",
        }
    }
}

/// Pure per-token rewrite applied before emission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenFilter {
    /// Emit tokens unchanged
    #[default]
    Identity,
    /// Turn exactly one leading space into two; markdown renderers on the
    /// client collapse a single leading space at chunk boundaries
    DoubleLeadingSpace,
}

impl TokenFilter {
    /// Apply the filter to one token
    ///
    /// # Examples
    ///
    /// ```
    /// use streamforge::stream::TokenFilter;
    ///
    /// let filter = TokenFilter::DoubleLeadingSpace;
    /// assert_eq!(filter.apply(" word".to_string()), "  word");
    /// assert_eq!(filter.apply("  word".to_string()), "  word");
    /// assert_eq!(filter.apply("word".to_string()), "word");
    /// ```
    pub fn apply(self, token: String) -> String {
        match self {
            TokenFilter::Identity => token,
            TokenFilter::DoubleLeadingSpace => {
                if token.starts_with(' ') && !token.starts_with("  ") {
                    tracing::trace!("Doubling leading space for token: '{}'", token);
                    format!(" {}", token)
                } else {
                    token
                }
            }
        }
    }
}

/// Drives one chunk source to a single terminal outcome
#[derive(Debug)]
pub struct StreamAssembler {
    extractor: IncrementalJsonExtractor,
    format: ResponseFormat,
    filter: TokenFilter,
    state: StreamState,
    collected: String,
    emitted: usize,
}

impl StreamAssembler {
    /// Create an assembler with its own extractor
    pub fn new(filter: TokenFilter) -> Self {
        Self {
            extractor: IncrementalJsonExtractor::new(),
            format: ResponseFormat::default(),
            filter,
            state: StreamState::Running,
            collected: String::new(),
            emitted: 0,
        }
    }

    /// Project values with `format` instead of the Gemini shape
    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of tokens handed to the sink so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Consume `source` until it ends, fails, or the stream is cancelled
    ///
    /// The source is dropped before this returns, whatever the outcome.
    /// Cancellation is observed both through `cancel` and through the sink
    /// refusing a token.
    pub async fn run<S, K>(
        &mut self,
        source: S,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> StreamOutcome
    where
        S: Stream<Item = Result<Bytes>> + Send,
        K: TokenSink + ?Sized,
    {
        if self.state.is_terminal() {
            return StreamOutcome::Errored(anyhow::anyhow!(
                "stream assembler already finished in state {:?}",
                self.state
            ));
        }

        tokio::pin!(source);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancel(),
                next = source.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    tracing::trace!(bytes = chunk.len(), "Upstream chunk received");
                    self.extractor.append(&chunk);
                    if !self.emit_ready(sink).await {
                        return self.cancel();
                    }
                }
                Some(Err(e)) => {
                    tracing::error!("Error during upstream stream processing: {:#}", e);
                    self.state.transition(StreamState::Errored);
                    return StreamOutcome::Errored(e);
                }
                None => {
                    tracing::debug!(
                        buffered = self.extractor.buffered_len(),
                        "Stream complete signal received, draining remaining buffer"
                    );
                    if !self.emit_ready(sink).await {
                        return self.cancel();
                    }
                    if !self.extractor.is_empty() {
                        tracing::warn!(
                            "Stream completed with non-parsable buffer content left: >>>{}<<<",
                            String::from_utf8_lossy(self.extractor.buffered())
                        );
                    }
                    self.state.transition(StreamState::Completed);
                    return StreamOutcome::Completed(std::mem::take(&mut self.collected));
                }
            }
        }
    }

    /// Emit every token that is complete in the buffer
    ///
    /// Returns `false` when the sink no longer accepts tokens.
    async fn emit_ready<K>(&mut self, sink: &mut K) -> bool
    where
        K: TokenSink + ?Sized,
    {
        let filter = self.filter;
        let format = self.format;
        let tokens: Vec<String> = self
            .extractor
            .drain()
            .filter_map(|value| match format.project(value.as_str()) {
                Ok(fragments) => Some(fragments.concat()),
                Err(e) => {
                    tracing::error!("{:#}", e);
                    None
                }
            })
            .map(|text| filter.apply(text))
            .filter(|text| !text.is_empty())
            .collect();

        for token in tokens {
            if !sink.accept(&token).await {
                return false;
            }
            self.collected.push_str(&token);
            self.emitted += 1;
        }
        true
    }

    fn cancel(&mut self) -> StreamOutcome {
        tracing::info!(emitted = self.emitted, "Stream cancelled before completion");
        self.state.transition(StreamState::Cancelled);
        self.collected.clear();
        StreamOutcome::Cancelled
    }
}
