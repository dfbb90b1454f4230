//! Stream metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless a
//! recorder is installed by the embedding process.
//!
//! # Metrics
//!
//! - `chat_streams_total`: Counter of started chat streams
//! - `chat_streams_active`: Gauge of streams currently running
//! - `chat_stream_outcomes_total`: Counter of finished streams by `outcome`
//! - `chat_stream_tokens_total`: Counter of tokens emitted to clients
//! - `chat_stream_duration_seconds`: Histogram of stream duration by `outcome`
//!
//! # Examples
//!
//! ```
//! use streamforge::metrics::StreamMetrics;
//!
//! let metrics = StreamMetrics::start("sse");
//! metrics.finish("completed", 12);
//! ```

use metrics::{counter, decrement_gauge, histogram, increment_counter, increment_gauge};
use std::time::Instant;

/// Metrics for one chat stream, from start to terminal outcome
#[derive(Debug)]
pub struct StreamMetrics {
    transport: &'static str,
    start: Instant,
}

impl StreamMetrics {
    /// Count a new stream on `transport` (`"sse"` or `"ws"`)
    pub fn start(transport: &'static str) -> Self {
        increment_counter!("chat_streams_total", "transport" => transport);
        increment_gauge!("chat_streams_active", 1.0, "transport" => transport);
        Self {
            transport,
            start: Instant::now(),
        }
    }

    /// Record the terminal outcome and how many tokens were emitted
    pub fn finish(self, outcome: &'static str, tokens: usize) {
        let duration = self.start.elapsed();

        histogram!(
            "chat_stream_duration_seconds",
            duration.as_secs_f64(),
            "transport" => self.transport,
            "outcome" => outcome
        );
        counter!("chat_stream_tokens_total", tokens as u64, "transport" => self.transport);
        increment_counter!(
            "chat_stream_outcomes_total",
            "transport" => self.transport,
            "outcome" => outcome
        );
        decrement_gauge!("chat_streams_active", 1.0, "transport" => self.transport);

        tracing::debug!(
            transport = self.transport,
            outcome,
            tokens,
            elapsed_ms = duration.as_millis() as u64,
            "Chat stream finished"
        );
    }

    /// Transport label
    pub fn transport(&self) -> &'static str {
        self.transport
    }
}
