//! Per-turn chat orchestration
//!
//! A turn resolves the session id, builds the prompt context from the cache
//! log, records the user message, then streams the upstream reply through a
//! [`StreamAssembler`] on its own task. Events reach the caller over a
//! bounded channel; dropping the event stream cancels the turn.

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::metrics::StreamMetrics;
use crate::session::SessionStore;
use crate::stream::{StreamAssembler, StreamEvent, StreamOutcome, TokenFilter};
use crate::upstream::Upstream;

const EVENT_BUFFER: usize = 64;

/// Generate a fresh session identifier
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Input for one chat turn
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Existing session to continue; a new id is generated when blank
    pub session_id: Option<String>,
    /// Owner recorded if the session is created by this turn
    pub user_id: Option<String>,
    /// The user's message
    pub message: String,
}

/// Events of one running turn
///
/// Dropping this stream cancels the turn: the upstream request is abandoned
/// and no bot message is recorded.
#[derive(Debug)]
pub struct TurnEvents {
    inner: ReceiverStream<StreamEvent>,
    _cancel_on_drop: DropGuard,
}

impl Stream for TurnEvents {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// A started chat turn
#[derive(Debug)]
pub struct ChatTurn {
    /// Session the turn belongs to (generated when none was supplied)
    pub session_id: String,
    /// Token, completion and error events in order
    pub events: TurnEvents,
    /// Background task; resolves to the terminal outcome
    pub task: JoinHandle<StreamOutcome>,
}

/// Chat turn coordinator shared by the HTTP and WebSocket surfaces
#[derive(Debug, Clone)]
pub struct ChatService {
    sessions: SessionStore,
    upstream: Arc<dyn Upstream>,
    filter: TokenFilter,
}

impl ChatService {
    /// Create a service over a session store and an upstream
    pub fn new(sessions: SessionStore, upstream: Arc<dyn Upstream>, filter: TokenFilter) -> Self {
        Self {
            sessions,
            upstream,
            filter,
        }
    }

    /// The session store used for context and persistence
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Start a turn and return its event stream
    ///
    /// Context building and the user-message commit happen before this
    /// returns; the upstream call runs on a spawned task. `transport` labels
    /// the stream metrics.
    pub async fn start_turn(&self, request: ChatRequest, transport: &'static str) -> ChatTurn {
        let session_id = match request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            Some(id) => id.to_string(),
            None => {
                let id = new_session_id();
                tracing::info!(session_id = %id, "No session id provided, generated a new one");
                id
            }
        };

        let context = self
            .sessions
            .append_and_get_context(&session_id, &request.message)
            .await;
        self.sessions
            .commit_user_turn(&session_id, request.user_id.as_deref(), &request.message)
            .await;

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let task = tokio::spawn(run_turn(
            self.sessions.clone(),
            Arc::clone(&self.upstream),
            self.filter,
            session_id.clone(),
            context,
            tx,
            cancel.clone(),
            transport,
        ));

        ChatTurn {
            session_id,
            events: TurnEvents {
                inner: ReceiverStream::new(rx),
                _cancel_on_drop: cancel.drop_guard(),
            },
            task,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_turn(
    sessions: SessionStore,
    upstream: Arc<dyn Upstream>,
    filter: TokenFilter,
    session_id: String,
    context: String,
    mut tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    transport: &'static str,
) -> StreamOutcome {
    let metrics = StreamMetrics::start(transport);
    let mut assembler = StreamAssembler::new(filter).with_format(upstream.format());

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        opened = upstream.stream(&context) => Some(opened),
    };

    let outcome = match opened {
        None => {
            tracing::info!(session_id = %session_id, "Chat stream cancelled before upstream responded");
            StreamOutcome::Cancelled
        }
        Some(Err(e)) => {
            tracing::error!(session_id = %session_id, "Failed to start upstream stream: {:#}", e);
            StreamOutcome::Errored(e)
        }
        Some(Ok(source)) => assembler.run(source, &mut tx, &cancel).await,
    };

    match &outcome {
        StreamOutcome::Completed(full_text) => {
            sessions.commit_bot_turn(&session_id, full_text).await;
            let _ = tx.send(StreamEvent::Completed(full_text.clone())).await;
            tracing::info!(session_id = %session_id, "Chat stream completed");
        }
        StreamOutcome::Errored(e) => {
            tracing::error!(session_id = %session_id, "Error during chat streaming: {:#}", e);
            let _ = tx.send(StreamEvent::Error(e.to_string())).await;
        }
        StreamOutcome::Cancelled => {
            tracing::info!(session_id = %session_id, "Chat stream cancelled");
        }
    }

    metrics.finish(outcome.label(), assembler.emitted());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, StreamforgeError};
    use crate::upstream::ChunkStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;

    #[derive(Debug)]
    struct Scripted(Vec<&'static str>);

    #[async_trait]
    impl Upstream for Scripted {
        async fn stream(&self, _prompt: &str) -> Result<ChunkStream> {
            let chunks: Vec<Result<Bytes>> = self
                .0
                .iter()
                .copied()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[derive(Debug)]
    struct Refusing;

    #[async_trait]
    impl Upstream for Refusing {
        async fn stream(&self, _prompt: &str) -> Result<ChunkStream> {
            Err(StreamforgeError::Upstream("Gemini API error 503".into()).into())
        }
    }

    fn service(upstream: Arc<dyn Upstream>) -> ChatService {
        ChatService::new(SessionStore::in_memory(), upstream, TokenFilter::Identity)
    }

    #[tokio::test]
    async fn test_turn_generates_session_id_when_blank() {
        let chat = service(Arc::new(Scripted(vec![])));
        let turn = chat
            .start_turn(
                ChatRequest {
                    session_id: Some("  ".into()),
                    message: "hi".into(),
                    ..ChatRequest::default()
                },
                "sse",
            )
            .await;
        assert!(Uuid::parse_str(&turn.session_id).is_ok());
    }

    #[tokio::test]
    async fn test_turn_trims_supplied_session_id() {
        let chat = service(Arc::new(Scripted(vec![])));
        let turn = chat
            .start_turn(
                ChatRequest {
                    session_id: Some(" s1 ".into()),
                    message: "hi".into(),
                    ..ChatRequest::default()
                },
                "sse",
            )
            .await;
        assert_eq!(turn.session_id, "s1");
    }

    #[tokio::test]
    async fn test_completed_turn_emits_tokens_then_completion() {
        let chat = service(Arc::new(Scripted(vec![
            r#"[{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#,
            r#",{"candidates":[{"content":{"parts":[{"text":"lo"}]}}]}]"#,
        ])));
        let turn = chat
            .start_turn(
                ChatRequest {
                    session_id: Some("s1".into()),
                    message: "greet me".into(),
                    ..ChatRequest::default()
                },
                "sse",
            )
            .await;

        let events: Vec<StreamEvent> = turn.events.collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Hello".into()),
                StreamEvent::Completed("Hello".into()),
            ]
        );

        let session = chat
            .sessions()
            .documents()
            .find_by_id("s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_upstream_failure_emits_error_and_keeps_user_turn() {
        let chat = service(Arc::new(Refusing));
        let turn = chat
            .start_turn(
                ChatRequest {
                    session_id: Some("s1".into()),
                    message: "hi".into(),
                    ..ChatRequest::default()
                },
                "ws",
            )
            .await;

        let events: Vec<StreamEvent> = turn.events.collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(msg) if msg.contains("503")));
        assert!(matches!(turn.task.await.unwrap(), StreamOutcome::Errored(_)));

        let session = chat
            .sessions()
            .documents()
            .find_by_id("s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.messages.len(), 1);
    }
}
