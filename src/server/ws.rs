//! WebSocket chat endpoint
//!
//! The server greets each connection with a `status` frame. Every text frame
//! `{"prompt": "...", "sessionId"?: "...", "userId"?: "..."}` starts a chat
//! turn whose reply arrives as `token` frames followed by `end` or `error`.
//! Closing the socket cancels every turn still streaming on it.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::chat::{ChatRequest, ChatService};
use crate::stream::StreamEvent;

const OUTBOUND_BUFFER: usize = 64;
const PROMPT_HINT: &str = r#"Send prompt as JSON: {"prompt": "Your question..."}"#;

/// Frame sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Connection-level notice
    Status(String),
    /// Session the following tokens belong to
    Session(String),
    /// One streamed token
    Token(String),
    /// The reply finished
    End(String),
    /// The prompt could not be processed
    Error(String),
}

/// Frame received from the client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    /// The user's message
    #[serde(default)]
    pub prompt: Option<String>,
    /// Session to continue
    #[serde(default)]
    pub session_id: Option<String>,
    /// Owner for a new session
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.chat))
}

async fn handle_socket(socket: WebSocket, chat: ChatService) {
    tracing::info!("WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode WebSocket frame: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                tracing::debug!("WebSocket send failed, closing writer: {}", e);
                break;
            }
        }
    });

    let connection = CancellationToken::new();
    let _ = tx
        .send(ServerFrame::Status(format!("Connection established. {}", PROMPT_HINT)))
        .await;

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame(&chat, &text, &tx, &connection).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("WebSocket transport error: {}", e);
                break;
            }
        }
    }

    tracing::info!("WebSocket connection closed");
    connection.cancel();
    drop(tx);
    let _ = writer.await;
}

async fn handle_frame(
    chat: &ChatService,
    text: &str,
    tx: &mpsc::Sender<ServerFrame>,
    connection: &CancellationToken,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Invalid WebSocket frame: {}", e);
            let _ = tx
                .send(ServerFrame::Error(format!(
                    "Invalid message format. {}. Details: {}",
                    PROMPT_HINT, e
                )))
                .await;
            return;
        }
    };

    let prompt = match frame.prompt.filter(|p| !p.trim().is_empty()) {
        Some(prompt) => prompt,
        None => {
            let _ = tx
                .send(ServerFrame::Error(format!("Prompt cannot be empty. {}", PROMPT_HINT)))
                .await;
            return;
        }
    };

    let request = ChatRequest {
        session_id: frame.session_id,
        user_id: frame.user_id,
        message: prompt,
    };
    tokio::spawn(relay_turn(
        chat.clone(),
        request,
        tx.clone(),
        connection.clone(),
    ));
}

async fn relay_turn(
    chat: ChatService,
    request: ChatRequest,
    tx: mpsc::Sender<ServerFrame>,
    connection: CancellationToken,
) {
    let turn = chat.start_turn(request, "ws").await;
    if tx.send(ServerFrame::Session(turn.session_id.clone())).await.is_err() {
        return;
    }

    // Dropping `events` on any exit path cancels the turn.
    let mut events = turn.events;
    loop {
        let event = tokio::select! {
            biased;
            _ = connection.cancelled() => break,
            event = events.next() => event,
        };
        let frame = match event {
            Some(StreamEvent::Token(token)) => ServerFrame::Token(token),
            Some(StreamEvent::Completed(_)) => ServerFrame::End("Stream finished.".to_string()),
            Some(StreamEvent::Error(message)) => {
                ServerFrame::Error(format!("Error processing prompt: {}", message))
            }
            None => break,
        };
        if tx.send(frame).await.is_err() {
            break;
        }
    }
}
