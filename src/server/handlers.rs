//! HTTP handlers under `/stream`

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;

use super::error::ApiError;
use super::AppState;
use crate::chat::{new_session_id, ChatRequest};
use crate::history::HistoryPage;
use crate::session::MessagesPage;
use crate::stream::StreamEvent;

/// Header carrying the chat session id, in both directions
pub const SESSION_ID_HEADER: &str = "session-id";
/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "userid";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /stream/session`: a fresh session id as plain text
pub async fn generate_session() -> String {
    new_session_id()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    session_id: String,
    page: Option<i64>,
}

/// `GET /stream/history/messages?sessionId=&page=`
pub async fn session_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesPage>, ApiError> {
    let page = query.page.unwrap_or(1);
    tracing::info!(session_id = %query.session_id, page, "Fetching session messages");
    let messages = state
        .chat
        .sessions()
        .get_session_messages_page(&query.session_id, page, state.session_message_page_size)
        .await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    page: Option<i64>,
}

/// `GET /stream/history?page=` with optional `Userid` header
pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let user_id = header_value(&headers, USER_ID_HEADER);
    let page = state
        .chat
        .sessions()
        .list_history(user_id.as_deref(), query.page.unwrap_or(1), state.history_page_size)
        .await?;
    Ok(Json(page))
}

/// Rewrite `\r\n` and bare `\r` line breaks to `\n`
///
/// SSE field values may not contain carriage returns; `\n` is sent as
/// consecutive `data:` lines, which clients join back with `\n`.
fn sse_field(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_string()
    }
}

/// `POST /stream/chat`: stream the reply to a plain-text message as SSE
///
/// Each token is one `data:` event. An upstream failure ends the stream
/// with an `error` event. The response echoes the (possibly generated)
/// `Session-Id`.
pub async fn stream_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = ChatRequest {
        session_id: header_value(&headers, SESSION_ID_HEADER),
        user_id: header_value(&headers, USER_ID_HEADER),
        message: body,
    };

    let turn = state.chat.start_turn(request, "sse").await;
    let session_id = turn.session_id.clone();

    let events = turn.events.filter_map(|event| match event {
        StreamEvent::Token(token) => {
            Some(Ok::<Event, Infallible>(Event::default().data(sse_field(&token))))
        }
        StreamEvent::Error(message) => {
            Some(Ok(Event::default().event("error").data(sse_field(&message))))
        }
        StreamEvent::Completed(_) => None,
    });

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response();

    match HeaderValue::from_str(&session_id) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(HeaderName::from_static(SESSION_ID_HEADER), value);
        }
        Err(e) => tracing::warn!(session_id = %session_id, "Session id is not a valid header value: {}", e),
    }
    response
}
