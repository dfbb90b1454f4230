//! Streamforge - streaming chat relay library
//!
//! Streamforge forwards chat prompts to a Gemini-style streaming endpoint and
//! relays the reply to clients token by token over Server-Sent Events or
//! WebSocket, while keeping per-session conversation history.
//!
//! # Architecture
//!
//! - `stream`: incremental JSON extraction from raw upstream bytes, text
//!   projection, and the cancellable token assembler
//! - `upstream`: the streaming model endpoint abstraction, the Gemini client
//!   and an OpenAI-compatible chat-completions client
//! - `storage`: durable session documents (SQLite, memory) and the cache log
//!   (sled, memory)
//! - `session`: cache-aside session store, context building, message paging
//! - `history`: date-grouped, paginated history index
//! - `chat`: one chat turn from prompt to persisted reply
//! - `server`: axum routes for SSE, WebSocket, history and health
//! - `config`, `cli`, `commands`, `error`, `metrics`, `pagination`: the rest
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamforge::{ChatService, Config, GeminiUpstream, SessionStore, TokenFilter};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let sessions = SessionStore::in_memory();
//! let upstream = GeminiUpstream::new(&config.upstream)?;
//! let chat = ChatService::new(sessions, Arc::new(upstream), TokenFilter::Identity);
//! let state = streamforge::server::AppState::new(chat, &config.server);
//! streamforge::server::serve(state, &config.server.bind).await?;
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod metrics;
pub mod pagination;
pub mod server;
pub mod session;
pub mod storage;
pub mod stream;
pub mod upstream;

// Re-export commonly used types
pub use chat::{ChatRequest, ChatService, ChatTurn};
pub use config::Config;
pub use error::{Result, StreamforgeError};
pub use session::SessionStore;
pub use stream::{StreamEvent, StreamOutcome, TokenFilter};
pub use upstream::{GeminiUpstream, OpenAiUpstream, Upstream};
