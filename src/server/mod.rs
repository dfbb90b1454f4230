//! HTTP surface
//!
//! | Route                        | Handler                          |
//! |------------------------------|----------------------------------|
//! | `GET /health`                | [`handlers::health`]             |
//! | `GET /stream/session`        | [`handlers::generate_session`]   |
//! | `POST /stream/chat`          | [`handlers::stream_chat`] (SSE)  |
//! | `GET /stream/history/messages` | [`handlers::session_messages`] |
//! | `GET /stream/history`        | [`handlers::history`]            |
//! | `GET /ws`                    | [`ws::ws_handler`]               |

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::chat::ChatService;
use crate::config::ServerConfig;
use crate::error::{Result, StreamforgeError};

pub mod error;
pub mod handlers;
pub mod ws;

pub use error::ApiError;

/// Shared state of every handler
#[derive(Debug, Clone)]
pub struct AppState {
    /// Chat turn coordinator (also owns the session store)
    pub chat: ChatService,
    /// Date groups per history page
    pub history_page_size: usize,
    /// Messages per session page
    pub session_message_page_size: usize,
}

impl AppState {
    /// State for `chat` with page sizes from the server configuration
    pub fn new(chat: ChatService, config: &ServerConfig) -> Self {
        Self {
            chat,
            history_page_size: config.history_page_size,
            session_message_page_size: config.session_message_page_size,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/stream/session", get(handlers::generate_session))
        .route("/stream/chat", post(handlers::stream_chat))
        .route("/stream/history/messages", get(handlers::session_messages))
        .route("/stream/history", get(handlers::history))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Listen on `bind` and serve until Ctrl-C
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| StreamforgeError::Config(format!("Failed to bind {}: {}", bind, e)))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
