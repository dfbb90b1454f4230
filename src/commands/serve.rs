//! `streamforge serve`

use crate::chat::ChatService;
use crate::config::Config;
use crate::error::Result;
use crate::server::{self, AppState};
use crate::session::SessionStore;
use crate::upstream;

/// Build the service graph from `config` and serve until shutdown
pub async fn run_serve(config: Config) -> Result<()> {
    let sessions = SessionStore::from_config(&config.storage, true)?;
    let upstream = upstream::from_config(&config.upstream)?;
    tracing::info!(
        provider = %config.upstream.provider,
        model = %config.upstream.model,
        backend = %config.storage.backend,
        cache = %config.storage.cache_backend,
        "Starting streamforge server"
    );

    let chat = ChatService::new(sessions, upstream, super::token_filter(&config));
    let state = AppState::new(chat, &config.server);
    server::serve(state, &config.server.bind).await
}
