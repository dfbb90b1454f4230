//! Cache-aside session store
//!
//! The [`SessionDocuments`] backend is the system of record. The
//! [`CacheLog`] holds each session's raw message strings in order and is
//! populated lazily from the durable document the first time a session is
//! touched. Writes go to both; the cache is never reconciled backward.

use serde::Serialize;
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::{Result, StreamforgeError};
use crate::history::{build_index, HistoryPage};
use crate::pagination::{total_pages, validate_page};
use crate::storage::{
    CacheLog, ChatSession, MemoryCacheLog, MemoryDocuments, Message, SessionDocuments,
    SledCacheLog, SqliteStorage,
};

/// One page of a session's messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesPage {
    /// Messages on this page, oldest first
    pub messages: Vec<Message>,
    /// The page that was requested
    pub current_page: usize,
    /// Number of pages in the session
    pub total_pages: usize,
    /// Number of messages in the session
    #[serde(rename = "totalMessagesInSession")]
    pub total_messages: usize,
}

/// Coordinator over the durable store and the cache log
#[derive(Debug, Clone)]
pub struct SessionStore {
    documents: Arc<dyn SessionDocuments>,
    cache: Arc<dyn CacheLog>,
}

impl SessionStore {
    /// Create a store over the given backends
    pub fn new(documents: Arc<dyn SessionDocuments>, cache: Arc<dyn CacheLog>) -> Self {
        Self { documents, cache }
    }

    /// Create a store with in-memory backends
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryDocuments::new()),
            Arc::new(MemoryCacheLog::new()),
        )
    }

    /// Open the backends named in the storage configuration
    ///
    /// `with_cache` is false for one-shot commands that only read durable
    /// state; they get an in-memory cache and leave the on-disk one alone.
    pub fn from_config(config: &StorageConfig, with_cache: bool) -> Result<Self> {
        let documents: Arc<dyn SessionDocuments> = match config.backend.as_str() {
            "memory" => Arc::new(MemoryDocuments::new()),
            "sqlite" => match &config.db_path {
                Some(path) => Arc::new(SqliteStorage::new_with_path(path)?),
                None => Arc::new(SqliteStorage::new()?),
            },
            other => {
                return Err(
                    StreamforgeError::Config(format!("Unknown storage backend: {}", other)).into(),
                )
            }
        };

        let cache: Arc<dyn CacheLog> = match config.cache_backend.as_str() {
            _ if !with_cache => Arc::new(MemoryCacheLog::new()),
            "memory" => Arc::new(MemoryCacheLog::new()),
            "sled" => {
                let path = match &config.cache_path {
                    Some(path) => path.clone(),
                    None => crate::storage::data_dir()?.join("cache"),
                };
                Arc::new(SledCacheLog::new(path)?)
            }
            other => {
                return Err(
                    StreamforgeError::Config(format!("Unknown cache backend: {}", other)).into(),
                )
            }
        };

        Ok(Self::new(documents, cache))
    }

    /// The durable backend
    pub fn documents(&self) -> &Arc<dyn SessionDocuments> {
        &self.documents
    }

    /// Populate the cache from the durable session if the cache has no entry
    ///
    /// Durable read failures leave the cache empty.
    pub async fn ensure_hydrated(&self, session_id: &str) -> Result<()> {
        if self.cache.exists(session_id).await? {
            return Ok(());
        }

        tracing::info!(session_id, "Session not cached, loading from durable store");
        match self.documents.find_by_id(session_id).await {
            Ok(Some(session)) => {
                let contents: Vec<String> =
                    session.messages.into_iter().map(|m| m.content).collect();
                tracing::debug!(session_id, count = contents.len(), "Hydrating cache");
                self.cache.push_all_back(session_id, &contents).await?;
            }
            Ok(None) => {
                tracing::debug!(session_id, "No durable session, cache stays empty");
            }
            Err(e) => {
                tracing::error!(session_id, "Failed to load session for hydration: {:#}", e);
            }
        }
        Ok(())
    }

    /// Build the upstream prompt for a new message and record it in the cache
    ///
    /// The context is every cached message joined with `\n`, followed by
    /// `new_message`. Cache failures are logged and degrade to an empty
    /// history.
    pub async fn append_and_get_context(&self, session_id: &str, new_message: &str) -> String {
        if let Err(e) = self.ensure_hydrated(session_id).await {
            tracing::error!(session_id, "Cache hydration failed: {:#}", e);
        }

        let history = self.cache.range_all(session_id).await.unwrap_or_else(|e| {
            tracing::error!(session_id, "Failed to read cached history: {:#}", e);
            Vec::new()
        });

        let context = if history.is_empty() {
            new_message.to_string()
        } else {
            format!("{}\n{}", history.join("\n"), new_message)
        };

        if let Err(e) = self.cache.push_back(session_id, new_message).await {
            tracing::error!(session_id, "Failed to cache user message: {:#}", e);
        }

        context
    }

    /// Upsert the durable session and append the user's message
    ///
    /// `user_id` is recorded only when the session is created. Failures are
    /// logged.
    pub async fn commit_user_turn(&self, session_id: &str, user_id: Option<&str>, new_message: &str) {
        if let Err(e) = self.try_commit_user_turn(session_id, user_id, new_message).await {
            tracing::error!(session_id, "Failed to save user message: {:#}", e);
        }
    }

    async fn try_commit_user_turn(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        new_message: &str,
    ) -> Result<()> {
        let mut session = match self.documents.find_by_id(session_id).await? {
            Some(session) => session,
            None => {
                tracing::info!(session_id, "Creating new chat session");
                let owner = user_id
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string);
                ChatSession::new(session_id, owner)
            }
        };
        session.push(Message::user(new_message));
        self.documents.save(&session).await?;
        tracing::debug!(session_id, "Saved user message");
        Ok(())
    }

    /// Record a completed reply in the cache and the durable session
    ///
    /// A missing durable session is logged and skipped. Failures are logged.
    pub async fn commit_bot_turn(&self, session_id: &str, full_text: &str) {
        if full_text.is_empty() {
            tracing::info!(session_id, "Stream completed with an empty response");
        }

        if let Err(e) = self.cache.push_back(session_id, full_text).await {
            tracing::error!(session_id, "Failed to cache bot response: {:#}", e);
        }

        match self.documents.find_by_id(session_id).await {
            Ok(Some(mut session)) => {
                session.push(Message::bot(full_text));
                match self.documents.save(&session).await {
                    Ok(()) => tracing::debug!(session_id, "Saved bot response"),
                    Err(e) => tracing::error!(session_id, "Failed to save bot response: {:#}", e),
                }
            }
            Ok(None) => {
                tracing::warn!(
                    session_id,
                    "Chat session not found when saving bot response; user turn may not have been saved"
                );
            }
            Err(e) => {
                tracing::error!(session_id, "Failed to load session for bot response: {:#}", e);
            }
        }
    }

    /// Page through a session's messages from the newest backward
    ///
    /// Page 1 holds the newest `page_size` messages; each page is returned
    /// oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound` when the session does not exist, `InvalidPage` when `page`
    /// falls outside `1..=max(1, total_pages)`, `Storage` when the durable
    /// read fails.
    pub async fn get_session_messages_page(
        &self,
        session_id: &str,
        page: i64,
        page_size: usize,
    ) -> Result<MessagesPage> {
        let session = self
            .documents
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| StreamforgeError::NotFound(format!("session {}", session_id)))?;

        let total = session.messages.len();
        let total_pages = total_pages(total, page_size);
        let current_page = validate_page(page, total_pages)?;

        let end = total.saturating_sub((current_page - 1) * page_size);
        let start = total.saturating_sub(current_page * page_size);
        let messages = session.messages[start..end].to_vec();

        tracing::debug!(
            session_id,
            page = current_page,
            total_pages,
            returned = messages.len(),
            "Fetched session messages"
        );

        Ok(MessagesPage {
            messages,
            current_page,
            total_pages,
            total_messages: total,
        })
    }

    /// Grouped history for one user, or for everyone when `user_id` is blank
    ///
    /// # Errors
    ///
    /// `InvalidPage` for an out-of-range page, `Storage` when the durable
    /// read fails.
    pub async fn list_history(
        &self,
        user_id: Option<&str>,
        page: i64,
        page_size: usize,
    ) -> Result<HistoryPage> {
        let sessions = match user_id.map(str::trim).filter(|u| !u.is_empty()) {
            Some(user_id) => {
                tracing::info!(user_id, page, "Fetching chat history for user");
                self.documents.find_by_user_id(user_id).await?
            }
            None => {
                tracing::info!(page, "Fetching all chat history");
                self.documents.find_all().await?
            }
        };
        build_index(&sessions, page, page_size)
    }
}
