//! In-process storage backends
//!
//! Used by tests and by the `memory` storage backends. Nothing survives a
//! restart.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CacheLog, ChatSession, SessionDocuments};

/// Session documents kept in a map
#[derive(Debug, Default)]
pub struct MemoryDocuments {
    sessions: RwLock<HashMap<String, ChatSession>>,
}

impl MemoryDocuments {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut sessions: Vec<ChatSession>) -> Vec<ChatSession> {
    sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
    sessions
}

#[async_trait]
impl SessionDocuments for MemoryDocuments {
    async fn find_by_id(&self, id: &str) -> Result<Option<ChatSession>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, session: &ChatSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            // Ownership and creation time are fixed by the first save
            Some(existing) => {
                existing.messages = session.messages.clone();
                existing.last_updated = session.last_updated;
            }
            None => {
                sessions.insert(session.id.clone(), session.clone());
            }
        }
        Ok(())
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        let sessions = self.sessions.read().await;
        Ok(newest_first(
            sessions
                .values()
                .filter(|s| s.user_id.as_deref() == Some(user_id))
                .cloned()
                .collect(),
        ))
    }

    async fn find_all(&self) -> Result<Vec<ChatSession>> {
        let sessions = self.sessions.read().await;
        Ok(newest_first(sessions.values().cloned().collect()))
    }
}

/// Cache log kept in a map of vectors
#[derive(Debug, Default)]
pub struct MemoryCacheLog {
    entries: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryCacheLog {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheLog for MemoryCacheLog {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn range_all(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_back(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn push_all_back(&self, key: &str, values: &[String]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.entries
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Message;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_documents_save_is_upsert() {
        let docs = MemoryDocuments::new();
        let mut session = ChatSession::new("s1", Some("u1".to_string()));
        docs.save(&session).await.unwrap();

        session.user_id = Some("u2".to_string());
        session.push(Message::user("hello"));
        docs.save(&session).await.unwrap();

        let loaded = docs.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(loaded.user_id.as_deref(), Some("u1"));
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_documents_sorted_newest_first() {
        let docs = MemoryDocuments::new();
        let now = Utc::now();
        for (id, age) in [("a", 3), ("b", 1), ("c", 2)] {
            let mut session = ChatSession::new(id, Some("u".to_string()));
            session.last_updated = now - Duration::hours(age);
            docs.save(&session).await.unwrap();
        }

        let ids: Vec<String> = docs
            .find_by_user_id("u")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(docs.find_by_user_id("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_log_appends_in_order() {
        let cache = MemoryCacheLog::new();
        assert!(!cache.exists("s1").await.unwrap());
        cache
            .push_all_back("s1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        cache.push_back("s1", "c").await.unwrap();
        assert!(cache.exists("s1").await.unwrap());
        assert_eq!(cache.range_all("s1").await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_cache_log_empty_batch_creates_nothing() {
        let cache = MemoryCacheLog::new();
        cache.push_all_back("s1", &[]).await.unwrap();
        assert!(!cache.exists("s1").await.unwrap());
    }
}
