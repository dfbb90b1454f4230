use crate::error::{Result, StreamforgeError};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

pub mod memory;
pub mod sled_cache;
pub mod types;

pub use memory::{MemoryCacheLog, MemoryDocuments};
pub use sled_cache::SledCacheLog;
pub use types::{ChatSession, Message, Role};

/// Durable session document store (system of record)
#[async_trait]
pub trait SessionDocuments: Send + Sync + Debug {
    /// Load one session
    async fn find_by_id(&self, id: &str) -> Result<Option<ChatSession>>;

    /// Insert or replace a session
    async fn save(&self, session: &ChatSession) -> Result<()>;

    /// Sessions owned by `user_id`, most recently updated first
    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<ChatSession>>;

    /// All sessions, most recently updated first
    async fn find_all(&self) -> Result<Vec<ChatSession>>;
}

/// Fast per-session ordered message log
#[async_trait]
pub trait CacheLog: Send + Sync + Debug {
    /// Whether a log exists for `key`
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Every entry in insertion order; empty when the key is absent
    async fn range_all(&self, key: &str) -> Result<Vec<String>>;

    /// Append one entry, creating the log if needed
    async fn push_back(&self, key: &str, value: &str) -> Result<()>;

    /// Append entries in order, creating the log if needed
    async fn push_all_back(&self, key: &str, values: &[String]) -> Result<()>;
}

/// Default platform data directory for Streamforge files
pub fn data_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "streamforge", "streamforge")
        .ok_or_else(|| StreamforgeError::Storage("Could not determine data directory".into()))?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

/// SQLite-backed session document store
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a storage instance in the user's data directory
    ///
    /// `STREAMFORGE_HISTORY_DB` overrides the location.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("STREAMFORGE_HISTORY_DB") {
            return Self::new_with_path(override_path);
        }

        Self::new_with_path(data_dir()?.join("sessions.db"))
    }

    /// Create a storage instance that uses the specified database path
    ///
    /// # Examples
    ///
    /// ```
    /// use streamforge::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("sessions.db")).unwrap();
    /// assert!(storage.db_path().ends_with("sessions.db"));
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| StreamforgeError::Storage(e.to_string()))?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    /// Path of the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init(&self) -> Result<()> {
        let conn = open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                messages JSON NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| StreamforgeError::Storage(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chat_sessions_user
                ON chat_sessions (user_id, last_updated)",
            [],
        )
        .context("Failed to create index")
        .map_err(|e| StreamforgeError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Run a blocking database operation off the async runtime
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || op(&db_path))
            .await
            .map_err(|e| StreamforgeError::Storage(format!("Database task failed: {}", e)))?
    }
}

fn open(db_path: &Path) -> Result<Connection> {
    Connection::open(db_path)
        .context("Failed to open database")
        .map_err(|e| StreamforgeError::Storage(e.to_string()).into())
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into()))
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSession> {
    let id: String = row.get(0)?;
    let user_id: Option<String> = row.get(1)?;
    let created_at: String = row.get(2)?;
    let last_updated: String = row.get(3)?;
    let messages_json: String = row.get(4)?;

    let messages: Vec<Message> = serde_json::from_str(&messages_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(ChatSession {
        id,
        user_id,
        messages,
        created_at: parse_timestamp(&created_at)?,
        last_updated: parse_timestamp(&last_updated)?,
    })
}

fn query_sessions(db_path: &Path, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<ChatSession>> {
    let conn = open(db_path)?;
    let mut stmt = conn
        .prepare(sql)
        .context("Failed to prepare statement")
        .map_err(|e| StreamforgeError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(args, session_from_row)
        .context("Failed to query sessions")
        .map_err(|e| StreamforgeError::Storage(e.to_string()))?;

    let mut sessions = Vec::new();
    for row in rows {
        match row {
            Ok(session) => sessions.push(session),
            Err(e) => tracing::warn!("Skipping unreadable session row: {}", e),
        }
    }
    Ok(sessions)
}

#[async_trait]
impl SessionDocuments for SqliteStorage {
    async fn find_by_id(&self, id: &str) -> Result<Option<ChatSession>> {
        let id = id.to_string();
        self.blocking(move |db_path| {
            let conn = open(db_path)?;
            let session = conn
                .query_row(
                    "SELECT id, user_id, created_at, last_updated, messages
                    FROM chat_sessions WHERE id = ?",
                    params![id],
                    session_from_row,
                )
                .optional()
                .context("Failed to query session")
                .map_err(|e| StreamforgeError::Storage(e.to_string()))?;
            Ok(session)
        })
        .await
    }

    async fn save(&self, session: &ChatSession) -> Result<()> {
        let messages_json = serde_json::to_string(&session.messages)
            .context("Failed to serialize messages")
            .map_err(|e| StreamforgeError::Storage(e.to_string()))?;
        let id = session.id.clone();
        let user_id = session.user_id.clone();
        let created_at = timestamp(&session.created_at);
        let last_updated = timestamp(&session.last_updated);

        self.blocking(move |db_path| {
            let conn = open(db_path)?;
            conn.execute(
                "INSERT INTO chat_sessions (id, user_id, created_at, last_updated, messages)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    last_updated = excluded.last_updated,
                    messages = excluded.messages",
                params![id, user_id, created_at, last_updated, messages_json],
            )
            .context("Failed to save session")
            .map_err(|e| StreamforgeError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        let user_id = user_id.to_string();
        self.blocking(move |db_path| {
            query_sessions(
                db_path,
                "SELECT id, user_id, created_at, last_updated, messages
                FROM chat_sessions
                WHERE user_id = ?
                ORDER BY last_updated DESC",
                &[&user_id as &dyn rusqlite::ToSql],
            )
        })
        .await
    }

    async fn find_all(&self) -> Result<Vec<ChatSession>> {
        self.blocking(|db_path| {
            query_sessions(
                db_path,
                "SELECT id, user_id, created_at, last_updated, messages
                FROM chat_sessions
                ORDER BY last_updated DESC",
                &[],
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serial_test::serial;
    use tempfile::tempdir;

    fn create_test_storage() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let storage = SqliteStorage::new_with_path(dir.path().join("sessions.db"))
            .expect("failed to create storage");
        (storage, dir)
    }

    fn session_at(id: &str, user: Option<&str>, day: u32) -> ChatSession {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        ChatSession {
            id: id.to_string(),
            user_id: user.map(str::to_string),
            messages: vec![Message::user(format!("hi from {}", id))],
            created_at: at,
            last_updated: at,
        }
    }

    #[test]
    fn test_sqlite_storage_init_creates_table() {
        let (storage, _dir) = create_test_storage();
        let conn = Connection::open(storage.db_path()).expect("open connection");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='chat_sessions'",
                [],
                |r| r.get(0),
            )
            .expect("query row");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_save_then_find_by_id() {
        let (storage, _dir) = create_test_storage();
        let mut session = ChatSession::new("s1", Some("u1".to_string()));
        session.push(Message::user("hello"));
        session.push(Message::bot("hi there"));

        storage.save(&session).await.expect("save failed");
        let loaded = storage
            .find_by_id("s1")
            .await
            .expect("load failed")
            .expect("session present");

        assert_eq!(loaded.user_id.as_deref(), Some("u1"));
        assert_eq!(loaded.messages, session.messages);
        assert_eq!(
            loaded.last_updated.timestamp_micros(),
            session.last_updated.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_find_by_id_returns_none_for_missing_id() {
        let (storage, _dir) = create_test_storage();
        assert!(storage.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_preserves_user_and_created_at_on_update() {
        let (storage, _dir) = create_test_storage();
        let original = session_at("s1", Some("owner"), 1);
        storage.save(&original).await.unwrap();

        let mut updated = original.clone();
        updated.user_id = Some("someone-else".to_string());
        updated.created_at = Utc::now();
        updated.push(Message::bot("reply"));
        storage.save(&updated).await.unwrap();

        let loaded = storage.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(loaded.user_id.as_deref(), Some("owner"));
        assert_eq!(loaded.created_at, original.created_at);
        assert_eq!(loaded.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_find_all_orders_by_last_updated_desc() {
        let (storage, _dir) = create_test_storage();
        storage.save(&session_at("old", None, 1)).await.unwrap();
        storage.save(&session_at("new", None, 20)).await.unwrap();
        storage.save(&session_at("mid", None, 10)).await.unwrap();

        let ids: Vec<String> = storage
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_find_by_user_id_filters_and_orders() {
        let (storage, _dir) = create_test_storage();
        storage.save(&session_at("a", Some("u1"), 1)).await.unwrap();
        storage.save(&session_at("b", Some("u2"), 5)).await.unwrap();
        storage.save(&session_at("c", Some("u1"), 9)).await.unwrap();

        let ids: Vec<String> = storage
            .find_by_user_id("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_find_all_returns_empty_for_new_db() {
        let (storage, _dir) = create_test_storage();
        assert!(storage.find_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_timestamp_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(timestamp(&a).len(), timestamp(&b).len());
        assert!(timestamp(&a) < timestamp(&b));
    }

    #[test]
    #[serial]
    fn test_new_honors_env_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("override.db");
        std::env::set_var("STREAMFORGE_HISTORY_DB", &path);
        let storage = SqliteStorage::new().expect("storage from env");
        std::env::remove_var("STREAMFORGE_HISTORY_DB");
        assert_eq!(storage.db_path(), path.as_path());
        assert!(path.exists());
    }
}
