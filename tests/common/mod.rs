use async_trait::async_trait;
use bytes::Bytes;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use streamforge::error::{Result, StreamforgeError};
use streamforge::storage::{MemoryCacheLog, SqliteStorage};
use streamforge::upstream::{ChunkStream, Upstream};
use streamforge::SessionStore;

/// One streamed Gemini response object carrying `text`
#[allow(dead_code)]
pub fn gemini_chunk(text: &str) -> String {
    serde_json::json!({
        "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }]
    })
    .to_string()
}

/// Upstream that replays fixed chunks and records every prompt it receives
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct ScriptedUpstream {
    chunks: Vec<String>,
    prompts: std::sync::Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedUpstream {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn stream(&self, prompt: &str) -> Result<ChunkStream> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());
        let chunks: Vec<Result<Bytes>> = self
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.clone())))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Upstream that sends one chunk and then never finishes
#[allow(dead_code)]
#[derive(Debug)]
pub struct StallingUpstream {
    pub first: String,
}

#[async_trait]
impl Upstream for StallingUpstream {
    async fn stream(&self, _prompt: &str) -> Result<ChunkStream> {
        let first = futures::stream::iter(vec![Ok(Bytes::from(self.first.clone()))]);
        let never = futures::stream::pending::<Result<Bytes>>();
        Ok(Box::pin(futures::StreamExt::chain(first, never)))
    }
}

/// Upstream whose request is always rejected
#[allow(dead_code)]
#[derive(Debug)]
pub struct FailingUpstream;

#[async_trait]
impl Upstream for FailingUpstream {
    async fn stream(&self, _prompt: &str) -> Result<ChunkStream> {
        Err(StreamforgeError::Upstream(
            "Gemini API error 503 Service Unavailable: overloaded".into(),
        )
        .into())
    }
}

#[allow(dead_code)]
pub fn create_temp_storage() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("sessions.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (storage, tmp)
}

/// Session store over a temporary SQLite file and an in-memory cache
#[allow(dead_code)]
pub fn sqlite_session_store() -> (SessionStore, TempDir) {
    let (storage, tmp) = create_temp_storage();
    let store = SessionStore::new(Arc::new(storage), Arc::new(MemoryCacheLog::new()));
    (store, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
