//! `sled`-backed cache log
//!
//! Each entry lives under `<id length> <session id> <sequence>`. The length
//! and the sequence are big-endian `u64`s, the sequence coming from
//! [`sled::Db::generate_id`]. The length prefix keeps one session's prefix
//! from matching another id that merely starts with the same bytes, so
//! prefix scans return exactly one session's entries in insertion order.

use crate::error::{Result, StreamforgeError};
use async_trait::async_trait;
use sled::Db;
use std::path::Path;

use super::CacheLog;

/// Cache log persisted in an embedded `sled` database
#[derive(Debug, Clone)]
pub struct SledCacheLog {
    db: Db,
}

impl SledCacheLog {
    /// Open or create a cache log at `path`
    ///
    /// # Errors
    ///
    /// Returns `StreamforgeError::Cache` if the database cannot be opened,
    /// for example because another process holds its lock.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| StreamforgeError::Cache(format!("Failed to open cache: {}", e)))?;
        Ok(Self { db })
    }

    /// Open a throwaway cache log that is removed when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StreamforgeError::Cache(format!("Failed to open cache: {}", e)))?;
        Ok(Self { db })
    }

    fn prefix(key: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(key.len() + 8);
        prefix.extend_from_slice(&(key.len() as u64).to_be_bytes());
        prefix.extend_from_slice(key.as_bytes());
        prefix
    }

    fn entry_key(&self, key: &str) -> Result<Vec<u8>> {
        let seq = self
            .db
            .generate_id()
            .map_err(|e| StreamforgeError::Cache(format!("Id generation failed: {}", e)))?;
        let mut entry = Self::prefix(key);
        entry.extend_from_slice(&seq.to_be_bytes());
        Ok(entry)
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| StreamforgeError::Cache(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl CacheLog for SledCacheLog {
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.db.scan_prefix(Self::prefix(key)).next() {
            Some(Err(e)) => Err(StreamforgeError::Cache(format!("Scan failed: {}", e)).into()),
            Some(Ok(_)) => Ok(true),
            None => Ok(false),
        }
    }

    async fn range_all(&self, key: &str) -> Result<Vec<String>> {
        let mut values = Vec::new();
        for item in self.db.scan_prefix(Self::prefix(key)) {
            let (_, value) =
                item.map_err(|e| StreamforgeError::Cache(format!("Scan failed: {}", e)))?;
            let text = String::from_utf8(value.to_vec())
                .map_err(|e| StreamforgeError::Cache(format!("Corrupt entry: {}", e)))?;
            values.push(text);
        }
        Ok(values)
    }

    async fn push_back(&self, key: &str, value: &str) -> Result<()> {
        let entry = self.entry_key(key)?;
        self.db
            .insert(entry, value.as_bytes())
            .map_err(|e| StreamforgeError::Cache(format!("Insert failed: {}", e)))?;
        self.flush().await
    }

    async fn push_all_back(&self, key: &str, values: &[String]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for value in values {
            batch.insert(self.entry_key(key)?, value.as_bytes());
        }
        self.db
            .apply_batch(batch)
            .map_err(|e| StreamforgeError::Cache(format!("Batch insert failed: {}", e)))?;
        self.flush().await
    }
}
