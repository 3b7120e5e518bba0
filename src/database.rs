//! Durable storage of the feed cache in a single SQLite file.
//!
//! The schema version lives in `PRAGMA user_version`; a file with any other
//! version is rejected as a whole. Snapshots are stored as JSON.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::cache::CacheEntry;
use crate::error::PersistenceError;
use crate::feed::{FeedKey, FeedSnapshot};

pub const SCHEMA_VERSION: i64 = 1;
pub const CACHE_FILE_NAME: &str = "hsb-rss-proxy.feeds.sqlite";

pub struct FeedStore {
    path: PathBuf,
}

impl FeedStore {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(CACHE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every stored entry. A missing file is an empty cache.
    pub async fn load(&self) -> Result<HashMap<FeedKey, CacheEntry>, PersistenceError> {
        if !self.path.is_file() {
            info!(path = %self.path.display(), "No cached feeds found");
            return Ok(HashMap::new());
        }

        let conn = Connection::open(&self.path).await?;
        let rows = conn
            .call(|conn| {
                let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
                if version != SCHEMA_VERSION {
                    return Ok(Err(version));
                }

                let mut stmt = conn.prepare("SELECT key, refreshed_at, snapshot FROM feeds")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Ok(rows))
            })
            .await;
        let _ = conn.close().await;

        let rows = rows?.map_err(|found| PersistenceError::SchemaVersion {
            found,
            expected: SCHEMA_VERSION,
        })?;

        let mut entries = HashMap::with_capacity(rows.len());
        for (raw_key, refreshed_at, json) in rows {
            let key = FeedKey::from_path(&raw_key)
                .ok_or_else(|| PersistenceError::InvalidKey(raw_key.clone()))?;
            let refreshed_at = DateTime::<Utc>::from_timestamp_millis(refreshed_at)
                .ok_or(PersistenceError::InvalidTimestamp(refreshed_at))?;
            let snapshot: FeedSnapshot = serde_json::from_str(&json)?;

            entries.insert(
                key.clone(),
                CacheEntry {
                    key,
                    snapshot: Arc::new(snapshot),
                    refreshed_at,
                },
            );
        }

        info!(count = entries.len(), "Successfully loaded cached feeds");
        Ok(entries)
    }

    /// Replaces the stored entries with `entries` in one transaction.
    pub async fn save(&self, entries: &[CacheEntry]) -> Result<(), PersistenceError> {
        let rows = entries
            .iter()
            .map(|entry| {
                Ok((
                    entry.key.to_string(),
                    entry.refreshed_at.timestamp_millis(),
                    serde_json::to_string(entry.snapshot.as_ref())?,
                ))
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        let count = rows.len();

        let conn = Connection::open(&self.path).await?;
        let result = conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "CREATE TABLE IF NOT EXISTS feeds (
                        key TEXT PRIMARY KEY,
                        refreshed_at INTEGER NOT NULL,
                        snapshot TEXT NOT NULL
                        )",
                    [],
                )?;
                tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
                tx.execute("DELETE FROM feeds", [])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO feeds (key, refreshed_at, snapshot) VALUES (?, ?, ?)",
                    )?;
                    for (key, refreshed_at, snapshot) in &rows {
                        stmt.execute(params![key, refreshed_at, snapshot])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await;
        let _ = conn.close().await;
        result?;

        info!(count, path = %self.path.display(), "Successfully saved cached feeds");
        Ok(())
    }

    /// Deletes the cache file, logging rather than failing.
    pub async fn discard(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => info!(path = %self.path.display(), "Discarded unreadable cache file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to discard cache file")
            }
        }
    }
}
