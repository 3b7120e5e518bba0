//! In-memory feed cache with a refresh window and durable flushing.
//!
//! The map and its change counters share one lock. The lock is never held across an
//! upstream fetch, so a slow page only delays requests for its own key.
//! Concurrent requests for the same stale key may each fetch; the last one to
//! finish wins.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::database::FeedStore;
use crate::error::{FetchError, PersistenceError};
use crate::feed::{FeedKey, FeedSnapshot};
use crate::hsb::{build_snapshot, PageFetcher, DEFAULT_USER_AGENT};

pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub refresh_window: Duration,
    pub flush_interval: Duration,
    pub cache_dir: PathBuf,
    pub user_agent: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_window: DEFAULT_REFRESH_WINDOW,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            cache_dir: std::env::temp_dir(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: FeedKey,
    pub snapshot: Arc<FeedSnapshot>,
    pub refreshed_at: DateTime<Utc>,
}

/// `changes` counts modifications of the map; `saved` is the count that was
/// last written to disk. The cache is dirty while they differ.
#[derive(Default)]
struct CacheState {
    entries: HashMap<FeedKey, CacheEntry>,
    changes: u64,
    saved: u64,
}

impl CacheState {
    fn is_dirty(&self) -> bool {
        self.changes != self.saved
    }
}

pub struct FeedCache {
    state: Mutex<CacheState>,
    fetcher: Arc<dyn PageFetcher>,
    store: FeedStore,
    refresh_window: TimeDelta,
    user_agent: String,
}

impl FeedCache {
    /// Creates an empty cache. Call [`FeedCache::restore`] to pick up the
    /// entries of a previous run.
    pub fn new(config: &CacheConfig, fetcher: Arc<dyn PageFetcher>) -> Self {
        let refresh_window =
            TimeDelta::from_std(config.refresh_window).unwrap_or(TimeDelta::MAX);

        Self {
            state: Mutex::new(CacheState::default()),
            fetcher,
            store: FeedStore::new(&config.cache_dir),
            refresh_window,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Loads persisted entries. Unreadable state is discarded, never fatal.
    pub async fn restore(&self) {
        info!(path = %self.store.path().display(), "Loading cached feeds...");

        let entries = match self.store.load().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "Failed to load cached feeds, starting empty");
                self.store.discard().await;
                HashMap::new()
            }
        };

        let mut state = self.state.lock().await;
        state.entries = entries;
        state.saved = state.changes;
    }

    pub async fn get(&self, key: &FeedKey) -> Option<CacheEntry> {
        self.state.lock().await.entries.get(key).cloned()
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.is_dirty()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match entry.refreshed_at.checked_add_signed(self.refresh_window) {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    /// Returns the cached entry for `key` if it is inside the refresh window,
    /// otherwise fetches the page again and replaces the entry.
    ///
    /// A failed fetch leaves any existing entry as it was.
    pub async fn refresh_if_stale(
        &self,
        key: &FeedKey,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry, FetchError> {
        let previous = self.get(key).await;

        if let Some(entry) = &previous {
            if self.is_fresh(entry, now) {
                debug!(%key, refreshed_at = %entry.refreshed_at, "Using cached feed");
                return Ok(entry.clone());
            }
        }

        let previous_snapshot = previous.as_ref().map(|entry| entry.snapshot.as_ref());
        let snapshot = build_snapshot(
            self.fetcher.as_ref(),
            key,
            &self.user_agent,
            previous_snapshot,
            now,
        )
        .await?;

        let entry = CacheEntry {
            key: key.clone(),
            snapshot: Arc::new(snapshot),
            refreshed_at: now,
        };

        let mut state = self.state.lock().await;
        let replaced = state.entries.insert(key.clone(), entry.clone());
        let changed = replaced.map_or(true, |old| old.snapshot != entry.snapshot);
        if changed {
            state.changes += 1;
        }
        debug!(%key, changed, "Caching feed");

        Ok(entry)
    }

    /// Writes the whole map to disk if anything changed since the last flush.
    ///
    /// Returns whether a write happened. The cache only becomes clean once the
    /// write has succeeded, so a failed or cancelled flush is retried later.
    pub async fn flush(&self) -> Result<bool, PersistenceError> {
        let (entries, changes) = {
            let state = self.state.lock().await;
            if !state.is_dirty() {
                return Ok(false);
            }
            let entries: Vec<CacheEntry> = state.entries.values().cloned().collect();
            (entries, state.changes)
        };

        info!(count = entries.len(), "Saving cached feeds...");
        self.store.save(&entries).await?;

        let mut state = self.state.lock().await;
        state.saved = state.saved.max(changes);
        Ok(true)
    }

    /// Spawns the periodic flush task. Intervals below [`MIN_FLUSH_INTERVAL`]
    /// are raised to it.
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let interval = interval.max(MIN_FLUSH_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(err) = cache.flush().await {
                    error!(error = %err, "Failed to save cached feeds, retrying next interval");
                }
            }
        })
    }
}
