//! Storage contracts for hubsync.
//!
//! Three narrow traits cover what the sync pipeline persists:
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`ContentStore`] | Canonical items and their participants |
//! | [`SyncStateStore`] | Per-repository incremental cursors |
//! | [`FileCacheStore`] | Read-through cache for repository file contents |
//!
//! [`Store`] bundles all three so callers can hold one `Arc<dyn Store>`.
//! Implementations must be `Send + Sync`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{CanonicalContentItem, Participant, RepoSyncState};

/// How long a cached file stays fresh.
pub fn file_cache_ttl() -> Duration {
    Duration::days(7)
}

/// Ref recorded in the file cache when the caller did not pin one.
pub const DEFAULT_REF: &str = "HEAD";

/// A canonical item as persisted, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredItem {
    /// UUID, stable across upserts of the same `(source_id, external_id)`.
    pub id: String,
    pub source_id: String,
    pub item: CanonicalContentItem,
}

/// Cache key for a repository file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileCacheKey {
    pub source_id: String,
    pub repo_full_name: String,
    pub path: String,
    pub git_ref: String,
}

impl FileCacheKey {
    pub fn new(source_id: &str, repo: &str, path: &str, git_ref: Option<&str>) -> Self {
        Self {
            source_id: source_id.to_string(),
            repo_full_name: repo.to_string(),
            path: path.to_string(),
            git_ref: git_ref.unwrap_or(DEFAULT_REF).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

impl CachedFile {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < file_cache_ttl()
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or update an item keyed by `(source_id, item.external_id)`.
    ///
    /// Returns the item id (existing or newly generated). Participants are
    /// written separately with [`create_participants_batch`](Self::create_participants_batch).
    async fn upsert_item(&self, source_id: &str, item: &CanonicalContentItem) -> Result<String>;

    /// Replace an item's participants with `participants`, in order. Repeated
    /// external ids keep their first entry. Returns how many participants
    /// were not recorded for the item before.
    async fn create_participants_batch(
        &self,
        item_id: &str,
        participants: &[Participant],
    ) -> Result<usize>;

    async fn get_item(&self, source_id: &str, external_id: &str) -> Result<Option<StoredItem>>;

    /// Number of stored items, optionally restricted to one source.
    async fn count_items(&self, source_id: Option<&str>) -> Result<i64>;
}

#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn get_sync_state(
        &self,
        source_id: &str,
        repo_full_name: &str,
    ) -> Result<Option<RepoSyncState>>;

    /// Create or advance a repository cursor.
    ///
    /// The stored `last_synced_at` becomes `max(stored, state.last_synced_at)`,
    /// so a late or replayed write never moves the cursor backwards. Returns
    /// the row as stored.
    async fn upsert_sync_state(&self, state: &RepoSyncState) -> Result<RepoSyncState>;

    async fn list_sync_states(&self, source_id: &str) -> Result<Vec<RepoSyncState>>;
}

#[async_trait]
pub trait FileCacheStore: Send + Sync {
    async fn get_cached_file(&self, key: &FileCacheKey) -> Result<Option<CachedFile>>;

    async fn put_cached_file(&self, key: &FileCacheKey, file: &CachedFile) -> Result<()>;
}

/// Everything the sync pipeline needs from a backend.
pub trait Store: ContentStore + SyncStateStore + FileCacheStore {}

impl<T: ContentStore + SyncStateStore + FileCacheStore> Store for T {}
