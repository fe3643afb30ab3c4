//! In-memory [`Store`](super::Store) implementation for tests and embedding.
//!
//! Plain `HashMap`s behind `std::sync::RwLock`. A poisoned lock surfaces as
//! an error instead of a panic.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{CanonicalContentItem, Participant, RepoSyncState};

use super::{
    CachedFile, ContentStore, FileCacheKey, FileCacheStore, StoredItem, SyncStateStore,
};

type ItemKey = (String, String);

struct ItemRow {
    id: String,
    item: CanonicalContentItem,
}

#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<ItemKey, ItemRow>>,
    participants: RwLock<HashMap<String, Vec<Participant>>>,
    sync_states: RwLock<HashMap<ItemKey, RepoSyncState>>,
    files: RwLock<HashMap<FileCacheKey, CachedFile>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn upsert_item(&self, source_id: &str, item: &CanonicalContentItem) -> Result<String> {
        let mut items = self.items.write().map_err(poisoned)?;
        let key = (source_id.to_string(), item.external_id.clone());
        let mut stored = item.clone();
        stored.participants.clear();

        let id = match items.get_mut(&key) {
            Some(row) => {
                row.item = stored;
                row.id.clone()
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                items.insert(
                    key,
                    ItemRow {
                        id: id.clone(),
                        item: stored,
                    },
                );
                id
            }
        };
        Ok(id)
    }

    async fn create_participants_batch(
        &self,
        item_id: &str,
        participants: &[Participant],
    ) -> Result<usize> {
        let mut all = self.participants.write().map_err(poisoned)?;
        let previous = all.remove(item_id).unwrap_or_default();
        let mut next: Vec<Participant> = Vec::with_capacity(participants.len());
        for p in participants {
            if !next.iter().any(|e| e.external_id == p.external_id) {
                next.push(p.clone());
            }
        }
        let added = next
            .iter()
            .filter(|p| !previous.iter().any(|e| e.external_id == p.external_id))
            .count();
        all.insert(item_id.to_string(), next);
        Ok(added)
    }

    async fn get_item(&self, source_id: &str, external_id: &str) -> Result<Option<StoredItem>> {
        let items = self.items.read().map_err(poisoned)?;
        let key = (source_id.to_string(), external_id.to_string());
        let Some(row) = items.get(&key) else {
            return Ok(None);
        };
        let participants = self.participants.read().map_err(poisoned)?;
        let mut item = row.item.clone();
        item.participants = participants.get(&row.id).cloned().unwrap_or_default();
        Ok(Some(StoredItem {
            id: row.id.clone(),
            source_id: source_id.to_string(),
            item,
        }))
    }

    async fn count_items(&self, source_id: Option<&str>) -> Result<i64> {
        let items = self.items.read().map_err(poisoned)?;
        let n = items
            .keys()
            .filter(|(s, _)| source_id.map_or(true, |want| s == want))
            .count();
        Ok(n as i64)
    }
}

#[async_trait]
impl SyncStateStore for InMemoryStore {
    async fn get_sync_state(
        &self,
        source_id: &str,
        repo_full_name: &str,
    ) -> Result<Option<RepoSyncState>> {
        let states = self.sync_states.read().map_err(poisoned)?;
        Ok(states
            .get(&(source_id.to_string(), repo_full_name.to_string()))
            .cloned())
    }

    async fn upsert_sync_state(&self, state: &RepoSyncState) -> Result<RepoSyncState> {
        let mut states = self.sync_states.write().map_err(poisoned)?;
        let key = (state.source_id.clone(), state.repo_full_name.clone());
        let row = states
            .entry(key)
            .and_modify(|old| {
                old.repo_id = state.repo_id;
                old.last_synced_at = old.last_synced_at.max(state.last_synced_at);
            })
            .or_insert_with(|| state.clone());
        Ok(row.clone())
    }

    async fn list_sync_states(&self, source_id: &str) -> Result<Vec<RepoSyncState>> {
        let states = self.sync_states.read().map_err(poisoned)?;
        let mut out: Vec<RepoSyncState> = states
            .values()
            .filter(|s| s.source_id == source_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.repo_full_name.cmp(&b.repo_full_name));
        Ok(out)
    }
}

#[async_trait]
impl FileCacheStore for InMemoryStore {
    async fn get_cached_file(&self, key: &FileCacheKey) -> Result<Option<CachedFile>> {
        let files = self.files.read().map_err(poisoned)?;
        Ok(files.get(key).cloned())
    }

    async fn put_cached_file(&self, key: &FileCacheKey, file: &CachedFile) -> Result<()> {
        let mut files = self.files.write().map_err(poisoned)?;
        files.insert(key.clone(), file.clone());
        Ok(())
    }
}
