//! SQLite-backed [`Store`](hubsync_core::store::Store).
//!
//! Every write is a single `INSERT … ON CONFLICT DO UPDATE` statement, so
//! concurrent writers for the same key converge on one row. Timestamps are
//! stored as Unix seconds.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use hubsync_core::models::{
    CanonicalContentItem, ContentType, ItemMetadata, Participant, ParticipantRole, RepoSyncState,
};
use hubsync_core::store::{
    CachedFile, ContentStore, FileCacheKey, FileCacheStore, StoredItem, SyncStateStore,
};

use crate::config::Config;
use crate::{db, migrate};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).with_context(|| format!("invalid stored timestamp {}", secs))
}

fn dedup_hash(source_id: &str, item: &CanonicalContentItem) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(item.external_id.as_bytes());
    hasher.update(item.updated_at_source.timestamp().to_le_bytes());
    hasher.update(item.content.as_bytes());
    format!("{:x}", hasher.finalize())
}

type ItemRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    i64,
    i64,
    String,
);

#[async_trait]
impl ContentStore for SqliteStore {
    async fn upsert_item(&self, source_id: &str, item: &CanonicalContentItem) -> Result<String> {
        let metadata_json = serde_json::to_string(&item.metadata)?;
        let now = Utc::now().timestamp();

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO items (id, source_id, external_id, content_type, title, content, author_external, author_name, url, created_at, updated_at, metadata_json, dedup_hash, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, external_id) DO UPDATE SET
                content_type = excluded.content_type,
                title = excluded.title,
                content = excluded.content,
                author_external = excluded.author_external,
                author_name = excluded.author_name,
                url = excluded.url,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                metadata_json = excluded.metadata_json,
                dedup_hash = excluded.dedup_hash,
                synced_at = excluded.synced_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(source_id)
        .bind(&item.external_id)
        .bind(item.content_type.as_str())
        .bind(&item.title)
        .bind(&item.content)
        .bind(&item.author_external)
        .bind(&item.author_name)
        .bind(&item.url)
        .bind(item.created_at_source.timestamp())
        .bind(item.updated_at_source.timestamp())
        .bind(&metadata_json)
        .bind(dedup_hash(source_id, item))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn create_participants_batch(
        &self,
        item_id: &str,
        participants: &[Participant],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let previous: HashSet<String> =
            sqlx::query_scalar("SELECT external_id FROM participants WHERE item_id = ?")
                .bind(item_id)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();
        sqlx::query("DELETE FROM participants WHERE item_id = ?")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        let mut position = 0i64;
        let mut added = 0usize;
        for p in participants {
            let result = sqlx::query(
                r#"
                INSERT INTO participants (id, item_id, external_id, name, role, position)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(item_id, external_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(item_id)
            .bind(&p.external_id)
            .bind(&p.name)
            .bind(p.role.as_str())
            .bind(position)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                continue;
            }
            position += 1;
            if !previous.contains(&p.external_id) {
                added += 1;
            }
        }

        tx.commit().await?;
        Ok(added)
    }

    async fn get_item(&self, source_id: &str, external_id: &str) -> Result<Option<StoredItem>> {
        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, content_type, title, content, author_external, author_name, url, created_at, updated_at, metadata_json
            FROM items WHERE source_id = ? AND external_id = ?
            "#,
        )
        .bind(source_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, content_type, title, content, author_external, author_name, url, created, updated, metadata_json)) =
            row
        else {
            return Ok(None);
        };

        let content_type = ContentType::parse(&content_type)
            .with_context(|| format!("unknown content type '{}' for item {}", content_type, id))?;
        let metadata: ItemMetadata = serde_json::from_str(&metadata_json)
            .with_context(|| format!("corrupt metadata for item {}", id))?;

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT external_id, name, role FROM participants WHERE item_id = ? ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;
        let participants = rows
            .into_iter()
            .map(|(external_id, name, role)| {
                let role = ParticipantRole::parse(&role)
                    .with_context(|| format!("unknown participant role '{}'", role))?;
                Ok(Participant {
                    external_id,
                    name,
                    role,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(StoredItem {
            id,
            source_id: source_id.to_string(),
            item: CanonicalContentItem {
                external_id: external_id.to_string(),
                content_type,
                title,
                content,
                author_external,
                author_name,
                created_at_source: timestamp(created)?,
                updated_at_source: timestamp(updated)?,
                url,
                metadata,
                participants,
            },
        }))
    }

    async fn count_items(&self, source_id: Option<&str>) -> Result<i64> {
        let count: i64 = match source_id {
            Some(source_id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE source_id = ?")
                    .bind(source_id)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM items")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }
}

fn sync_state(row: (String, String, i64, i64)) -> Result<RepoSyncState> {
    let (source_id, repo_full_name, repo_id, last_synced_at) = row;
    Ok(RepoSyncState {
        source_id,
        repo_full_name,
        repo_id,
        last_synced_at: timestamp(last_synced_at)?,
    })
}

#[async_trait]
impl SyncStateStore for SqliteStore {
    async fn get_sync_state(
        &self,
        source_id: &str,
        repo_full_name: &str,
    ) -> Result<Option<RepoSyncState>> {
        let row: Option<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT source_id, repo_full_name, repo_id, last_synced_at
            FROM repo_sync_state WHERE source_id = ? AND repo_full_name = ?
            "#,
        )
        .bind(source_id)
        .bind(repo_full_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(sync_state).transpose()
    }

    async fn upsert_sync_state(&self, state: &RepoSyncState) -> Result<RepoSyncState> {
        let row: (String, String, i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO repo_sync_state (source_id, repo_full_name, repo_id, last_synced_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(source_id, repo_full_name) DO UPDATE SET
                repo_id = excluded.repo_id,
                last_synced_at = MAX(repo_sync_state.last_synced_at, excluded.last_synced_at)
            RETURNING source_id, repo_full_name, repo_id, last_synced_at
            "#,
        )
        .bind(&state.source_id)
        .bind(&state.repo_full_name)
        .bind(state.repo_id)
        .bind(state.last_synced_at.timestamp())
        .fetch_one(&self.pool)
        .await?;

        sync_state(row)
    }

    async fn list_sync_states(&self, source_id: &str) -> Result<Vec<RepoSyncState>> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT source_id, repo_full_name, repo_id, last_synced_at
            FROM repo_sync_state WHERE source_id = ? ORDER BY repo_full_name
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(sync_state).collect()
    }
}

#[async_trait]
impl FileCacheStore for SqliteStore {
    async fn get_cached_file(&self, key: &FileCacheKey) -> Result<Option<CachedFile>> {
        let row: Option<(String, i64)> = sqlx::query_as(
            r#"
            SELECT content, fetched_at FROM file_cache
            WHERE source_id = ? AND repo_full_name = ? AND path = ? AND git_ref = ?
            "#,
        )
        .bind(&key.source_id)
        .bind(&key.repo_full_name)
        .bind(&key.path)
        .bind(&key.git_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(content, fetched_at)| {
            Ok(CachedFile {
                content,
                fetched_at: timestamp(fetched_at)?,
            })
        })
        .transpose()
    }

    async fn put_cached_file(&self, key: &FileCacheKey, file: &CachedFile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_cache (source_id, repo_full_name, path, git_ref, content, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, repo_full_name, path, git_ref) DO UPDATE SET
                content = excluded.content,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&key.source_id)
        .bind(&key.repo_full_name)
        .bind(&key.path)
        .bind(&key.git_ref)
        .bind(&file.content)
        .bind(file.fetched_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
