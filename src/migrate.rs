use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create items table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            external_id TEXT NOT NULL,
            content_type TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            author_external TEXT NOT NULL,
            author_name TEXT NOT NULL,
            url TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            dedup_hash TEXT NOT NULL,
            synced_at INTEGER NOT NULL,
            UNIQUE(source_id, external_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create participants table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS participants (
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            position INTEGER NOT NULL,
            UNIQUE(item_id, external_id),
            FOREIGN KEY (item_id) REFERENCES items(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create repo_sync_state table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repo_sync_state (
            source_id TEXT NOT NULL,
            repo_full_name TEXT NOT NULL,
            repo_id INTEGER NOT NULL,
            last_synced_at INTEGER NOT NULL,
            PRIMARY KEY (source_id, repo_full_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create file_cache table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_cache (
            source_id TEXT NOT NULL,
            repo_full_name TEXT NOT NULL,
            path TEXT NOT NULL,
            git_ref TEXT NOT NULL,
            content TEXT NOT NULL,
            fetched_at INTEGER NOT NULL,
            PRIMARY KEY (source_id, repo_full_name, path, git_ref)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_participants_item_id ON participants(item_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_source ON items(source_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_updated_at ON items(updated_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
