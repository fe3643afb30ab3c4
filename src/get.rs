//! Item retrieval by external id.
//!
//! Reads a stored item, or fetches it live from the source when it has not
//! been synced yet (or `--refresh` is given). Live fetches are persisted so
//! the next lookup is local.

use std::sync::Arc;

use anyhow::{bail, Result};

use hubsync_core::store::{ContentStore, StoredItem};

use crate::config::Config;
use crate::credentials::EnvCredentials;
use crate::ingest::store_item;
use crate::sqlite_store::SqliteStore;
use crate::traits::AdapterRegistry;

/// Stored item for `(source, external_id)`, fetching and storing it first
/// when needed. `None` when the source does not know the id either.
pub async fn get_item(
    config: &Config,
    source_id: &str,
    external_id: &str,
    refresh: bool,
) -> Result<Option<StoredItem>> {
    let source = config.source(source_id)?;
    let store = Arc::new(SqliteStore::open(config).await?);

    let stored = if refresh {
        None
    } else {
        store.get_item(&source.id, external_id).await?
    };
    if stored.is_some() {
        store.close().await;
        return Ok(stored);
    }

    let registry = AdapterRegistry::from_config(config, store.clone(), Arc::new(EnvCredentials))?;
    let adapter = registry.for_source(&source)?;
    let result = match adapter.fetch_item(&source, external_id).await? {
        Some(item) => {
            store_item(store.as_ref(), &source.id, &item).await?;
            store.get_item(&source.id, &item.external_id).await?
        }
        None => None,
    };

    store.close().await;
    Ok(result)
}

/// CLI entry point. Calls get_item and prints to stdout.
pub async fn run_get(
    config: &Config,
    source_id: &str,
    external_id: &str,
    refresh: bool,
) -> Result<()> {
    let Some(stored) = get_item(config, source_id, external_id, refresh).await? else {
        bail!("item not found: {} in source '{}'", external_id, source_id);
    };
    let item = &stored.item;

    println!("--- Item ---");
    println!("id:           {}", stored.id);
    println!("source:       {}", stored.source_id);
    println!("external_id:  {}", item.external_id);
    println!("type:         {}", item.content_type.as_str());
    println!("title:        {}", item.title);
    println!("author:       {} ({})", item.author_name, item.author_external);
    if let Some(url) = &item.url {
        println!("url:          {}", url);
    }
    println!("created_at:   {}", item.created_at_source.to_rfc3339());
    println!("updated_at:   {}", item.updated_at_source.to_rfc3339());
    println!("metadata:     {}", serde_json::to_string(&item.metadata)?);
    println!();

    println!("--- Participants ({}) ---", item.participants.len());
    for p in &item.participants {
        println!("  {:<12} {} ({})", p.role.as_str(), p.name, p.external_id);
    }
    println!();

    println!("--- Content ---");
    println!("{}", item.content);

    Ok(())
}
