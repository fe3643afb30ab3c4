use std::sync::Arc;

use anyhow::Result;

use hubsync_core::store::{ContentStore, SyncStateStore};

use crate::config::Config;
use crate::credentials::{CredentialsProvider, EnvCredentials};
use crate::sqlite_store::SqliteStore;
use crate::traits::AdapterRegistry;

/// Status line for one configured source.
#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub id: String,
    pub source_type: &'static str,
    pub description: String,
    pub repos: String,
    pub token: bool,
    pub webhook_secret: bool,
    pub items: i64,
    pub repos_synced: usize,
}

pub async fn get_sources(config: &Config) -> Result<Vec<SourceStatus>> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let credentials = EnvCredentials;
    let registry = AdapterRegistry::from_config(config, store.clone(), Arc::new(EnvCredentials))?;

    let mut statuses = Vec::new();
    for source in config.all_sources() {
        let repos = if source.config.repos.is_empty() {
            "all visible".to_string()
        } else {
            source.config.repos.len().to_string()
        };
        let description = registry
            .get(source.config.source_type)
            .map(|adapter| adapter.description().to_string())
            .unwrap_or_else(|| "-".to_string());
        statuses.push(SourceStatus {
            id: source.id.clone(),
            source_type: source.config.source_type.as_str(),
            description,
            repos,
            token: credentials.credentials(&source).await?.is_some(),
            webhook_secret: credentials.webhook_secret(&source).await?.is_some(),
            items: store.count_items(Some(&source.id)).await?,
            repos_synced: store.list_sync_states(&source.id).await?.len(),
        });
    }

    store.close().await;
    Ok(statuses)
}

pub async fn list_sources(config: &Config) -> Result<()> {
    let statuses = get_sources(config).await?;
    if statuses.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<8} {:<12} {:<6} {:<8} {:<8} {:<8} DESCRIPTION",
        "SOURCE", "TYPE", "REPOS", "TOKEN", "WEBHOOK", "ITEMS", "SYNCED"
    );
    for s in &statuses {
        println!(
            "{:<16} {:<8} {:<12} {:<6} {:<8} {:<8} {:<8} {}",
            s.id,
            s.source_type,
            s.repos,
            s.token,
            s.webhook_secret,
            s.items,
            s.repos_synced,
            s.description
        );
    }

    Ok(())
}
