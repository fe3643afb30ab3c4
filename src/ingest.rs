//! Ingestion pipeline orchestration.
//!
//! Coordinates the sync flow: adapter → canonical items → store. Items and
//! their participants are written first; a repository's cursor is committed
//! only when the pass succeeded for that repository and every one of its
//! items was stored, so a failed write is retried on the next pass.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hubsync_core::models::{CanonicalContentItem, ItemMetadata, RepoSyncState};
use hubsync_core::store::{ContentStore, Store, SyncStateStore};

use crate::config::{Config, Source};
use crate::credentials::EnvCredentials;
use crate::error::{error_chain, SyncError};
use crate::sqlite_store::SqliteStore;
use crate::traits::{AdapterRegistry, FetchOptions, SourceAdapter};

/// What one source's pass did.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub source_id: String,
    pub items_fetched: usize,
    pub items_stored: usize,
    pub participants_added: usize,
    pub committed: Vec<RepoSyncState>,
    pub errors: Vec<SyncError>,
}

/// Repository an item belongs to.
pub fn item_repo(item: &CanonicalContentItem) -> &str {
    match &item.metadata {
        ItemMetadata::PullRequest(m) => &m.repo,
        ItemMetadata::Issue(m) => &m.repo,
        ItemMetadata::Discussion(m) => &m.repo,
        ItemMetadata::Wiki(m) => &m.repo,
    }
}

/// Parse a `--since` date (`YYYY-MM-DD`) as midnight UTC.
pub fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid --since date '{}', expected YYYY-MM-DD", value))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("invalid --since date")?;
    Ok(midnight.and_utc())
}

/// Persist one item and its participants, returning how many participants
/// were new.
pub async fn store_item(
    store: &dyn Store,
    source_id: &str,
    item: &CanonicalContentItem,
) -> Result<usize> {
    let item_id = store.upsert_item(source_id, item).await?;
    store
        .create_participants_batch(&item_id, &item.participants)
        .await
}

/// Fetch, persist and commit cursors for a single source.
///
/// Authentication failures are returned as `Err`. Everything else ends up in
/// [`SyncReport::errors`].
pub async fn sync_source(
    adapter: &dyn SourceAdapter,
    store: &dyn Store,
    source: &Source,
    options: &FetchOptions,
) -> Result<SyncReport> {
    let outcome = adapter.fetch_content(source, options).await?;
    let mut report = SyncReport {
        source_id: source.id.clone(),
        items_fetched: outcome.items.len(),
        errors: outcome.errors,
        ..SyncReport::default()
    };

    let mut failed_repos: BTreeSet<String> = BTreeSet::new();
    for item in &outcome.items {
        match store_item(store, &source.id, item).await {
            Ok(added) => {
                report.items_stored += 1;
                report.participants_added += added;
            }
            Err(e) => {
                warn!(
                    source = %source.id,
                    external_id = %item.external_id,
                    error = %format!("{:#}", e),
                    "failed to store item"
                );
                failed_repos.insert(item_repo(item).to_string());
                report
                    .errors
                    .push(SyncError::Store(e.context(format!("storing {}", item.external_id))));
            }
        }
    }

    for state in &outcome.repo_states {
        if failed_repos.contains(&state.repo_full_name) {
            continue;
        }
        match store.upsert_sync_state(state).await {
            Ok(stored) => report.committed.push(stored),
            Err(e) => report.errors.push(SyncError::Store(
                e.context(format!("committing cursor for {}", state.repo_full_name)),
            )),
        }
    }

    info!(
        source = %source.id,
        fetched = report.items_fetched,
        stored = report.items_stored,
        committed = report.committed.len(),
        errors = report.errors.len(),
        "source synced"
    );
    Ok(report)
}

pub async fn run_sync(
    config: &Config,
    target: &str,
    since: Option<String>,
    full: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let sources = if target == "all" {
        config.all_sources()
    } else {
        vec![config.source(target)?]
    };
    if sources.is_empty() {
        anyhow::bail!("No sources configured. Add a [sources.<id>] table to the config.");
    }

    let options = FetchOptions {
        since: since.as_deref().map(parse_since).transpose()?,
        full,
        cancel,
    };

    let store = Arc::new(SqliteStore::open(config).await?);
    let registry = AdapterRegistry::from_config(config, store.clone(), Arc::new(EnvCredentials))?;

    for source in &sources {
        let adapter = registry.for_source(source)?;
        let report = sync_source(adapter.as_ref(), store.as_ref(), source, &options).await?;

        println!("sync {}", report.source_id);
        println!("  fetched: {} items", report.items_fetched);
        println!("  upserted items: {}", report.items_stored);
        println!("  participants added: {}", report.participants_added);
        println!("  repositories committed: {}", report.committed.len());
        for state in &report.committed {
            println!(
                "    {}  cursor {}",
                state.repo_full_name,
                state.last_synced_at.to_rfc3339()
            );
        }
        if report.errors.is_empty() {
            println!("ok");
        } else {
            println!("  errors: {}", report.errors.len());
            for e in &report.errors {
                println!("    {}", error_chain(e));
            }
        }
    }

    store.close().await;
    Ok(())
}
