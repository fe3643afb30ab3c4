//! Source adapter trait and registry.
//!
//! Every source type plugs into the sync pipeline through [`SourceAdapter`].
//! The [`AdapterRegistry`] maps a configured [`SourceType`] to its adapter so
//! the CLI and webhook server dispatch without knowing the concrete type.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             AdapterRegistry              │
//! │  ┌────────────────┐                      │
//! │  │ github         │ → GitHubAdapter      │
//! │  └────────────────┘                      │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     run_sync() → ingest pipeline → Store
//!     POST /webhooks/{source} → handle_webhook() → Store
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use hubsync_core::models::{CanonicalContentItem, RepoSyncState};
use hubsync_core::store::Store;

use crate::client::GitHubClient;
use crate::config::{Config, Source, SourceType};
use crate::connector_github::GitHubAdapter;
use crate::credentials::{Credentials, CredentialsProvider};
use crate::error::SyncError;

/// Options for one sync pass.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Lower bound on `updated_at`. Overrides stored cursors.
    pub since: Option<DateTime<Utc>>,
    /// Ignore stored cursors and backfill up to the page ceilings.
    pub full: bool,
    pub cancel: CancellationToken,
}

/// Result of a sync pass.
///
/// `items` keep source order per repository and content type. `repo_states`
/// holds the cursors to commit once the items are persisted; a repository
/// listed in `errors` never has one.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub items: Vec<CanonicalContentItem>,
    pub repo_states: Vec<RepoSyncState>,
    pub errors: Vec<SyncError>,
}

impl SyncOutcome {
    pub fn absorb(&mut self, other: SyncOutcome) {
        self.items.extend(other.items);
        self.repo_states.extend(other.repo_states);
        self.errors.extend(other.errors);
    }
}

/// A provider that produces canonical items.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// One-line description used in `hubsync sources`.
    fn description(&self) -> &str;

    /// Run a sync pass. `Err` only for failures that stop the whole pass
    /// (authentication); everything else is reported in the outcome.
    async fn fetch_content(
        &self,
        source: &Source,
        options: &FetchOptions,
    ) -> Result<SyncOutcome, SyncError>;

    async fn fetch_item(
        &self,
        source: &Source,
        external_id: &str,
    ) -> Result<Option<CanonicalContentItem>>;

    async fn handle_webhook(
        &self,
        source: &Source,
        event: &str,
        payload: &Value,
    ) -> Result<Option<CanonicalContentItem>>;

    async fn validate_credentials(&self, source: &Source) -> Result<bool>;

    async fn refresh_auth(&self, source: &Source) -> Result<Credentials>;
}

#[async_trait]
impl SourceAdapter for GitHubAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Github
    }

    fn description(&self) -> &str {
        "GitHub pull requests, issues, discussions and wiki pages"
    }

    async fn fetch_content(
        &self,
        source: &Source,
        options: &FetchOptions,
    ) -> Result<SyncOutcome, SyncError> {
        GitHubAdapter::fetch_content(self, source, options).await
    }

    async fn fetch_item(
        &self,
        source: &Source,
        external_id: &str,
    ) -> Result<Option<CanonicalContentItem>> {
        GitHubAdapter::fetch_item(self, source, external_id).await
    }

    async fn handle_webhook(
        &self,
        source: &Source,
        event: &str,
        payload: &Value,
    ) -> Result<Option<CanonicalContentItem>> {
        GitHubAdapter::handle_webhook(self, source, event, payload).await
    }

    async fn validate_credentials(&self, source: &Source) -> Result<bool> {
        GitHubAdapter::validate_credentials(self, source).await
    }

    async fn refresh_auth(&self, source: &Source) -> Result<Credentials> {
        GitHubAdapter::refresh_auth(self, source).await
    }
}

/// Adapters keyed by the source type they serve.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceType, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in adapter, sharing one store and
    /// credentials provider.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn Store>,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Result<Self> {
        let client = GitHubClient::new(&config.github)?;
        let mut registry = Self::new();
        registry.register(Arc::new(GitHubAdapter::new(
            client,
            config.sync.clone(),
            store,
            credentials,
        )));
        Ok(registry)
    }

    /// Register an adapter, replacing any previous one for its type.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source_type(), adapter);
    }

    pub fn get(&self, source_type: SourceType) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source_type).cloned()
    }

    /// The adapter serving `source`, or an error naming the missing type.
    pub fn for_source(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>> {
        self.get(source.config.source_type).ok_or_else(|| {
            anyhow::anyhow!(
                "no adapter registered for source type '{}' (source '{}')",
                source.config.source_type.as_str(),
                source.id
            )
        })
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::credentials::StaticCredentials;
    use hubsync_core::store::memory::InMemoryStore;

    fn config() -> Config {
        parse_config(
            r#"
[db]
path = "./data/hubsync.sqlite"

[sources.work]
type = "github"
repos = ["acme/api"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn empty_registry_names_missing_type() {
        let config = config();
        let source = config.source("work").unwrap();
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());

        let err = registry.for_source(&source).err().unwrap();
        assert!(err.to_string().contains("'github'"));
        assert!(err.to_string().contains("'work'"));
    }

    #[test]
    fn from_config_registers_github() {
        let config = config();
        let source = config.source("work").unwrap();
        let registry = AdapterRegistry::from_config(
            &config,
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticCredentials::new()),
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        let adapter = registry.for_source(&source).unwrap();
        assert_eq!(adapter.source_type(), SourceType::Github);
    }
}
