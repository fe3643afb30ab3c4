//! GitHub-specific CLI commands: `repos`, `file`, `users`, `validate`.

use std::sync::Arc;

use anyhow::{bail, Result};

use hubsync_core::store::{SyncStateStore, DEFAULT_REF};

use crate::client::GitHubClient;
use crate::config::{Config, Source};
use crate::connector_github::GitHubAdapter;
use crate::credentials::EnvCredentials;
use crate::sqlite_store::SqliteStore;

async fn adapter(config: &Config) -> Result<(GitHubAdapter, Arc<SqliteStore>)> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let adapter = GitHubAdapter::new(
        GitHubClient::new(&config.github)?,
        config.sync.clone(),
        store.clone(),
        Arc::new(EnvCredentials),
    );
    Ok((adapter, store))
}

pub async fn run_repos(config: &Config, source_id: &str) -> Result<()> {
    let source = config.source(source_id)?;
    let (adapter, store) = adapter(config).await?;
    let repos = adapter.list_repositories(&source).await?;
    let states = store.list_sync_states(&source.id).await?;

    println!(
        "{:<40} {:<8} {:<6} {:<12} LAST SYNCED",
        "REPOSITORY", "PRIVATE", "WIKI", "DISCUSSIONS"
    );
    for repo in &repos {
        let cursor = states
            .iter()
            .find(|s| s.repo_full_name == repo.full_name)
            .map(|s| s.last_synced_at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<40} {:<8} {:<6} {:<12} {}",
            repo.full_name, repo.private, repo.has_wiki, repo.has_discussions, cursor
        );
    }
    println!("{} repositories", repos.len());

    store.close().await;
    Ok(())
}

pub async fn run_file(
    config: &Config,
    source_id: &str,
    repo: &str,
    path: &str,
    git_ref: Option<&str>,
) -> Result<()> {
    let source = config.source(source_id)?;
    let (adapter, store) = adapter(config).await?;
    let content = adapter.get_file_content(&source, repo, path, git_ref).await?;
    store.close().await;

    match content {
        Some(content) => {
            print!("{}", content);
            Ok(())
        }
        None => bail!(
            "file not found: {}:{} at {}",
            repo,
            path,
            git_ref.unwrap_or(DEFAULT_REF)
        ),
    }
}

pub async fn run_users(config: &Config, source_id: &str, repo: &str) -> Result<()> {
    let source = config.source(source_id)?;
    let (adapter, store) = adapter(config).await?;
    let users = adapter.sync_users(&source, repo).await?;
    store.close().await;

    println!("{:<32} {:<12} CONTRIBUTIONS", "LOGIN", "ID");
    for user in &users {
        println!("{:<32} {:<12} {}", user.login, user.external_id, user.contributions);
    }
    Ok(())
}

pub async fn run_validate(config: &Config, source_id: &str) -> Result<()> {
    let source: Source = config.source(source_id)?;
    let (adapter, store) = adapter(config).await?;
    let valid = adapter.validate_credentials(&source).await?;
    store.close().await;

    if valid {
        println!("{}: credentials ok", source.id);
        Ok(())
    } else {
        bail!(
            "{}: no valid token (checked ${})",
            source.id,
            source.config.token_env
        )
    }
}
