use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            graphql_url: default_graphql_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_graphql_url() -> String {
    "https://api.github.com/graphql".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

/// Pagination ceilings and concurrency limits for a sync pass.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_page_size")]
    pub discussion_page_size: u32,
    #[serde(default = "default_max_discussion_pages")]
    pub max_discussion_pages: u32,
    #[serde(default = "default_repo_page_size")]
    pub repo_page_size: u32,
    #[serde(default = "default_max_repo_pages")]
    pub max_repo_pages: u32,
    #[serde(default = "default_wiki_max_dirs")]
    pub wiki_max_dirs: usize,
    #[serde(default = "default_wiki_max_pages_per_dir")]
    pub wiki_max_pages_per_dir: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_concurrency")]
    pub repo_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            discussion_page_size: default_page_size(),
            max_discussion_pages: default_max_discussion_pages(),
            repo_page_size: default_repo_page_size(),
            max_repo_pages: default_max_repo_pages(),
            wiki_max_dirs: default_wiki_max_dirs(),
            wiki_max_pages_per_dir: default_wiki_max_pages_per_dir(),
            concurrency: default_concurrency(),
            repo_concurrency: default_concurrency(),
        }
    }
}

fn default_page_size() -> u32 {
    50
}
fn default_max_pages() -> u32 {
    20
}
fn default_max_discussion_pages() -> u32 {
    10
}
fn default_repo_page_size() -> u32 {
    100
}
fn default_max_repo_pages() -> u32 {
    10
}
fn default_wiki_max_dirs() -> usize {
    10
}
fn default_wiki_max_pages_per_dir() -> usize {
    50
}
fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Github,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Github => "github",
        }
    }
}

/// Content kinds a source can sync.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    PullRequests,
    Issues,
    Discussions,
    Wiki,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::PullRequests,
        ContentKind::Issues,
        ContentKind::Discussions,
        ContentKind::Wiki,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::PullRequests => "pull_requests",
            ContentKind::Issues => "issues",
            ContentKind::Discussions => "discussions",
            ContentKind::Wiki => "wiki",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub webhook_secret_env: Option<String>,
    /// `owner/name` entries. Empty means every repository the token can see.
    #[serde(default)]
    pub repos: Vec<String>,
    #[serde(default)]
    pub include_labels: Vec<String>,
    #[serde(default)]
    pub exclude_labels: Vec<String>,
    #[serde(default = "default_content")]
    pub content: Vec<ContentKind>,
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_content() -> Vec<ContentKind> {
    ContentKind::ALL.to_vec()
}

impl SourceConfig {
    pub fn syncs(&self, kind: ContentKind) -> bool {
        self.content.contains(&kind)
    }
}

/// A configured source with its id attached.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub config: SourceConfig,
}

impl Config {
    pub fn source(&self, id: &str) -> Result<Source> {
        let config = self.sources.get(id).cloned().with_context(|| {
            format!(
                "Unknown source '{}'. Configured: {}",
                id,
                self.source_ids().join(", ")
            )
        })?;
        Ok(Source {
            id: id.to_string(),
            config,
        })
    }

    pub fn all_sources(&self) -> Vec<Source> {
        self.sources
            .iter()
            .map(|(id, config)| Source {
                id: id.clone(),
                config: config.clone(),
            })
            .collect()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    let sync = &config.sync;
    if sync.page_size == 0 || sync.page_size > 100 {
        anyhow::bail!("sync.page_size must be in 1..=100");
    }
    if sync.discussion_page_size == 0 || sync.discussion_page_size > 100 {
        anyhow::bail!("sync.discussion_page_size must be in 1..=100");
    }
    if sync.repo_page_size == 0 || sync.repo_page_size > 100 {
        anyhow::bail!("sync.repo_page_size must be in 1..=100");
    }
    if sync.max_pages == 0 || sync.max_discussion_pages == 0 || sync.max_repo_pages == 0 {
        anyhow::bail!("sync page ceilings must be > 0");
    }
    if sync.wiki_max_dirs == 0 || sync.wiki_max_pages_per_dir == 0 {
        anyhow::bail!("sync wiki limits must be > 0");
    }
    if sync.concurrency == 0 || sync.repo_concurrency == 0 {
        anyhow::bail!("sync.concurrency and sync.repo_concurrency must be >= 1");
    }
    if config.github.timeout_secs == 0 {
        anyhow::bail!("github.timeout_secs must be > 0");
    }

    for (id, source) in &config.sources {
        if source.token_env.trim().is_empty() {
            anyhow::bail!("sources.{}.token_env must not be empty", id);
        }
        for repo in &source.repos {
            if !is_repo_name(repo) {
                anyhow::bail!(
                    "sources.{}.repos: '{}' is not an owner/name repository",
                    id,
                    repo
                );
            }
        }
        if source.content.is_empty() {
            anyhow::bail!("sources.{}.content must name at least one content kind", id);
        }
    }

    Ok(config)
}

fn is_repo_name(value: &str) -> bool {
    match value.split_once('/') {
        Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/hubsync.sqlite"
"#;

    #[test]
    fn defaults_apply() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.sync.page_size, 50);
        assert_eq!(config.sync.max_pages, 20);
        assert_eq!(config.sync.max_discussion_pages, 10);
        assert_eq!(config.sync.repo_page_size, 100);
        assert_eq!(config.server.bind, "127.0.0.1:7340");
        assert!(config.sources.is_empty());
    }

    #[test]
    fn parses_sources() {
        let toml = r#"
[db]
path = "x.sqlite"

[sources.acme]
type = "github"
token_env = "ACME_TOKEN"
webhook_secret_env = "ACME_HOOK"
repos = ["acme/api"]
exclude_labels = ["wontfix"]
content = ["pull_requests", "wiki"]
"#;
        let config = parse_config(toml).unwrap();
        let source = config.source("acme").unwrap();
        assert_eq!(source.config.source_type, SourceType::Github);
        assert!(source.config.syncs(ContentKind::Wiki));
        assert!(!source.config.syncs(ContentKind::Issues));
        assert_eq!(source.config.webhook_secret_env.as_deref(), Some("ACME_HOOK"));
        assert!(config.source("other").is_err());
    }

    #[test]
    fn content_defaults_to_everything() {
        let toml = r#"
[db]
path = "x.sqlite"

[sources.gh]
type = "github"
"#;
        let config = parse_config(toml).unwrap();
        let source = config.source("gh").unwrap();
        assert_eq!(source.config.content.len(), 4);
        assert_eq!(source.config.token_env, "GITHUB_TOKEN");
    }

    #[test]
    fn rejects_bad_repo_names() {
        let toml = r#"
[db]
path = "x.sqlite"

[sources.gh]
type = "github"
repos = ["justaname"]
"#;
        let err = parse_config(toml).unwrap_err();
        assert!(err.to_string().contains("owner/name"));
    }

    #[test]
    fn rejects_unknown_source_type() {
        let toml = r#"
[db]
path = "x.sqlite"

[sources.chat]
type = "slack"
"#;
        assert!(parse_config(toml).is_err());
    }

    #[test]
    fn rejects_oversized_pages() {
        let toml = r#"
[db]
path = "x.sqlite"

[sync]
page_size = 500
"#;
        assert!(parse_config(toml).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hubsync.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.db.path, PathBuf::from("./data/hubsync.sqlite"));
    }
}
