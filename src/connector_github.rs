//! GitHub source adapter.
//!
//! Discovers repositories, paginates pull requests, issues, discussions and
//! wiki pages, enriches each item with its side data and converts it through
//! [`hubsync_core::convert`]. Items are returned, not stored: persistence is
//! the ingest pipeline's job.
//!
//! # Pagination
//!
//! | Content | Endpoint | Order | Stop when |
//! |---------|----------|-------|-----------|
//! | Pull requests | `GET /repos/{r}/pulls` | `updated` desc | short page, `since` reached, `sync.max_pages` |
//! | Issues | `GET /repos/{r}/issues` | `updated` desc | same; PR entries skipped |
//! | Discussions | GraphQL `discussions` | `UPDATED_AT` desc | no next page, `since` reached, `sync.max_discussion_pages` |
//! | Wiki | `GET /repos/{r}.wiki/contents` | n/a | root plus one directory level |
//!
//! The `since` boundary is applied after a whole page is known: older items
//! are dropped and the remaining pages skipped.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hubsync_core::convert;
use hubsync_core::github::{
    ContentEntry, Contributor, Discussion, Issue, IssueComment, PageInfo, PullRequest,
    PullRequestFile, Repository, Review, ReviewComment, User,
};
use hubsync_core::models::{CanonicalContentItem, RepoSyncState, SourceUser};
use hubsync_core::store::{CachedFile, FileCacheKey, FileCacheStore, Store, SyncStateStore};

use crate::client::{GitHubClient, RequestOptions};
use crate::config::{ContentKind, Source, SyncConfig};
use crate::credentials::{Credentials, CredentialsProvider};
use crate::error::{error_chain, ApiError, SyncError, SyncTarget};
use crate::traits::{FetchOptions, SyncOutcome};

/// Side-data and contributor listings read a single page of this size.
const SIDE_DATA_PAGE_SIZE: u32 = 100;

const DISCUSSION_FRAGMENT: &str = r#"
fragment DiscussionFields on Discussion {
  id number title body url createdAt updatedAt upvoteCount answerChosenAt
  author { login ... on User { databaseId } ... on Bot { databaseId } }
  category { name }
  answer { id body createdAt author { login ... on User { databaseId } ... on Bot { databaseId } } }
  comments(first: 20) {
    totalCount
    nodes { id body createdAt author { login ... on User { databaseId } ... on Bot { databaseId } } }
  }
  labels(first: 20) { nodes { name } }
}
"#;

const DISCUSSIONS_QUERY: &str = r#"
query($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    discussions(first: $first, after: $after, orderBy: {field: UPDATED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes { ...DiscussionFields }
    }
  }
}
"#;

const NODE_QUERY: &str = r#"
query($id: ID!) {
  node(id: $id) {
    __typename
    ... on Discussion { ...DiscussionFields repository { nameWithOwner } }
    ... on Issue { number repository { nameWithOwner } }
    ... on PullRequest { number repository { nameWithOwner } }
  }
}
"#;

#[derive(Deserialize)]
struct DiscussionsData {
    repository: Option<DiscussionsRepository>,
}

#[derive(Deserialize)]
struct DiscussionsRepository {
    discussions: DiscussionPage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscussionPage {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Discussion>,
}

#[derive(Deserialize)]
struct NodeData {
    node: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRepository {
    name_with_owner: String,
}

#[derive(Deserialize)]
struct NodeHeader {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    repository: Option<NodeRepository>,
}

/// What a GraphQL node id points at.
enum ResolvedNode {
    Discussion { repo: String, discussion: Discussion },
    Issue { repo: String, number: u64 },
    PullRequest { repo: String, number: u64 },
}

/// The three external id shapes this adapter produces.
#[derive(Debug, PartialEq, Eq)]
enum ExternalId {
    /// `owner/repo#123`
    Numbered { repo: String, number: u64 },
    /// `owner/repo/wiki/Page.md`
    Wiki { repo: String, path: String },
    /// GraphQL node id.
    Node(String),
}

fn is_repo_name(value: &str) -> bool {
    matches!(value.split_once('/'), Some((o, n)) if !o.is_empty() && !n.is_empty() && !n.contains('/'))
}

fn parse_external_id(id: &str) -> ExternalId {
    if let Some((repo, path)) = id.split_once("/wiki/") {
        if is_repo_name(repo) && !path.is_empty() {
            return ExternalId::Wiki {
                repo: repo.to_string(),
                path: path.to_string(),
            };
        }
    }
    if let Some((repo, number)) = id.rsplit_once('#') {
        if let (true, Ok(number)) = (is_repo_name(repo), number.parse::<u64>()) {
            return ExternalId::Numbered {
                repo: repo.to_string(),
                number,
            };
        }
    }
    ExternalId::Node(id.to_string())
}

/// Everything a single repository pass needs.
#[derive(Clone)]
pub struct RepoScope {
    pub source: Source,
    pub token: String,
    pub repo: Repository,
    pub since: Option<DateTime<Utc>>,
    pub cancel: CancellationToken,
}

impl RepoScope {
    fn check_cancelled(&self, kind: ContentKind) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled {
                repo: self.repo.full_name.clone(),
                kind: SyncTarget::Content(kind),
            });
        }
        Ok(())
    }

    fn page_error(&self, kind: ContentKind, page: u32, source: ApiError) -> SyncError {
        SyncError::Page {
            repo: self.repo.full_name.clone(),
            kind: SyncTarget::Content(kind),
            page,
            source,
        }
    }
}

/// Keep items updated at or after `since`.
///
/// The flag is set when anything was dropped, which on an `updated desc`
/// listing means every later page is older still.
fn take_since<T>(
    items: Vec<T>,
    since: Option<DateTime<Utc>>,
    updated_at: impl Fn(&T) -> DateTime<Utc>,
) -> (Vec<T>, bool) {
    let Some(since) = since else {
        return (items, false);
    };
    let total = items.len();
    let kept: Vec<T> = items.into_iter().filter(|i| updated_at(i) >= since).collect();
    let exhausted = kept.len() < total;
    (kept, exhausted)
}

/// Include filter must intersect (when set); exclude filter must not.
fn labels_pass<'a>(labels: impl IntoIterator<Item = &'a str>, source: &Source) -> bool {
    let include = &source.config.include_labels;
    let exclude = &source.config.exclude_labels;
    if include.is_empty() && exclude.is_empty() {
        return true;
    }
    let labels: Vec<&str> = labels.into_iter().collect();
    let any_of = |wanted: &[String]| wanted.iter().any(|w| labels.contains(&w.as_str()));
    (include.is_empty() || any_of(include)) && !any_of(exclude)
}

/// Percent-encode each segment of a repository file path, keeping the `/`
/// separators.
fn contents_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn list_options(per_page: u32, page: u32) -> RequestOptions {
    RequestOptions::get()
        .query("state", "all")
        .query("sort", "updated")
        .query("direction", "desc")
        .query("per_page", per_page)
        .query("page", page)
}

async fn when_enabled<F>(
    scope: &RepoScope,
    kind: ContentKind,
    pass: F,
) -> Result<Vec<CanonicalContentItem>, SyncError>
where
    F: Future<Output = Result<Vec<CanonicalContentItem>, SyncError>>,
{
    if scope.source.config.syncs(kind) {
        pass.await
    } else {
        Ok(Vec::new())
    }
}

#[derive(Clone)]
pub struct GitHubAdapter {
    client: GitHubClient,
    sync: SyncConfig,
    store: Arc<dyn Store>,
    credentials: Arc<dyn CredentialsProvider>,
}

impl GitHubAdapter {
    pub fn new(
        client: GitHubClient,
        sync: SyncConfig,
        store: Arc<dyn Store>,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Self {
        Self {
            client,
            sync,
            store,
            credentials,
        }
    }

    pub(crate) async fn token(&self, source: &Source) -> Result<String, SyncError> {
        match self.credentials.credentials(source).await {
            Ok(Some(creds)) => Ok(creds.token),
            Ok(None) => Err(SyncError::Auth {
                source_id: source.id.clone(),
                message: format!("no token found in ${}", source.config.token_env),
            }),
            Err(e) => Err(SyncError::Auth {
                source_id: source.id.clone(),
                message: format!("{:#}", e),
            }),
        }
    }

    /// Token presence, then `GET /user`.
    async fn authenticate(&self, source: &Source) -> Result<String, SyncError> {
        let token = self.token(source).await?;
        match self
            .client
            .fetch_json::<User>("/user", &token, RequestOptions::get())
            .await
        {
            Ok(user) => {
                debug!(source = %source.id, login = %user.login, "authenticated");
                Ok(token)
            }
            Err(e) => Err(SyncError::Auth {
                source_id: source.id.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Build the scope for one repository pass.
    pub async fn scope(
        &self,
        source: &Source,
        repo: Repository,
        since: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> Result<RepoScope, SyncError> {
        Ok(RepoScope {
            source: source.clone(),
            token: self.token(source).await?,
            repo,
            since,
            cancel,
        })
    }

    /// Run a full sync pass over every repository of `source`.
    ///
    /// Fails only on authentication. Per-repository and per-content-type
    /// failures are collected in [`SyncOutcome::errors`]; a repository with
    /// any failure yields no [`RepoSyncState`], so its cursor stays put.
    pub async fn fetch_content(
        &self,
        source: &Source,
        options: &FetchOptions,
    ) -> Result<SyncOutcome, SyncError> {
        let token = self.authenticate(source).await?;
        let pass_started = Utc::now();
        let mut outcome = SyncOutcome::default();

        let (repos, errors) = self.repositories(source, &token, &options.cancel).await;
        outcome.errors.extend(errors);
        info!(source = %source.id, repos = repos.len(), "starting sync pass");

        let semaphore = Arc::new(Semaphore::new(self.sync.repo_concurrency));
        let mut handles = Vec::with_capacity(repos.len());
        for repo in repos {
            let adapter = self.clone();
            let source = source.clone();
            let token = token.clone();
            let options = options.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return SyncOutcome::default();
                };
                adapter
                    .sync_repository(source, token, repo, &options, pass_started)
                    .await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(repo_outcome) => outcome.absorb(repo_outcome),
                Err(e) => warn!(source = %source.id, error = %e, "repository task failed"),
            }
        }

        info!(
            source = %source.id,
            items = outcome.items.len(),
            committed = outcome.repo_states.len(),
            errors = outcome.errors.len(),
            "sync pass finished"
        );
        Ok(outcome)
    }

    async fn resolve_since(
        &self,
        source: &Source,
        repo: &Repository,
        options: &FetchOptions,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        if options.since.is_some() {
            return Ok(options.since);
        }
        if options.full {
            return Ok(None);
        }
        let state = self
            .store
            .get_sync_state(&source.id, &repo.full_name)
            .await
            .map_err(SyncError::Store)?;
        Ok(state.map(|s| s.last_synced_at))
    }

    async fn sync_repository(
        &self,
        source: Source,
        token: String,
        repo: Repository,
        options: &FetchOptions,
        pass_started: DateTime<Utc>,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let since = match self.resolve_since(&source, &repo, options).await {
            Ok(since) => since,
            Err(e) => {
                outcome.errors.push(e);
                return outcome;
            }
        };
        let scope = RepoScope {
            source,
            token,
            repo,
            since,
            cancel: options.cancel.clone(),
        };
        debug!(repo = %scope.repo.full_name, since = ?scope.since, "syncing repository");

        let (prs, issues, discussions, wiki) = tokio::join!(
            when_enabled(&scope, ContentKind::PullRequests, self.sync_prs(&scope)),
            when_enabled(&scope, ContentKind::Issues, self.sync_issues(&scope)),
            when_enabled(&scope, ContentKind::Discussions, self.sync_discussions(&scope)),
            when_enabled(&scope, ContentKind::Wiki, self.sync_wiki(&scope)),
        );

        let mut failed = false;
        for result in [prs, issues, discussions, wiki] {
            match result {
                Ok(items) => outcome.items.extend(items),
                Err(e) => {
                    warn!(repo = %scope.repo.full_name, error = %error_chain(&e), "content sync failed");
                    failed = true;
                    outcome.errors.push(e);
                }
            }
        }

        if !failed {
            outcome.repo_states.push(RepoSyncState {
                source_id: scope.source.id.clone(),
                repo_full_name: scope.repo.full_name.clone(),
                repo_id: scope.repo.id,
                last_synced_at: pass_started,
            });
        }
        outcome
    }

    /// Every repository the source covers: its explicit list, or everything
    /// visible to the token.
    pub async fn list_repositories(&self, source: &Source) -> Result<Vec<Repository>, SyncError> {
        let token = self.token(source).await?;
        let (repos, mut errors) = self
            .repositories(source, &token, &CancellationToken::new())
            .await;
        if errors.is_empty() {
            Ok(repos)
        } else {
            Err(errors.remove(0))
        }
    }

    async fn repositories(
        &self,
        source: &Source,
        token: &str,
        cancel: &CancellationToken,
    ) -> (Vec<Repository>, Vec<SyncError>) {
        let mut repos = Vec::new();
        let mut errors = Vec::new();

        if !source.config.repos.is_empty() {
            for name in &source.config.repos {
                if cancel.is_cancelled() {
                    errors.push(SyncError::Cancelled {
                        repo: name.clone(),
                        kind: SyncTarget::Repositories,
                    });
                    continue;
                }
                let endpoint = format!("/repos/{}", name);
                match self
                    .client
                    .fetch_json::<Repository>(&endpoint, token, RequestOptions::get())
                    .await
                {
                    Ok(repo) => repos.push(repo),
                    Err(e) => errors.push(SyncError::Page {
                        repo: name.clone(),
                        kind: SyncTarget::Repositories,
                        page: 1,
                        source: e,
                    }),
                }
            }
            return (repos, errors);
        }

        let per_page = self.sync.repo_page_size;
        for page in 1..=self.sync.max_repo_pages {
            if cancel.is_cancelled() {
                errors.push(SyncError::Cancelled {
                    repo: "user/repos".to_string(),
                    kind: SyncTarget::Repositories,
                });
                break;
            }
            let options = RequestOptions::get()
                .query("sort", "updated")
                .query("per_page", per_page)
                .query("page", page);
            match self
                .client
                .fetch_json::<Vec<Repository>>("/user/repos", token, options)
                .await
            {
                Ok(batch) => {
                    let fetched = batch.len();
                    repos.extend(batch);
                    if fetched < per_page as usize {
                        break;
                    }
                }
                Err(e) => {
                    errors.push(SyncError::Page {
                        repo: "user/repos".to_string(),
                        kind: SyncTarget::Repositories,
                        page,
                        source: e,
                    });
                    break;
                }
            }
        }
        (repos, errors)
    }

    /// Pull requests updated since the scope's cursor, newest first.
    pub async fn sync_prs(
        &self,
        scope: &RepoScope,
    ) -> Result<Vec<CanonicalContentItem>, SyncError> {
        let kind = ContentKind::PullRequests;
        let endpoint = format!("/repos/{}/pulls", scope.repo.full_name);
        let per_page = self.sync.page_size;
        let mut items = Vec::new();

        for page in 1..=self.sync.max_pages {
            scope.check_cancelled(kind)?;
            let batch: Vec<PullRequest> = self
                .client
                .fetch_json(&endpoint, &scope.token, list_options(per_page, page))
                .await
                .map_err(|e| scope.page_error(kind, page, e))?;
            let fetched = batch.len();

            let (fresh, exhausted) = take_since(batch, scope.since, |pr| pr.updated_at);
            let wanted: Vec<PullRequest> = fresh
                .into_iter()
                .filter(|pr| labels_pass(pr.labels.iter().map(|l| l.name.as_str()), &scope.source))
                .collect();
            debug!(
                repo = %scope.repo.full_name,
                page,
                fetched,
                wanted = wanted.len(),
                "pull request page"
            );

            let mut handles = Vec::with_capacity(wanted.len());
            let semaphore = Arc::new(Semaphore::new(self.sync.concurrency));
            for pr in wanted {
                let adapter = self.clone();
                let token = scope.token.clone();
                let repo = scope.repo.full_name.clone();
                let cancel = scope.cancel.clone();
                let semaphore = Arc::clone(&semaphore);
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.ok()?;
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(adapter.pr_item(&token, &repo, &pr).await)
                }));
            }
            items.extend(collect_in_order(scope, kind, handles).await?);

            if exhausted || fetched < per_page as usize {
                break;
            }
        }
        Ok(items)
    }

    /// Issues updated since the scope's cursor. Pull request entries in the
    /// issues listing are skipped but still count toward the page size.
    pub async fn sync_issues(
        &self,
        scope: &RepoScope,
    ) -> Result<Vec<CanonicalContentItem>, SyncError> {
        let kind = ContentKind::Issues;
        let endpoint = format!("/repos/{}/issues", scope.repo.full_name);
        let per_page = self.sync.page_size;
        let mut items = Vec::new();

        for page in 1..=self.sync.max_pages {
            scope.check_cancelled(kind)?;
            let batch: Vec<Issue> = self
                .client
                .fetch_json(&endpoint, &scope.token, list_options(per_page, page))
                .await
                .map_err(|e| scope.page_error(kind, page, e))?;
            let fetched = batch.len();

            let (fresh, exhausted) = take_since(batch, scope.since, |issue| issue.updated_at);
            let wanted: Vec<Issue> = fresh
                .into_iter()
                .filter(|issue| !issue.is_pull_request())
                .filter(|issue| {
                    labels_pass(issue.labels.iter().map(|l| l.name.as_str()), &scope.source)
                })
                .collect();

            let mut handles = Vec::with_capacity(wanted.len());
            let semaphore = Arc::new(Semaphore::new(self.sync.concurrency));
            for issue in wanted {
                let adapter = self.clone();
                let token = scope.token.clone();
                let repo = scope.repo.full_name.clone();
                let cancel = scope.cancel.clone();
                let semaphore = Arc::clone(&semaphore);
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.ok()?;
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(adapter.issue_item(&token, &repo, &issue).await)
                }));
            }
            items.extend(collect_in_order(scope, kind, handles).await?);

            if exhausted || fetched < per_page as usize {
                break;
            }
        }
        Ok(items)
    }

    /// Discussions via GraphQL cursor pagination.
    pub async fn sync_discussions(
        &self,
        scope: &RepoScope,
    ) -> Result<Vec<CanonicalContentItem>, SyncError> {
        let kind = ContentKind::Discussions;
        let query = format!("{}{}", DISCUSSIONS_QUERY, DISCUSSION_FRAGMENT);
        let mut after: Option<String> = None;
        let mut items = Vec::new();

        for page in 1..=self.sync.max_discussion_pages {
            scope.check_cancelled(kind)?;
            let variables = json!({
                "owner": scope.repo.owner.login,
                "name": scope.repo.name,
                "first": self.sync.discussion_page_size,
                "after": after,
            });
            let data: DiscussionsData = self
                .client
                .graphql(&scope.token, &query, variables)
                .await
                .map_err(|e| scope.page_error(kind, page, e))?;
            let Some(repository) = data.repository else {
                break;
            };
            let DiscussionPage { page_info, nodes } = repository.discussions;

            let (fresh, exhausted) = take_since(nodes, scope.since, |d| d.updated_at);
            items.extend(
                fresh
                    .iter()
                    .filter(|d| {
                        let labels = d.labels.iter().flat_map(|c| c.nodes.iter());
                        labels_pass(labels.map(|l| l.name.as_str()), &scope.source)
                    })
                    .map(|d| convert::discussion_to_item(&scope.repo.full_name, d)),
            );

            if exhausted || !page_info.has_next_page {
                break;
            }
            match page_info.end_cursor {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }
        Ok(items)
    }

    /// Markdown pages from the wiki: the root plus one directory level.
    ///
    /// A missing wiki (404 on the root listing) is an empty result. Pages that
    /// fail to fetch or decode are skipped.
    pub async fn sync_wiki(
        &self,
        scope: &RepoScope,
    ) -> Result<Vec<CanonicalContentItem>, SyncError> {
        let kind = ContentKind::Wiki;
        if !scope.repo.has_wiki {
            return Ok(Vec::new());
        }
        scope.check_cancelled(kind)?;

        let root = format!("/repos/{}.wiki/contents", scope.repo.full_name);
        let entries: Vec<ContentEntry> = match self
            .client
            .fetch_json(&root, &scope.token, RequestOptions::get())
            .await
        {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => {
                debug!(repo = %scope.repo.full_name, "no wiki contents");
                return Ok(Vec::new());
            }
            Err(e) => return Err(scope.page_error(kind, 1, e)),
        };

        let max_pages = self.sync.wiki_max_pages_per_dir;
        let mut pages: Vec<ContentEntry> = entries
            .iter()
            .filter(|e| e.is_markdown())
            .take(max_pages)
            .cloned()
            .collect();

        for dir in entries.iter().filter(|e| e.is_dir()).take(self.sync.wiki_max_dirs) {
            scope.check_cancelled(kind)?;
            let endpoint = format!("{}/{}", root, contents_path(&dir.path));
            match self
                .client
                .fetch_json::<Vec<ContentEntry>>(&endpoint, &scope.token, RequestOptions::get())
                .await
            {
                Ok(children) => pages.extend(
                    children
                        .into_iter()
                        .filter(|e| e.is_markdown())
                        .take(max_pages),
                ),
                Err(e) => warn!(%endpoint, error = %e, "wiki directory listing failed; skipped"),
            }
        }

        let mut items = Vec::with_capacity(pages.len());
        for page in pages {
            scope.check_cancelled(kind)?;
            let endpoint = format!("{}/{}", root, contents_path(&page.path));
            let fetched = self
                .client
                .fetch_json::<ContentEntry>(&endpoint, &scope.token, RequestOptions::get())
                .await;
            match fetched {
                Ok(entry) => match convert::wiki_to_item(&scope.repo, &entry) {
                    Ok(item) => items.push(item),
                    Err(e) => warn!(%endpoint, error = %format!("{:#}", e), "wiki page undecodable; skipped"),
                },
                Err(e) => warn!(%endpoint, error = %e, "wiki page fetch failed; skipped"),
            }
        }
        Ok(items)
    }

    /// One page of side data. Failures degrade to an empty list.
    async fn side_data<T: DeserializeOwned>(&self, token: &str, endpoint: String) -> Vec<T> {
        let options = RequestOptions::get().query("per_page", SIDE_DATA_PAGE_SIZE);
        match self.client.fetch_json::<Vec<T>>(&endpoint, token, options).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(%endpoint, error = %e, "enrichment failed; continuing without it");
                Vec::new()
            }
        }
    }

    async fn pr_side_data(
        &self,
        token: &str,
        repo: &str,
        number: u64,
    ) -> (Vec<Review>, Vec<ReviewComment>, Vec<PullRequestFile>) {
        let base = format!("/repos/{}/pulls/{}", repo, number);
        tokio::join!(
            self.side_data::<Review>(token, format!("{}/reviews", base)),
            self.side_data::<ReviewComment>(token, format!("{}/comments", base)),
            self.side_data::<PullRequestFile>(token, format!("{}/files", base)),
        )
    }

    /// Convert a listed pull request. The listing omits diff totals, so the
    /// single-PR shape is fetched alongside the side data; if that fails the
    /// listed shape is used.
    async fn pr_item(&self, token: &str, repo: &str, listed: &PullRequest) -> CanonicalContentItem {
        let endpoint = format!("/repos/{}/pulls/{}", repo, listed.number);
        let (detail, (reviews, comments, files)) = tokio::join!(
            self.client
                .fetch_json::<PullRequest>(&endpoint, token, RequestOptions::get()),
            self.pr_side_data(token, repo, listed.number),
        );
        let pr = match detail {
            Ok(pr) => pr,
            Err(e) => {
                warn!(%endpoint, error = %e, "pull request detail failed; using listed shape");
                listed.clone()
            }
        };
        convert::pr_to_item(repo, &pr, &reviews, &comments, &files)
    }

    async fn issue_item(&self, token: &str, repo: &str, issue: &Issue) -> CanonicalContentItem {
        let endpoint = format!("/repos/{}/issues/{}/comments", repo, issue.number);
        let comments = self.side_data::<IssueComment>(token, endpoint).await;
        convert::issue_to_item(repo, issue, &comments)
    }

    /// Refetch a pull request and its side data.
    pub(crate) async fn fetch_pr_item(
        &self,
        token: &str,
        repo: &str,
        number: u64,
    ) -> Result<CanonicalContentItem, ApiError> {
        let endpoint = format!("/repos/{}/pulls/{}", repo, number);
        let pr: PullRequest = self
            .client
            .fetch_json(&endpoint, token, RequestOptions::get())
            .await?;
        let (reviews, comments, files) = self.pr_side_data(token, repo, number).await;
        Ok(convert::pr_to_item(repo, &pr, &reviews, &comments, &files))
    }

    /// Refetch an issue and its comments.
    pub(crate) async fn fetch_issue_item(
        &self,
        token: &str,
        repo: &str,
        number: u64,
    ) -> Result<CanonicalContentItem, ApiError> {
        let endpoint = format!("/repos/{}/issues/{}", repo, number);
        let issue: Issue = self
            .client
            .fetch_json(&endpoint, token, RequestOptions::get())
            .await?;
        Ok(self.issue_item(token, repo, &issue).await)
    }

    /// Refetch a discussion by node id. A node that is not a discussion is
    /// reported as not found.
    pub(crate) async fn fetch_discussion_item(
        &self,
        token: &str,
        node_id: &str,
    ) -> Result<CanonicalContentItem, ApiError> {
        match self.fetch_node(token, node_id).await? {
            Some(ResolvedNode::Discussion { repo, discussion }) => {
                Ok(convert::discussion_to_item(&repo, &discussion))
            }
            _ => Err(ApiError::new(
                Some(404),
                format!("discussion {} not found", node_id),
            )),
        }
    }

    async fn fetch_wiki_item(
        &self,
        token: &str,
        repo: &str,
        path: &str,
    ) -> Result<CanonicalContentItem, ApiError> {
        let repository: Repository = self
            .client
            .fetch_json(&format!("/repos/{}", repo), token, RequestOptions::get())
            .await?;
        let endpoint = format!("/repos/{}.wiki/contents/{}", repo, contents_path(path));
        let entry: ContentEntry = self
            .client
            .fetch_json(&endpoint, token, RequestOptions::get())
            .await?;
        convert::wiki_to_item(&repository, &entry)
            .map_err(|e| ApiError::new(None, format!("{:#}", e)))
    }

    async fn fetch_node(&self, token: &str, id: &str) -> Result<Option<ResolvedNode>, ApiError> {
        let query = format!("{}{}", NODE_QUERY, DISCUSSION_FRAGMENT);
        let data: NodeData = self
            .client
            .graphql(token, &query, json!({ "id": id }))
            .await?;
        let Some(node) = data.node else {
            return Ok(None);
        };

        let header = NodeHeader::deserialize(&node)
            .map_err(|e| ApiError::with_cause("unexpected node shape", e))?;
        let Some(repo) = header.repository.map(|r| r.name_with_owner) else {
            return Ok(None);
        };
        let resolved = match (header.typename.as_str(), header.number) {
            ("Discussion", _) => {
                let discussion = Discussion::deserialize(&node)
                    .map_err(|e| ApiError::with_cause("unexpected discussion shape", e))?;
                ResolvedNode::Discussion { repo, discussion }
            }
            ("Issue", Some(number)) => ResolvedNode::Issue { repo, number },
            ("PullRequest", Some(number)) => ResolvedNode::PullRequest { repo, number },
            _ => return Ok(None),
        };
        Ok(Some(resolved))
    }

    /// Resolve any external id this adapter produces back to a fresh item.
    ///
    /// `owner/repo#n` tries the pull request first and falls back to the
    /// issue. Anything that does not exist is `None`.
    pub async fn fetch_item(
        &self,
        source: &Source,
        external_id: &str,
    ) -> anyhow::Result<Option<CanonicalContentItem>> {
        let token = self.token(source).await?;
        let result = match parse_external_id(external_id) {
            ExternalId::Wiki { repo, path } => self.fetch_wiki_item(&token, &repo, &path).await,
            ExternalId::Numbered { repo, number } => {
                match self.fetch_pr_item(&token, &repo, number).await {
                    Err(e) if e.is_not_found() => self.fetch_issue_item(&token, &repo, number).await,
                    other => other,
                }
            }
            ExternalId::Node(id) => match self.fetch_node(&token, &id).await {
                Ok(None) => return Ok(None),
                Ok(Some(ResolvedNode::Discussion { repo, discussion })) => {
                    Ok(convert::discussion_to_item(&repo, &discussion))
                }
                Ok(Some(ResolvedNode::Issue { repo, number })) => {
                    self.fetch_issue_item(&token, &repo, number).await
                }
                Ok(Some(ResolvedNode::PullRequest { repo, number })) => {
                    self.fetch_pr_item(&token, &repo, number).await
                }
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(item) => Ok(Some(item)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("fetching {}", external_id)),
        }
    }

    /// Read a repository file, served from the file cache while fresh.
    ///
    /// Returns `None` when the file does not exist at that ref.
    pub async fn get_file_content(
        &self,
        source: &Source,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        let path = path.trim_start_matches('/');
        let key = FileCacheKey::new(&source.id, repo, path, git_ref);
        let now = Utc::now();

        if let Some(cached) = self.store.get_cached_file(&key).await? {
            if cached.is_fresh(now) {
                debug!(repo, path, git_ref = %key.git_ref, "file cache hit");
                return Ok(Some(cached.content));
            }
        }

        let token = self.token(source).await?;
        let mut options = RequestOptions::get();
        if let Some(r) = git_ref {
            options = options.query("ref", r);
        }
        let endpoint = format!("/repos/{}/contents/{}", repo, contents_path(path));
        let entry: ContentEntry = match self.client.fetch_json(&endpoint, &token, options).await {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}:{}", repo, path)),
        };

        let content = convert::decode_content(&entry)?;
        self.store
            .put_cached_file(
                &key,
                &CachedFile {
                    content: content.clone(),
                    fetched_at: now,
                },
            )
            .await?;
        Ok(Some(content))
    }

    /// Contributors of one repository (a single page). Listing failures
    /// degrade to an empty list.
    pub async fn sync_users(
        &self,
        source: &Source,
        repo: &str,
    ) -> Result<Vec<SourceUser>, SyncError> {
        let token = self.token(source).await?;
        let endpoint = format!("/repos/{}/contributors", repo);
        let contributors = self.side_data::<Contributor>(&token, endpoint).await;
        Ok(contributors
            .into_iter()
            .map(|c| SourceUser {
                external_id: c.id.to_string(),
                login: c.login,
                contributions: c.contributions,
            })
            .collect())
    }

    /// `false` when no token is configured or GitHub rejects it.
    pub async fn validate_credentials(&self, source: &Source) -> anyhow::Result<bool> {
        let Some(creds) = self.credentials.credentials(source).await? else {
            return Ok(false);
        };
        match self
            .client
            .fetch_json::<User>("/user", &creds.token, RequestOptions::get())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_unauthorized() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Tokens are long-lived; refreshing re-reads them from the provider.
    pub async fn refresh_auth(&self, source: &Source) -> anyhow::Result<Credentials> {
        self.credentials.credentials(source).await?.with_context(|| {
            format!(
                "no token configured for source '{}' (set ${})",
                source.id, source.config.token_env
            )
        })
    }
}

/// Await enrichment tasks in spawn order. A task that saw the cancellation
/// token makes the whole page `Cancelled`.
async fn collect_in_order(
    scope: &RepoScope,
    kind: ContentKind,
    handles: Vec<JoinHandle<Option<CanonicalContentItem>>>,
) -> Result<Vec<CanonicalContentItem>, SyncError> {
    let mut items = Vec::with_capacity(handles.len());
    let mut cancelled = false;
    for handle in handles {
        match handle.await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => cancelled = true,
            Err(e) => warn!(repo = %scope.repo.full_name, error = %e, "enrichment task failed; item skipped"),
        }
    }
    if cancelled {
        return Err(SyncError::Cancelled {
            repo: scope.repo.full_name.clone(),
            kind: SyncTarget::Content(kind),
        });
    }
    Ok(items)
}
