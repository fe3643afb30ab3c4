mod common;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::*;
use hubsync::error::{SyncError, SyncTarget};
use hubsync::config::ContentKind;
use hubsync::ingest::sync_source;
use hubsync::traits::FetchOptions;
use hubsync_core::github::Repository;
use hubsync_core::models::{ContentType, ItemMetadata};
use hubsync_core::store::{CachedFile, ContentStore, FileCacheKey, FileCacheStore, SyncStateStore};

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn repository(full_name: &str, has_wiki: bool) -> Repository {
    serde_json::from_value(repo(full_name, has_wiki)).unwrap()
}

#[tokio::test]
async fn pr_sync_applies_since_and_label_filters_in_order() {
    let h = Harness::new(r#"exclude_labels = ["wontfix"]"#).await;
    let pulls = "/repos/acme/api/pulls";
    h.github.rest(
        pulls,
        json!([
            pull_request("acme/api", 1, "2024-03-05T00:00:00Z", &["bug"]),
            pull_request("acme/api", 2, "2024-03-04T00:00:00Z", &["wontfix"]),
        ]),
    );
    h.github.rest(
        &format!("{}?page=2", pulls),
        json!([
            pull_request("acme/api", 3, "2024-03-03T00:00:00Z", &[]),
            pull_request("acme/api", 4, "2024-02-01T00:00:00Z", &[]),
        ]),
    );
    h.github.rest(
        &format!("{}?page=3", pulls),
        json!([pull_request("acme/api", 5, "2024-01-01T00:00:00Z", &[])]),
    );

    let scope = h
        .adapter
        .scope(
            &h.source,
            repository("acme/api", false),
            Some(ts("2024-03-02T00:00:00Z")),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let items = h.adapter.sync_prs(&scope).await.unwrap();

    let ids: Vec<&str> = items.iter().map(|i| i.external_id.as_str()).collect();
    assert_eq!(ids, vec!["acme/api#1", "acme/api#3"]);
    assert!(items.iter().all(|i| i.updated_at_source >= ts("2024-03-02T00:00:00Z")));

    // older items on page 2 end the listing
    assert!(!h
        .github
        .calls()
        .iter()
        .any(|c| c.starts_with(pulls) && c.contains("page=3")));
    // label-filtered items are never enriched
    assert_eq!(h.github.calls_to("/repos/acme/api/pulls/2/reviews"), 0);
    assert_eq!(h.github.calls_to("/repos/acme/api/pulls/1/reviews"), 1);
}

#[tokio::test]
async fn failing_enrichment_yields_item_without_side_data() {
    let h = Harness::new("").await;
    h.github.rest(
        "/repos/acme/api/pulls",
        json!([pull_request("acme/api", 1, "2024-03-05T00:00:00Z", &[])]),
    );
    h.github.rest_status(
        "/repos/acme/api/pulls/1/reviews",
        500,
        json!({ "message": "Server Error" }),
    );
    h.github.rest(
        "/repos/acme/api/pulls/1/files",
        json!([pr_file(
            "web/src/Button.tsx",
            "@@ -0,0 +1 @@\n+export function Button() { return null }"
        )]),
    );

    let scope = h
        .adapter
        .scope(&h.source, repository("acme/api", false), None, CancellationToken::new())
        .await
        .unwrap();
    let items = h.adapter.sync_prs(&scope).await.unwrap();
    assert_eq!(items.len(), 1);

    let ItemMetadata::PullRequest(meta) = &items[0].metadata else {
        panic!("expected pull request metadata");
    };
    assert_eq!(meta.review_state, None);
    assert!(meta.reviewers.is_empty());
    assert_eq!(meta.linked_issues, vec![101]);
    assert_eq!(meta.code_context.languages, vec!["TypeScript"]);
    assert_eq!(meta.code_context.components, vec!["Button"]);
    assert_eq!(meta.additions, 1);
}

#[tokio::test]
async fn issue_sync_skips_pull_requests() {
    let h = Harness::new("").await;
    let mut as_pr = issue("acme/api", 2, "2024-03-04T00:00:00Z", &[]);
    as_pr["pull_request"] = json!({ "url": "https://api.github.com/repos/acme/api/pulls/2" });
    h.github.rest(
        "/repos/acme/api/issues",
        json!([issue("acme/api", 1, "2024-03-05T00:00:00Z", &[]), as_pr]),
    );
    h.github.rest("/repos/acme/api/issues?page=2", json!([]));
    h.github.rest(
        "/repos/acme/api/issues/1/comments",
        json!([{
            "id": 1,
            "user": user(12, "carol"),
            "body": "Also seeing this",
            "created_at": "2024-03-05T01:00:00Z"
        }]),
    );

    let scope = h
        .adapter
        .scope(&h.source, repository("acme/api", false), None, CancellationToken::new())
        .await
        .unwrap();
    let items = h.adapter.sync_issues(&scope).await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].external_id, "I_1");
    assert_eq!(items[0].content_type, ContentType::Issue);
    assert!(items[0].content.contains("Also seeing this"));
    assert_eq!(h.github.calls_to("/repos/acme/api/issues/2/comments"), 0);
    // the page was full (2 of 2), so page 2 was requested
    assert!(h
        .github
        .calls()
        .iter()
        .any(|c| c.starts_with("/repos/acme/api/issues?") && c.contains("page=2")));
}

#[tokio::test]
async fn discussions_follow_cursor_until_since() {
    let h = Harness::new("").await;
    h.github.discussions(
        None,
        discussion_page(
            vec![
                discussion(1, "2024-03-05T00:00:00Z"),
                discussion(2, "2024-03-04T00:00:00Z"),
            ],
            Some("c1"),
        ),
    );
    h.github.discussions(
        Some("c1"),
        discussion_page(
            vec![
                discussion(3, "2024-03-03T00:00:00Z"),
                discussion(4, "2024-01-01T00:00:00Z"),
            ],
            Some("c2"),
        ),
    );
    h.github.discussions(
        Some("c2"),
        discussion_page(vec![discussion(5, "2023-12-01T00:00:00Z")], None),
    );

    let scope = h
        .adapter
        .scope(
            &h.source,
            repository("acme/api", false),
            Some(ts("2024-03-01T00:00:00Z")),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let items = h.adapter.sync_discussions(&scope).await.unwrap();

    let ids: Vec<&str> = items.iter().map(|i| i.external_id.as_str()).collect();
    assert_eq!(ids, vec!["D_1", "D_2", "D_3"]);
    assert_eq!(items[0].author_external, "12");
    assert_eq!(h.github.calls_to("/graphql"), 2);
}

#[tokio::test]
async fn missing_wiki_is_empty_not_an_error() {
    let h = Harness::new("").await;
    let scope = h
        .adapter
        .scope(&h.source, repository("acme/api", true), None, CancellationToken::new())
        .await
        .unwrap();
    let items = h.adapter.sync_wiki(&scope).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn wiki_reads_root_and_one_directory_level() {
    let h = Harness::new("").await;
    let root = "/repos/acme/api.wiki/contents";
    let entry = |name: &str, path: &str, kind: &str| {
        json!({ "name": name, "path": path, "sha": format!("sha-{}", name), "size": 7, "type": kind })
    };
    h.github.rest(
        root,
        json!([
            entry("Getting-Started.md", "Getting-Started.md", "file"),
            entry("logo.png", "logo.png", "file"),
            entry("guides", "guides", "dir"),
        ]),
    );
    h.github.rest(
        &format!("{}/guides", root),
        json!([
            entry("Setup.md", "guides/Setup.md", "file"),
            entry("deeper", "guides/deeper", "dir"),
        ]),
    );
    let mut page = entry("Getting-Started.md", "Getting-Started.md", "file");
    page["content"] = json!("IyBIZWxs\nbw==\n");
    page["encoding"] = json!("base64");
    h.github.rest(&format!("{}/Getting-Started.md", root), page);
    // guides/Setup.md fails to fetch and is skipped

    let scope = h
        .adapter
        .scope(&h.source, repository("acme/api", true), None, CancellationToken::new())
        .await
        .unwrap();
    let items = h.adapter.sync_wiki(&scope).await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].external_id, "acme/api/wiki/Getting-Started.md");
    assert_eq!(items[0].title, "Wiki: Getting Started");
    assert_eq!(items[0].content, "# Hello");
    assert_eq!(h.github.calls_to(&format!("{}/guides/Setup.md", root)), 1);
    assert_eq!(h.github.calls_to(&format!("{}/guides/deeper", root)), 0);
}

#[tokio::test]
async fn wiki_paths_are_percent_encoded() {
    let h = Harness::new("").await;
    let root = "/repos/acme/api.wiki/contents";
    let entry = |name: &str, path: &str, kind: &str| {
        json!({ "name": name, "path": path, "sha": "sha", "size": 7, "type": kind })
    };
    h.github.rest(root, json!([entry("Q&A", "Q&A", "dir")]));
    h.github.rest(
        &format!("{}/Q%26A", root),
        json!([entry("FAQ #1?.md", "Q&A/FAQ #1?.md", "file")]),
    );
    let mut page = entry("FAQ #1?.md", "Q&A/FAQ #1?.md", "file");
    page["content"] = json!("IyBIZWxsbw==");
    page["encoding"] = json!("base64");
    h.github.rest(&format!("{}/Q%26A/FAQ%20%231%3F.md", root), page);
    h.github.rest("/repos/acme/api", repo("acme/api", true));

    let scope = h
        .adapter
        .scope(&h.source, repository("acme/api", true), None, CancellationToken::new())
        .await
        .unwrap();
    let items = h.adapter.sync_wiki(&scope).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].external_id, "acme/api/wiki/Q&A/FAQ #1?.md");
    assert_eq!(items[0].content, "# Hello");

    let fetched = h
        .adapter
        .fetch_item(&h.source, "acme/api/wiki/Q&A/FAQ #1?.md")
        .await
        .unwrap();
    assert_eq!(fetched, Some(items[0].clone()));
}

#[tokio::test]
async fn cursor_commits_only_for_fully_successful_repositories() {
    let h = Harness::new(
        r#"
repos = ["acme/api", "acme/web"]
content = ["pull_requests", "issues"]
"#,
    )
    .await;
    h.github.rest("/repos/acme/api", repo("acme/api", false));
    h.github.rest("/repos/acme/web", repo("acme/web", false));
    h.github.rest(
        "/repos/acme/api/pulls",
        json!([pull_request("acme/api", 1, "2024-03-05T00:00:00Z", &[])]),
    );
    h.github.rest(
        "/repos/acme/web/pulls",
        json!([pull_request("acme/web", 7, "2024-03-05T00:00:00Z", &[])]),
    );
    h.github.rest("/repos/acme/api/issues", json!([]));
    h.github.rest_status(
        "/repos/acme/web/issues",
        502,
        json!({ "message": "Bad Gateway" }),
    );

    let started = Utc::now() - Duration::seconds(1);
    let report = sync_source(
        &h.adapter,
        h.store.as_ref(),
        &h.source,
        &FetchOptions::default(),
    )
    .await
    .unwrap();

    // the failing content type does not stop the other one
    assert_eq!(report.items_stored, 2);
    assert!(h.store.get_item(SOURCE_ID, "acme/web#7").await.unwrap().is_some());

    assert_eq!(report.errors.len(), 1);
    match &report.errors[0] {
        SyncError::Page {
            repo, kind, page, source,
        } => {
            assert_eq!(repo, "acme/web");
            assert_eq!(*kind, SyncTarget::Content(ContentKind::Issues));
            assert_eq!(*page, 1);
            assert_eq!(source.status, Some(502));
        }
        other => panic!("unexpected error: {}", other),
    }

    let api = h.store.get_sync_state(SOURCE_ID, "acme/api").await.unwrap().unwrap();
    assert!(api.last_synced_at >= started - Duration::seconds(1));
    assert_eq!(api.repo_id, 1000);
    assert!(h.store.get_sync_state(SOURCE_ID, "acme/web").await.unwrap().is_none());

    // the next pass resumes from the stored cursor
    h.github.clear_calls();
    sync_source(&h.adapter, h.store.as_ref(), &h.source, &FetchOptions::default())
        .await
        .unwrap();
    let item = h.store.get_item(SOURCE_ID, "acme/api#1").await.unwrap().unwrap();
    assert_eq!(item.item.participants.len(), 1);
    assert_eq!(h.store.count_items(Some(SOURCE_ID)).await.unwrap(), 2);
}

#[tokio::test]
async fn rejected_token_is_an_auth_error_before_any_page() {
    let h = Harness::new(r#"repos = ["acme/api"]"#).await;
    h.github
        .rest_status("/user", 401, json!({ "message": "Bad credentials" }));

    let err = h
        .adapter
        .fetch_content(&h.source, &FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Auth { .. }));
    assert_eq!(h.github.calls(), vec!["/user".to_string()]);
    assert!(!h.adapter.validate_credentials(&h.source).await.unwrap());
}

#[tokio::test]
async fn cancelled_pass_commits_nothing() {
    let h = Harness::new(r#"repos = ["acme/api"]"#).await;
    h.github.rest("/repos/acme/api", repo("acme/api", false));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let options = FetchOptions {
        cancel,
        ..FetchOptions::default()
    };

    let report = sync_source(&h.adapter, h.store.as_ref(), &h.source, &options)
        .await
        .unwrap();
    assert!(report.committed.is_empty());
    assert!(!report.errors.is_empty());
    assert!(report
        .errors
        .iter()
        .all(|e| matches!(e, SyncError::Cancelled { .. })));
    assert_eq!(h.github.calls_to("/repos/acme/api/pulls"), 0);
}

#[tokio::test]
async fn fetch_item_resolves_each_id_format() {
    let h = Harness::new("").await;
    // #5 is an issue: the PR lookup 404s first
    h.github
        .rest("/repos/acme/api/issues/5", issue("acme/api", 5, "2024-03-05T00:00:00Z", &[]));
    h.github.rest("/repos/acme/api/issues/5/comments", json!([]));
    h.github.rest("/repos/acme/api", repo("acme/api", true));
    let mut page = json!({
        "name": "Home.md", "path": "Home.md", "sha": "s1", "size": 7, "type": "file",
        "content": "IyBIZWxsbw==", "encoding": "base64"
    });
    page["html_url"] = json!("https://github.com/acme/api/wiki/Home");
    h.github.rest("/repos/acme/api.wiki/contents/Home.md", page);
    let mut node = discussion(9, "2024-03-05T00:00:00Z");
    node["__typename"] = json!("Discussion");
    node["repository"] = json!({ "nameWithOwner": "acme/api" });
    h.github.node("D_9", node);

    let issue = h.adapter.fetch_item(&h.source, "acme/api#5").await.unwrap().unwrap();
    assert_eq!(issue.external_id, "I_5");
    assert_eq!(h.github.calls_to("/repos/acme/api/pulls/5"), 1);

    let wiki = h
        .adapter
        .fetch_item(&h.source, "acme/api/wiki/Home.md")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wiki.content, "# Hello");

    let discussion = h.adapter.fetch_item(&h.source, "D_9").await.unwrap().unwrap();
    assert_eq!(discussion.content_type, ContentType::Thread);

    assert!(h.adapter.fetch_item(&h.source, "acme/api#404").await.unwrap().is_none());
    assert!(h.adapter.fetch_item(&h.source, "D_missing").await.unwrap().is_none());
}

#[tokio::test]
async fn file_cache_serves_fresh_entries_and_refetches_expired_ones() {
    let h = Harness::new("").await;
    let path = "/repos/acme/api/contents/README.md";
    h.github.rest(
        path,
        json!({
            "name": "README.md", "path": "README.md", "sha": "s", "size": 7,
            "type": "file", "content": "IyBIZWxsbw==", "encoding": "base64"
        }),
    );

    let first = h
        .adapter
        .get_file_content(&h.source, "acme/api", "README.md", None)
        .await
        .unwrap();
    let second = h
        .adapter
        .get_file_content(&h.source, "acme/api", "README.md", None)
        .await
        .unwrap();
    assert_eq!(first.as_deref(), Some("# Hello"));
    assert_eq!(first, second);
    assert_eq!(h.github.calls_to(path), 1);

    let key = FileCacheKey::new(SOURCE_ID, "acme/api", "README.md", None);
    assert_eq!(key.git_ref, "HEAD");
    h.store
        .put_cached_file(
            &key,
            &CachedFile {
                content: "stale".into(),
                fetched_at: Utc::now() - Duration::days(8),
            },
        )
        .await
        .unwrap();
    let refreshed = h
        .adapter
        .get_file_content(&h.source, "acme/api", "README.md", None)
        .await
        .unwrap();
    assert_eq!(refreshed.as_deref(), Some("# Hello"));
    assert_eq!(h.github.calls_to(path), 2);

    // a pinned ref is its own cache entry
    let pinned = h
        .adapter
        .get_file_content(&h.source, "acme/api", "README.md", Some("v1.0"))
        .await
        .unwrap();
    assert!(pinned.is_some());
    assert!(h.github.calls().iter().any(|c| c.contains("ref=v1.0")));

    let missing = h
        .adapter
        .get_file_content(&h.source, "acme/api", "NOPE.md", None)
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn users_degrade_to_empty_on_failure() {
    let h = Harness::new("").await;
    h.github.rest(
        "/repos/acme/api/contributors",
        json!([{ "id": 10, "login": "alice", "contributions": 42 }]),
    );

    let users = h.adapter.sync_users(&h.source, "acme/api").await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].external_id, "10");
    assert_eq!(users[0].contributions, 42);

    let none = h.adapter.sync_users(&h.source, "acme/gone").await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn repositories_come_from_token_or_explicit_list() {
    let h = Harness::new("").await;
    h.github.rest(
        "/user/repos",
        json!([repo("acme/api", false), repo("acme/web", true)]),
    );
    h.github.rest("/user/repos?page=2", json!([]));
    let repos = h.adapter.list_repositories(&h.source).await.unwrap();
    let names: Vec<&str> = repos.iter().map(|r| r.full_name.as_str()).collect();
    assert_eq!(names, vec!["acme/api", "acme/web"]);

    let h = Harness::new(r#"repos = ["acme/api", "acme/gone"]"#).await;
    h.github.rest("/repos/acme/api", repo("acme/api", false));
    match h.adapter.list_repositories(&h.source).await {
        Err(SyncError::Page {
            repo,
            kind: SyncTarget::Repositories,
            source,
            ..
        }) => {
            assert_eq!(repo, "acme/gone");
            assert!(source.is_not_found());
        }
        other => panic!("expected a repository page error, got {:?}", other.map(|r| r.len())),
    }
    assert_eq!(h.github.calls_to("/user/repos"), 0);
}

fn requested_page(call: &str, path: &str) -> Option<u32> {
    let query = call.strip_prefix(path)?.strip_prefix('?')?;
    query
        .split('&')
        .find_map(|kv| kv.strip_prefix("page="))
        .and_then(|v| v.parse().ok())
}

#[tokio::test]
async fn pr_listing_stops_at_page_ceiling() {
    let h = Harness::new("").await;
    let pulls = "/repos/acme/api/pulls";
    // max_pages = 5, page_size = 2; every page is full
    for page in 1..=6u64 {
        let prs = json!([
            pull_request("acme/api", page * 10, "2024-03-05T00:00:00Z", &[]),
            pull_request("acme/api", page * 10 + 1, "2024-03-05T00:00:00Z", &[]),
        ]);
        let key = if page == 1 {
            pulls.to_string()
        } else {
            format!("{}?page={}", pulls, page)
        };
        h.github.rest(&key, prs);
    }

    let scope = h
        .adapter
        .scope(&h.source, repository("acme/api", false), None, CancellationToken::new())
        .await
        .unwrap();
    let items = h.adapter.sync_prs(&scope).await.unwrap();

    assert_eq!(items.len(), 10);
    let pages: Vec<u32> = h
        .github
        .calls()
        .iter()
        .filter_map(|c| requested_page(c, pulls))
        .collect();
    assert_eq!(pages, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn discussion_listing_stops_at_page_ceiling() {
    let h = Harness::new("").await;
    // max_discussion_pages defaults to 10; hasNextPage stays true past it
    for page in 0..12u64 {
        let after = (page > 0).then(|| format!("c{}", page));
        let next = format!("c{}", page + 1);
        h.github.discussions(
            after.as_deref(),
            discussion_page(
                vec![
                    discussion(page * 2 + 1, "2024-03-05T00:00:00Z"),
                    discussion(page * 2 + 2, "2024-03-05T00:00:00Z"),
                ],
                Some(&next),
            ),
        );
    }

    let scope = h
        .adapter
        .scope(&h.source, repository("acme/api", false), None, CancellationToken::new())
        .await
        .unwrap();
    let items = h.adapter.sync_discussions(&scope).await.unwrap();

    assert_eq!(items.len(), 20);
    assert_eq!(items.last().map(|i| i.external_id.as_str()), Some("D_20"));
    assert_eq!(h.github.calls_to("/graphql"), 10);
}

#[tokio::test]
async fn repository_listing_stops_at_page_ceiling() {
    let h = Harness::new("").await;
    // max_repo_pages = 3, repo_page_size = 2; every page is full
    for page in 1..=4u64 {
        let repos = json!([
            repo(&format!("acme/r{}", page * 10), false),
            repo(&format!("acme/r{}", page * 10 + 1), false),
        ]);
        let key = if page == 1 {
            "/user/repos".to_string()
        } else {
            format!("/user/repos?page={}", page)
        };
        h.github.rest(&key, repos);
    }

    let repos = h.adapter.list_repositories(&h.source).await.unwrap();

    assert_eq!(repos.len(), 6);
    let pages: Vec<u32> = h
        .github
        .calls()
        .iter()
        .filter_map(|c| requested_page(c, "/user/repos"))
        .collect();
    assert_eq!(pages, vec![1, 2, 3]);
}
