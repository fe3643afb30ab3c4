//! In-process fake GitHub (REST + GraphQL) for integration tests.
//!
//! Responses are registered per path. For paginated listings, page 1 is the
//! bare path and later pages are keyed `"{path}?page={n}"`. Unregistered
//! paths answer 404 like GitHub does. Every request is recorded.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;

use hubsync::client::GitHubClient;
use hubsync::config::{parse_config, Config, Source};
use hubsync::connector_github::GitHubAdapter;
use hubsync::credentials::StaticCredentials;
use hubsync::sqlite_store::SqliteStore;

pub const SOURCE_ID: &str = "gh";
pub const TOKEN: &str = "test-token";

#[derive(Default)]
struct Fixtures {
    rest: HashMap<String, (u16, Value)>,
    discussions: HashMap<String, Value>,
    nodes: HashMap<String, Value>,
    calls: Vec<String>,
}

#[derive(Clone)]
pub struct FakeGitHub {
    pub base: String,
    state: Arc<Mutex<Fixtures>>,
}

impl FakeGitHub {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(Fixtures::default()));
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{}", addr),
            state,
        }
    }

    /// Register a 200 response.
    pub fn rest(&self, key: &str, body: Value) {
        self.rest_status(key, 200, body);
    }

    pub fn rest_status(&self, key: &str, status: u16, body: Value) {
        self.state
            .lock()
            .unwrap()
            .rest
            .insert(key.to_string(), (status, body));
    }

    /// Register a discussions page for the given `after` cursor.
    pub fn discussions(&self, after: Option<&str>, page: Value) {
        self.state
            .lock()
            .unwrap()
            .discussions
            .insert(after.unwrap_or("").to_string(), page);
    }

    pub fn node(&self, id: &str, node: Value) {
        self.state
            .lock()
            .unwrap()
            .nodes
            .insert(id.to_string(), node);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split('?').next() == Some(path))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Config pointing at this server. `source` is the body of the
    /// `[sources.gh]` table after `type = "github"`.
    pub fn config(&self, db_path: &std::path::Path, source: &str) -> Config {
        let toml = format!(
            r#"
[db]
path = "{}"

[github]
api_url = "{}"
graphql_url = "{}/graphql"
timeout_secs = 5

[sync]
page_size = 2
max_pages = 5
discussion_page_size = 2
concurrency = 2
repo_concurrency = 2
repo_page_size = 2
max_repo_pages = 3

[sources.gh]
type = "github"
{}
"#,
            db_path.display(),
            self.base,
            self.base,
            source
        );
        parse_config(&toml).unwrap()
    }
}

fn page_of(uri: &Uri) -> Option<u32> {
    uri.query()?
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| *k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

async fn handle(
    State(state): State<Arc<Mutex<Fixtures>>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let mut fixtures = state.lock().unwrap();
    let call = match uri.query() {
        Some(q) => format!("{}?{}", uri.path(), q),
        None => uri.path().to_string(),
    };
    fixtures.calls.push(call);

    if method == Method::POST && uri.path() == "/graphql" {
        let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        let query = request["query"].as_str().unwrap_or_default();
        let variables = &request["variables"];

        if query.contains("node(id:") {
            let id = variables["id"].as_str().unwrap_or_default();
            return match fixtures.nodes.get(id) {
                Some(node) => Json(json!({ "data": { "node": node } })).into_response(),
                None => Json(json!({
                    "data": { "node": null },
                    "errors": [{
                        "type": "NOT_FOUND",
                        "message": format!("Could not resolve to a node with the global id of '{}'", id)
                    }]
                }))
                .into_response(),
            };
        }

        let after = variables["after"].as_str().unwrap_or("").to_string();
        return match fixtures.discussions.get(&after) {
            Some(page) => Json(json!({
                "data": { "repository": { "discussions": page } }
            }))
            .into_response(),
            None => Json(json!({
                "data": { "repository": { "discussions": {
                    "pageInfo": { "hasNextPage": false, "endCursor": null },
                    "nodes": []
                } } }
            }))
            .into_response(),
        };
    }

    let key = match page_of(&uri) {
        Some(page) if page > 1 => format!("{}?page={}", uri.path(), page),
        _ => uri.path().to_string(),
    };
    match fixtures.rest.get(&key) {
        Some((status, body)) => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(body.clone()),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Not Found" })),
        )
            .into_response(),
    }
}

// ─── Fixture builders ──────────────────────────────────────────────────

pub fn user(id: u64, login: &str) -> Value {
    json!({ "id": id, "login": login, "type": "User" })
}

pub fn repo(full_name: &str, has_wiki: bool) -> Value {
    let (owner, name) = full_name.split_once('/').unwrap();
    json!({
        "id": 1000,
        "name": name,
        "full_name": full_name,
        "owner": user(1, owner),
        "private": false,
        "has_wiki": has_wiki,
        "has_discussions": true,
        "default_branch": "main",
        "html_url": format!("https://github.com/{}", full_name),
        "updated_at": "2024-03-10T00:00:00Z"
    })
}

pub fn pull_request(repo: &str, number: u64, updated_at: &str, labels: &[&str]) -> Value {
    json!({
        "id": 5000 + number,
        "node_id": format!("PR_{}", number),
        "number": number,
        "title": format!("PR {}", number),
        "body": format!("Fixes #{}", number + 100),
        "state": "open",
        "draft": false,
        "merged_at": null,
        "html_url": format!("https://github.com/{}/pull/{}", repo, number),
        "user": user(10, "alice"),
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": updated_at,
        "head": { "ref": format!("feature-{}", number), "sha": "abc" },
        "base": { "ref": "main", "sha": "def" },
        "labels": labels.iter().map(|l| json!({ "name": l })).collect::<Vec<_>>(),
        "assignees": [],
        "requested_reviewers": []
    })
}

pub fn issue(repo: &str, number: u64, updated_at: &str, labels: &[&str]) -> Value {
    json!({
        "id": 7000 + number,
        "node_id": format!("I_{}", number),
        "number": number,
        "title": format!("Issue {}", number),
        "body": "Something is broken",
        "state": "open",
        "html_url": format!("https://github.com/{}/issues/{}", repo, number),
        "user": user(11, "bob"),
        "labels": labels.iter().map(|l| json!({ "name": l })).collect::<Vec<_>>(),
        "assignees": [],
        "comments": 1,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": updated_at
    })
}

pub fn review(id: u64, login_id: u64, login: &str, state: &str) -> Value {
    json!({
        "id": id,
        "user": user(login_id, login),
        "state": state,
        "body": "Looks good",
        "submitted_at": "2024-03-02T00:00:00Z"
    })
}

pub fn pr_file(filename: &str, patch: &str) -> Value {
    json!({
        "filename": filename,
        "status": "modified",
        "additions": 1,
        "deletions": 0,
        "changes": 1,
        "patch": patch
    })
}

pub fn discussion(number: u64, updated_at: &str) -> Value {
    json!({
        "id": format!("D_{}", number),
        "number": number,
        "title": format!("Discussion {}", number),
        "body": "How do I deploy?",
        "url": format!("https://github.com/acme/api/discussions/{}", number),
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": updated_at,
        "upvoteCount": 3,
        "answerChosenAt": null,
        "author": { "login": "carol", "databaseId": 12 },
        "category": { "name": "Q&A" },
        "answer": null,
        "comments": { "totalCount": 0, "nodes": [] },
        "labels": { "nodes": [] }
    })
}

pub fn discussion_page(nodes: Vec<Value>, end_cursor: Option<&str>) -> Value {
    json!({
        "pageInfo": { "hasNextPage": end_cursor.is_some(), "endCursor": end_cursor },
        "nodes": nodes
    })
}

// ─── Wiring ────────────────────────────────────────────────────────────

pub struct Harness {
    pub github: FakeGitHub,
    pub config: Config,
    pub source: Source,
    pub store: Arc<SqliteStore>,
    pub adapter: GitHubAdapter,
    _tmp: TempDir,
}

impl Harness {
    pub async fn new(source_toml: &str) -> Self {
        let github = FakeGitHub::start().await;
        let tmp = TempDir::new().unwrap();
        let config = github.config(&tmp.path().join("data/hubsync.sqlite"), source_toml);
        let source = config.source(SOURCE_ID).unwrap();
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());
        let adapter = GitHubAdapter::new(
            GitHubClient::new(&config.github).unwrap(),
            config.sync.clone(),
            store.clone(),
            Arc::new(StaticCredentials::new().with_token(SOURCE_ID, TOKEN)),
        );
        github.rest("/user", user(99, "octocat"));
        Self {
            github,
            config,
            source,
            store,
            adapter,
            _tmp: tmp,
        }
    }
}
