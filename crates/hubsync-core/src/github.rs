//! GitHub entity shapes as returned by the REST v3 and GraphQL v4 APIs.
//!
//! Only the fields the conversion pipeline reads are modelled. Everything is
//! `Serialize` as well so fixtures and webhook refetches can round-trip
//! through `serde_json::Value`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login used when GitHub returns a null user (deleted accounts).
pub const GHOST_LOGIN: &str = "ghost";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub login: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl User {
    pub fn external_id(&self) -> String {
        self.id.to_string()
    }
}

/// External id and display name for an optional REST user.
pub fn user_identity(user: Option<&User>) -> (String, String) {
    match user {
        Some(u) => (u.external_id(), u.login.clone()),
        None => (GHOST_LOGIN.to_string(), GHOST_LOGIN.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub node_id: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    pub html_url: String,
    #[serde(default)]
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub head: BranchRef,
    pub base: BranchRef,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<User>,
    #[serde(default)]
    pub requested_reviewers: Vec<User>,
    /// Only present on the single-PR endpoint.
    #[serde(default)]
    pub additions: Option<u64>,
    #[serde(default)]
    pub deletions: Option<u64>,
    #[serde(default)]
    pub changed_files: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    #[serde(default)]
    pub user: Option<User>,
    /// `APPROVED`, `CHANGES_REQUESTED`, `COMMENTED`, `DISMISSED` or `PENDING`.
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: u64,
    #[serde(default)]
    pub user: Option<User>,
    pub body: String,
    pub path: String,
    #[serde(default)]
    pub line: Option<u64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
    #[serde(default)]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    #[serde(default, rename = "+1")]
    pub plus_one: u64,
    #[serde(default, rename = "-1")]
    pub minus_one: u64,
    #[serde(default)]
    pub laugh: u64,
    #[serde(default)]
    pub hooray: u64,
    #[serde(default)]
    pub confused: u64,
    #[serde(default)]
    pub heart: u64,
    #[serde(default)]
    pub rocket: u64,
    #[serde(default)]
    pub eyes: u64,
}

impl Reactions {
    /// Reaction name/count pairs in GitHub's display order.
    pub fn counts(&self) -> [(&'static str, u64); 8] {
        [
            ("+1", self.plus_one),
            ("-1", self.minus_one),
            ("laugh", self.laugh),
            ("hooray", self.hooray),
            ("confused", self.confused),
            ("heart", self.heart),
            ("rocket", self.rocket),
            ("eyes", self.eyes),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub node_id: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub state_reason: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<User>,
    #[serde(default)]
    pub milestone: Option<Milestone>,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub reactions: Option<Reactions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Present when the "issue" is really a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: User,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub has_wiki: bool,
    #[serde(default)]
    pub has_discussions: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a `contents` listing, or a single file with its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    /// `file`, `dir`, `symlink` or `submodule`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl ContentEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }

    pub fn is_markdown(&self) -> bool {
        self.kind == "file" && is_markdown_name(&self.name)
    }
}

pub fn is_markdown_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".markdown")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub contributions: u64,
}

// ─── GraphQL shapes ────────────────────────────────────────────────────

/// A GraphQL actor (`User`, `Bot`, `Organization`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub login: String,
    #[serde(default)]
    pub database_id: Option<i64>,
}

impl Actor {
    /// Matches the REST numeric id when GitHub exposes it.
    pub fn external_id(&self) -> String {
        self.database_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| self.login.clone())
    }
}

pub fn actor_identity(actor: Option<&Actor>) -> (String, String) {
    match actor {
        Some(a) => (a.external_id(), a.login.clone()),
        None => (GHOST_LOGIN.to_string(), GHOST_LOGIN.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self {
            total_count: None,
            nodes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionCategory {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionComment {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub author: Option<Actor>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    pub id: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub upvote_count: u64,
    #[serde(default)]
    pub author: Option<Actor>,
    #[serde(default)]
    pub category: Option<DiscussionCategory>,
    #[serde(default)]
    pub answer: Option<DiscussionComment>,
    #[serde(default)]
    pub answer_chosen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Connection<DiscussionComment>,
    #[serde(default)]
    pub labels: Option<Connection<LabelNode>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_request_deserializes_list_shape() {
        let pr: PullRequest = serde_json::from_value(serde_json::json!({
            "id": 1,
            "node_id": "PR_1",
            "number": 7,
            "title": "Add widget",
            "body": null,
            "state": "open",
            "html_url": "https://github.com/acme/api/pull/7",
            "user": { "id": 10, "login": "alice", "type": "User" },
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "head": { "ref": "feature", "sha": "abc" },
            "base": { "ref": "main", "sha": "def" }
        }))
        .unwrap();
        assert_eq!(pr.head.ref_name, "feature");
        assert!(pr.labels.is_empty());
        assert_eq!(pr.additions, None);
        assert!(!pr.draft);
    }

    #[test]
    fn issue_detects_pull_request_marker() {
        let issue: Issue = serde_json::from_value(serde_json::json!({
            "id": 2,
            "node_id": "I_2",
            "number": 8,
            "title": "Bug",
            "state": "open",
            "html_url": "https://github.com/acme/api/issues/8",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "pull_request": { "url": "https://api.github.com/repos/acme/api/pulls/8" }
        }))
        .unwrap();
        assert!(issue.is_pull_request());
        assert_eq!(user_identity(issue.user.as_ref()).1, GHOST_LOGIN);
    }

    #[test]
    fn actor_prefers_database_id() {
        let with_id = Actor {
            login: "bob".into(),
            database_id: Some(42),
        };
        let without = Actor {
            login: "bot".into(),
            database_id: None,
        };
        assert_eq!(with_id.external_id(), "42");
        assert_eq!(without.external_id(), "bot");
    }

    #[test]
    fn markdown_names() {
        assert!(is_markdown_name("Home.md"));
        assert!(is_markdown_name("Guide.MARKDOWN"));
        assert!(!is_markdown_name("logo.png"));
    }
}
