//! Canonical content models.
//!
//! Every source adapter produces [`CanonicalContentItem`]s. The item carries a
//! rendered markdown body for indexing plus a type-specific
//! [`ItemMetadata`] variant for structured filtering.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of canonical item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    PullRequest,
    Issue,
    Thread,
    Document,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::PullRequest => "pull_request",
            ContentType::Issue => "issue",
            ContentType::Thread => "thread",
            ContentType::Document => "document",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pull_request" => Some(ContentType::PullRequest),
            "issue" => Some(ContentType::Issue),
            "thread" => Some(ContentType::Thread),
            "document" => Some(ContentType::Document),
            _ => None,
        }
    }
}

/// Role a person played on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Author,
    Reviewer,
    Participant,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Author => "author",
            ParticipantRole::Reviewer => "reviewer",
            ParticipantRole::Participant => "participant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "author" => Some(ParticipantRole::Author),
            "reviewer" => Some(ParticipantRole::Reviewer),
            "participant" => Some(ParticipantRole::Participant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub external_id: String,
    pub name: String,
    pub role: ParticipantRole,
}

/// Aggregated review outcome for a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Pending,
}

/// Signal derived from the added lines of a diff set.
///
/// Never stored on its own; it is embedded in [`PullRequestMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContext {
    pub languages: Vec<String>,
    pub files: Vec<String>,
    pub directories: Vec<String>,
    pub components: Vec<String>,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestMetadata {
    pub repo: String,
    pub number: u64,
    /// `open`, `closed` or `merged`.
    pub state: String,
    pub draft: bool,
    pub merged_at: Option<DateTime<Utc>>,
    pub head_branch: String,
    pub base_branch: String,
    pub head_sha: String,
    pub base_sha: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub reviewers: Vec<String>,
    pub review_state: Option<ReviewState>,
    pub linked_issues: Vec<u64>,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub code_context: CodeContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueMetadata {
    pub repo: String,
    pub number: u64,
    pub state: String,
    pub state_reason: Option<String>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub milestone: Option<String>,
    pub linked_pull_requests: Vec<u64>,
    pub comment_count: u64,
    /// Only reactions with a non-zero count.
    pub reactions: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionAnswer {
    pub author: Option<String>,
    pub chosen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionMetadata {
    pub repo: String,
    pub number: u64,
    pub category: Option<String>,
    pub is_answered: bool,
    pub answer: Option<DiscussionAnswer>,
    pub upvote_count: u64,
    pub comment_count: u64,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiMetadata {
    pub repo: String,
    pub path: String,
    pub content_hash: String,
    pub size: u64,
}

/// Type-specific metadata, serialized with a `kind` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemMetadata {
    PullRequest(PullRequestMetadata),
    Issue(IssueMetadata),
    Discussion(DiscussionMetadata),
    Wiki(WikiMetadata),
}

/// The unified item every adapter produces.
///
/// The dedup key is `(source_id, external_id)`; the source id lives with the
/// store call, not on the item, so the same item can be compared across
/// sources in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalContentItem {
    pub external_id: String,
    pub content_type: ContentType,
    pub title: String,
    pub content: String,
    pub author_external: String,
    pub author_name: String,
    pub created_at_source: DateTime<Utc>,
    pub updated_at_source: DateTime<Utc>,
    pub url: Option<String>,
    pub metadata: ItemMetadata,
    pub participants: Vec<Participant>,
}

/// Per-repository incremental sync cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSyncState {
    pub source_id: String,
    pub repo_full_name: String,
    pub repo_id: i64,
    pub last_synced_at: DateTime<Utc>,
}

/// A repository contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub external_id: String,
    pub login: String,
    pub contributions: u64,
}
