//! Conversion of GitHub entity shapes into [`CanonicalContentItem`]s.
//!
//! Every function here is pure: the same inputs always produce the same item.
//! Both the polling orchestrator and the webhook handler call these, which is
//! what keeps their output representationally identical.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::code_context::aggregate_code_context;
use crate::github::{
    actor_identity, is_markdown_name, user_identity, ContentEntry, Discussion, Issue,
    IssueComment, PullRequest, PullRequestFile, Repository, Review, ReviewComment, User,
};
use crate::models::{
    CanonicalContentItem, ContentType, DiscussionAnswer, DiscussionMetadata, IssueMetadata,
    ItemMetadata, Participant, ParticipantRole, PullRequestMetadata, ReviewState, WikiMetadata,
};
use crate::references::collect_references;

/// Review comments rendered into a pull request body.
pub const MAX_REVIEW_COMMENTS: usize = 10;
/// Comments rendered into an issue or discussion body.
pub const MAX_ISSUE_COMMENTS: usize = 20;

const NO_DESCRIPTION: &str = "_No description provided._";

/// External id of a pull request: `owner/repo#number`.
pub fn pr_external_id(repo: &str, number: u64) -> String {
    format!("{repo}#{number}")
}

/// External id of a wiki page: `owner/repo/wiki/path`.
pub fn wiki_external_id(repo: &str, path: &str) -> String {
    format!("{repo}/wiki/{path}")
}

/// Aggregate review outcome over every submitted review.
///
/// Any `CHANGES_REQUESTED` wins over approvals; a repo with only comments or
/// dismissed reviews is `Pending`; no reviews at all is `None`.
pub fn derive_review_state(reviews: &[Review]) -> Option<ReviewState> {
    if reviews.is_empty() {
        return None;
    }
    let approved = reviews.iter().any(|r| r.state == "APPROVED");
    let changes = reviews.iter().any(|r| r.state == "CHANGES_REQUESTED");
    if approved && !changes {
        Some(ReviewState::Approved)
    } else if changes {
        Some(ReviewState::ChangesRequested)
    } else {
        Some(ReviewState::Pending)
    }
}

/// Ordered participant list, deduplicated by external id. First role wins.
#[derive(Default)]
struct Participants(Vec<Participant>);

impl Participants {
    fn with_author(external_id: &str, name: &str) -> Self {
        let mut p = Self::default();
        p.add(external_id, name, ParticipantRole::Author);
        p
    }

    fn add(&mut self, external_id: &str, name: &str, role: ParticipantRole) {
        if self.0.iter().any(|p| p.external_id == external_id) {
            return;
        }
        self.0.push(Participant {
            external_id: external_id.to_string(),
            name: name.to_string(),
            role,
        });
    }

    fn add_user(&mut self, user: Option<&User>, role: ParticipantRole) {
        if let Some(u) = user {
            self.add(&u.external_id(), &u.login, role);
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn date(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

fn login(user: Option<&User>) -> String {
    user_identity(user).1
}

fn description(body: Option<&str>) -> &str {
    match body.map(str::trim) {
        Some(b) if !b.is_empty() => b,
        _ => NO_DESCRIPTION,
    }
}

/// Convert a pull request plus its side data.
///
/// `reviews`, `review_comments` and `files` may be empty when enrichment
/// failed; the item is still produced.
pub fn pr_to_item(
    repo: &str,
    pr: &PullRequest,
    reviews: &[Review],
    review_comments: &[ReviewComment],
    files: &[PullRequestFile],
) -> CanonicalContentItem {
    let (author_external, author_name) = user_identity(pr.user.as_ref());

    let mut reviewers = Vec::new();
    for u in &pr.requested_reviewers {
        push_unique(&mut reviewers, &u.login);
    }
    for r in reviews {
        if let Some(u) = &r.user {
            push_unique(&mut reviewers, &u.login);
        }
    }

    let mut participants = Participants::with_author(&author_external, &author_name);
    for u in &pr.requested_reviewers {
        participants.add_user(Some(u), ParticipantRole::Reviewer);
    }
    for r in reviews {
        participants.add_user(r.user.as_ref(), ParticipantRole::Reviewer);
    }
    for u in &pr.assignees {
        participants.add_user(Some(u), ParticipantRole::Participant);
    }
    for c in review_comments {
        participants.add_user(c.user.as_ref(), ParticipantRole::Participant);
    }

    let state = if pr.merged_at.is_some() {
        "merged".to_string()
    } else {
        pr.state.clone()
    };

    let linked_issues = collect_references(
        [pr.title.as_str(), pr.body.as_deref().unwrap_or_default()],
        Some(pr.number),
    );

    let metadata = PullRequestMetadata {
        repo: repo.to_string(),
        number: pr.number,
        state,
        draft: pr.draft,
        merged_at: pr.merged_at,
        head_branch: pr.head.ref_name.clone(),
        base_branch: pr.base.ref_name.clone(),
        head_sha: pr.head.sha.clone(),
        base_sha: pr.base.sha.clone(),
        labels: pr.labels.iter().map(|l| l.name.clone()).collect(),
        assignees: pr.assignees.iter().map(|u| u.login.clone()).collect(),
        reviewers,
        review_state: derive_review_state(reviews),
        linked_issues,
        additions: pr
            .additions
            .unwrap_or_else(|| files.iter().map(|f| f.additions).sum()),
        deletions: pr
            .deletions
            .unwrap_or_else(|| files.iter().map(|f| f.deletions).sum()),
        changed_files: pr.changed_files.unwrap_or(files.len() as u64),
        code_context: aggregate_code_context(files),
    };

    CanonicalContentItem {
        external_id: pr_external_id(repo, pr.number),
        content_type: ContentType::PullRequest,
        title: pr.title.clone(),
        content: render_pr_body(pr, reviews, review_comments, files),
        author_external,
        author_name,
        created_at_source: pr.created_at,
        updated_at_source: pr.updated_at,
        url: Some(pr.html_url.clone()),
        metadata: ItemMetadata::PullRequest(metadata),
        participants: participants.0,
    }
}

fn render_pr_body(
    pr: &PullRequest,
    reviews: &[Review],
    review_comments: &[ReviewComment],
    files: &[PullRequestFile],
) -> String {
    let mut out = format!("# {}\n\n{}\n", pr.title, description(pr.body.as_deref()));

    if !files.is_empty() {
        out.push_str(&format!("\n## Changed files ({})\n\n", files.len()));
        for f in files {
            out.push_str(&format!(
                "- `{}` ({}, +{}/-{})\n",
                f.filename, f.status, f.additions, f.deletions
            ));
        }
    }

    let submitted: Vec<&Review> = reviews
        .iter()
        .filter(|r| r.state != "PENDING")
        .take(MAX_REVIEW_COMMENTS)
        .collect();
    if !submitted.is_empty() {
        out.push_str("\n## Reviews\n\n");
        for r in submitted {
            let body = r.body.as_deref().map(str::trim).unwrap_or_default();
            if body.is_empty() {
                out.push_str(&format!("- **{}** {}\n", login(r.user.as_ref()), r.state));
            } else {
                out.push_str(&format!(
                    "- **{}** {}: {}\n",
                    login(r.user.as_ref()),
                    r.state,
                    body
                ));
            }
        }
    }

    if !review_comments.is_empty() {
        out.push_str("\n## Review comments\n\n");
        for c in review_comments.iter().take(MAX_REVIEW_COMMENTS) {
            let location = match c.line {
                Some(line) => format!("{}:{}", c.path, line),
                None => c.path.clone(),
            };
            out.push_str(&format!(
                "- **{}** on `{}`: {}\n",
                login(c.user.as_ref()),
                location,
                c.body.trim()
            ));
        }
    }

    out
}

/// Convert an issue plus its comments. The issue's node id is the external id.
pub fn issue_to_item(repo: &str, issue: &Issue, comments: &[IssueComment]) -> CanonicalContentItem {
    let (author_external, author_name) = user_identity(issue.user.as_ref());

    let mut participants = Participants::with_author(&author_external, &author_name);
    for u in &issue.assignees {
        participants.add_user(Some(u), ParticipantRole::Participant);
    }
    for c in comments {
        participants.add_user(c.user.as_ref(), ParticipantRole::Participant);
    }

    let texts = std::iter::once(issue.body.as_deref().unwrap_or_default())
        .chain(comments.iter().filter_map(|c| c.body.as_deref()));
    let linked_pull_requests = collect_references(texts, Some(issue.number));

    let reactions: BTreeMap<String, u64> = issue
        .reactions
        .as_ref()
        .map(|r| {
            r.counts()
                .into_iter()
                .filter(|(_, n)| *n > 0)
                .map(|(name, n)| (name.to_string(), n))
                .collect()
        })
        .unwrap_or_default();

    let metadata = IssueMetadata {
        repo: repo.to_string(),
        number: issue.number,
        state: issue.state.clone(),
        state_reason: issue.state_reason.clone(),
        labels: issue.labels.iter().map(|l| l.name.clone()).collect(),
        assignees: issue.assignees.iter().map(|u| u.login.clone()).collect(),
        milestone: issue.milestone.as_ref().map(|m| m.title.clone()),
        linked_pull_requests,
        comment_count: issue.comments.max(comments.len() as u64),
        reactions,
    };

    let mut content = format!("# {}\n\n{}\n", issue.title, description(issue.body.as_deref()));
    if !comments.is_empty() {
        content.push_str("\n## Comments\n");
        for c in comments.iter().take(MAX_ISSUE_COMMENTS) {
            content.push_str(&format!(
                "\n**{}** ({}):\n\n{}\n",
                login(c.user.as_ref()),
                date(&c.created_at),
                c.body.as_deref().map(str::trim).unwrap_or_default()
            ));
        }
    }

    CanonicalContentItem {
        external_id: issue.node_id.clone(),
        content_type: ContentType::Issue,
        title: issue.title.clone(),
        content,
        author_external,
        author_name,
        created_at_source: issue.created_at,
        updated_at_source: issue.updated_at,
        url: Some(issue.html_url.clone()),
        metadata: ItemMetadata::Issue(metadata),
        participants: participants.0,
    }
}

/// Convert a discussion node. The node id is the external id.
pub fn discussion_to_item(repo: &str, discussion: &Discussion) -> CanonicalContentItem {
    let (author_external, author_name) = actor_identity(discussion.author.as_ref());

    let mut participants = Participants::with_author(&author_external, &author_name);
    if let Some(answer) = &discussion.answer {
        let (id, name) = actor_identity(answer.author.as_ref());
        participants.add(&id, &name, ParticipantRole::Participant);
    }
    for c in &discussion.comments.nodes {
        let (id, name) = actor_identity(c.author.as_ref());
        participants.add(&id, &name, ParticipantRole::Participant);
    }

    let answer = discussion.answer.as_ref().map(|a| DiscussionAnswer {
        author: a.author.as_ref().map(|actor| actor.login.clone()),
        chosen_at: discussion.answer_chosen_at,
    });

    let metadata = DiscussionMetadata {
        repo: repo.to_string(),
        number: discussion.number,
        category: discussion.category.as_ref().map(|c| c.name.clone()),
        is_answered: discussion.answer.is_some(),
        answer,
        upvote_count: discussion.upvote_count,
        comment_count: discussion
            .comments
            .total_count
            .unwrap_or(discussion.comments.nodes.len() as u64),
        labels: discussion
            .labels
            .as_ref()
            .map(|c| c.nodes.iter().map(|l| l.name.clone()).collect())
            .unwrap_or_default(),
    };

    let mut content = format!(
        "# {}\n\n{}\n",
        discussion.title,
        description(Some(discussion.body.as_str()))
    );
    if let Some(a) = &discussion.answer {
        content.push_str(&format!(
            "\n## Answer\n\n**{}**:\n\n{}\n",
            actor_identity(a.author.as_ref()).1,
            a.body.trim()
        ));
    }
    if !discussion.comments.nodes.is_empty() {
        content.push_str("\n## Comments\n");
        for c in discussion.comments.nodes.iter().take(MAX_ISSUE_COMMENTS) {
            content.push_str(&format!(
                "\n**{}** ({}):\n\n{}\n",
                actor_identity(c.author.as_ref()).1,
                date(&c.created_at),
                c.body.trim()
            ));
        }
    }

    CanonicalContentItem {
        external_id: discussion.id.clone(),
        content_type: ContentType::Thread,
        title: discussion.title.clone(),
        content,
        author_external,
        author_name,
        created_at_source: discussion.created_at,
        updated_at_source: discussion.updated_at,
        url: Some(discussion.url.clone()),
        metadata: ItemMetadata::Discussion(metadata),
        participants: participants.0,
    }
}

/// Decode a `contents` API payload.
///
/// GitHub wraps base64 at 60 columns, so whitespace is stripped first.
/// Non-UTF-8 bytes are replaced rather than rejected.
pub fn decode_content(entry: &ContentEntry) -> Result<String> {
    let raw = entry.content.as_deref().unwrap_or_default();
    match entry.encoding.as_deref() {
        Some("base64") => {
            let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(compact.as_bytes())
                .with_context(|| format!("invalid base64 content for {}", entry.path))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Ok(raw.to_string()),
    }
}

/// `Getting-Started.md` becomes `Wiki: Getting Started`.
pub fn wiki_title(name: &str) -> String {
    let stem = if is_markdown_name(name) {
        name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name)
    } else {
        name
    };
    format!("Wiki: {}", stem.replace('-', " "))
}

/// Convert a fetched wiki page. The repository owner is credited as author
/// and the repository's update time stands in for the page timestamps.
pub fn wiki_to_item(repo: &Repository, page: &ContentEntry) -> Result<CanonicalContentItem> {
    let content = decode_content(page)?;
    let author_external = repo.owner.external_id();
    let author_name = repo.owner.login.clone();

    Ok(CanonicalContentItem {
        external_id: wiki_external_id(&repo.full_name, &page.path),
        content_type: ContentType::Document,
        title: wiki_title(&page.name),
        content,
        participants: Participants::with_author(&author_external, &author_name).0,
        author_external,
        author_name,
        created_at_source: repo.updated_at,
        updated_at_source: repo.updated_at,
        url: page.html_url.clone(),
        metadata: ItemMetadata::Wiki(WikiMetadata {
            repo: repo.full_name.clone(),
            path: page.path.clone(),
            content_hash: page.sha.clone(),
            size: page.size,
        }),
    })
}
