//! Webhook classification and refetch.
//!
//! A delivery is decoded into a [`WebhookEvent`] by checking the payload's
//! structure, never by trusting it: the event only names *what* changed, and
//! the adapter refetches the authoritative state through the same conversion
//! functions the polling path uses.
//!
//! | Event | Actions | Refetch |
//! |-------|---------|---------|
//! | `pull_request` | opened, edited, closed, reopened, synchronize | PR + side data |
//! | `pull_request_review` | submitted, edited, dismissed | PR + side data |
//! | `issues` | opened, edited, closed, reopened | issue + comments |
//! | `issue_comment` | created, edited, deleted | issue, or PR when the issue is one |
//! | `discussion` | created, edited, answered, unanswered | discussion by node id |

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use hubsync_core::models::CanonicalContentItem;

use crate::config::Source;
use crate::connector_github::GitHubAdapter;
use crate::error::WebhookRejection;

/// A delivery the adapter acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PullRequest { repo: String, number: u64 },
    Issue { repo: String, number: u64 },
    IssueComment {
        repo: String,
        number: u64,
        on_pull_request: bool,
    },
    Discussion {
        repo: String,
        node_id: String,
        number: u64,
    },
}

#[derive(Deserialize)]
struct Envelope {
    action: Option<String>,
    repository: RepositoryShape,
}

#[derive(Deserialize)]
struct RepositoryShape {
    full_name: String,
}

#[derive(Deserialize)]
struct HeadShape {
    #[serde(rename = "ref")]
    _ref_name: String,
}

#[derive(Deserialize)]
struct PullRequestShape {
    number: u64,
    #[serde(rename = "head")]
    _head: HeadShape,
}

#[derive(Deserialize)]
struct IssueShape {
    number: u64,
    #[serde(rename = "state")]
    _state: String,
    #[serde(rename = "assignees")]
    _assignees: Vec<Value>,
    #[serde(default)]
    pull_request: Option<Value>,
}

#[derive(Deserialize)]
struct DiscussionShape {
    node_id: String,
    number: u64,
}

const PULL_REQUEST_ACTIONS: &[&str] = &["opened", "edited", "closed", "reopened", "synchronize"];
const REVIEW_ACTIONS: &[&str] = &["submitted", "edited", "dismissed"];
const ISSUE_ACTIONS: &[&str] = &["opened", "edited", "closed", "reopened"];
const COMMENT_ACTIONS: &[&str] = &["created", "edited", "deleted"];
const DISCUSSION_ACTIONS: &[&str] = &["created", "edited", "answered", "unanswered"];

fn allowed_actions(event: &str) -> Option<&'static [&'static str]> {
    match event {
        "pull_request" => Some(PULL_REQUEST_ACTIONS),
        "pull_request_review" => Some(REVIEW_ACTIONS),
        "issues" => Some(ISSUE_ACTIONS),
        "issue_comment" => Some(COMMENT_ACTIONS),
        "discussion" => Some(DISCUSSION_ACTIONS),
        _ => None,
    }
}

fn member<'a, T: Deserialize<'a>>(
    payload: &'a Value,
    key: &str,
    shape: &'static str,
) -> Result<T, WebhookRejection> {
    let value = payload.get(key).ok_or(WebhookRejection::Malformed(shape))?;
    T::deserialize(value).map_err(|_| WebhookRejection::Malformed(shape))
}

/// Decode a delivery into the event it describes.
pub fn classify(event: &str, payload: &Value) -> Result<WebhookEvent, WebhookRejection> {
    let allowed =
        allowed_actions(event).ok_or_else(|| WebhookRejection::UnsupportedEvent(event.into()))?;
    let envelope =
        Envelope::deserialize(payload).map_err(|_| WebhookRejection::Malformed("repository"))?;
    let action = envelope.action.ok_or(WebhookRejection::MissingAction)?;
    if !allowed.contains(&action.as_str()) {
        return Err(WebhookRejection::IgnoredAction {
            event: event.to_string(),
            action,
        });
    }
    let repo = envelope.repository.full_name;

    match event {
        "pull_request" | "pull_request_review" => {
            let pr: PullRequestShape = member(payload, "pull_request", "pull request")?;
            Ok(WebhookEvent::PullRequest {
                repo,
                number: pr.number,
            })
        }
        "issues" => {
            let issue: IssueShape = member(payload, "issue", "issue")?;
            Ok(WebhookEvent::Issue {
                repo,
                number: issue.number,
            })
        }
        "issue_comment" => {
            let issue: IssueShape = member(payload, "issue", "issue")?;
            Ok(WebhookEvent::IssueComment {
                repo,
                number: issue.number,
                on_pull_request: issue.pull_request.is_some(),
            })
        }
        "discussion" => {
            let discussion: DiscussionShape = member(payload, "discussion", "discussion")?;
            Ok(WebhookEvent::Discussion {
                repo,
                node_id: discussion.node_id,
                number: discussion.number,
            })
        }
        other => Err(WebhookRejection::UnsupportedEvent(other.to_string())),
    }
}

impl GitHubAdapter {
    /// Turn a webhook delivery into a freshly fetched item.
    ///
    /// Deliveries that are not of interest are `Ok(None)`. Refetch failures,
    /// including 404s, are errors.
    pub async fn handle_webhook(
        &self,
        source: &Source,
        event: &str,
        payload: &Value,
    ) -> anyhow::Result<Option<CanonicalContentItem>> {
        let classified = match classify(event, payload) {
            Ok(classified) => classified,
            Err(rejection) => {
                debug!(source = %source.id, event, %rejection, "webhook ignored");
                return Ok(None);
            }
        };

        let token = self.token(source).await?;
        let item = match &classified {
            WebhookEvent::PullRequest { repo, number }
            | WebhookEvent::IssueComment {
                repo,
                number,
                on_pull_request: true,
            } => self.fetch_pr_item(&token, repo, *number).await?,
            WebhookEvent::Issue { repo, number }
            | WebhookEvent::IssueComment {
                repo,
                number,
                on_pull_request: false,
            } => self.fetch_issue_item(&token, repo, *number).await?,
            WebhookEvent::Discussion { node_id, .. } => {
                self.fetch_discussion_item(&token, node_id).await?
            }
        };

        info!(
            source = %source.id,
            event,
            external_id = %item.external_id,
            "webhook refetched item"
        );
        Ok(Some(item))
    }
}
