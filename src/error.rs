//! Error taxonomy for the GitHub adapter.

use std::fmt;

use thiserror::Error;

use crate::config::ContentKind;

/// The single error kind returned by [`GitHubClient`](crate::client::GitHubClient).
///
/// Non-success HTTP responses, GraphQL `errors` arrays, decode failures and
/// transport failures all collapse into this shape.
#[derive(Debug)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
    /// Set when the response carried `x-ratelimit-remaining: 0` (or was a 429).
    pub rate_limited: bool,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            rate_limited: false,
            cause: None,
        }
    }

    pub fn with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            status: None,
            message: message.into(),
            rate_limited: false,
            cause: Some(Box::new(cause)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, Some(401)) || (self.status == Some(403) && !self.rate_limited)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited || self.status == Some(429)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "GitHub API error ({}): {}", status, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// `err` followed by each of its sources, joined with `: `.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        out.push_str(": ");
        out.push_str(&e.to_string());
        current = e.source();
    }
    out
}

/// What a sync pass was doing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    Repositories,
    Content(ContentKind),
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTarget::Repositories => f.write_str("repositories"),
            SyncTarget::Content(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or rejected token. Fatal to the whole invocation.
    #[error("authentication failed for source '{source_id}': {message}")]
    Auth { source_id: String, message: String },

    /// A primary list page failed; the rest of that repo/content type is skipped.
    #[error("{kind} sync for {repo} failed on page {page}")]
    Page {
        repo: String,
        kind: SyncTarget,
        page: u32,
        #[source]
        source: ApiError,
    },

    #[error("{kind} sync for {repo} was cancelled")]
    Cancelled { repo: String, kind: SyncTarget },

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

impl SyncError {
    /// Repository the failure belongs to, if any.
    pub fn repo(&self) -> Option<&str> {
        match self {
            SyncError::Page { repo, .. } | SyncError::Cancelled { repo, .. } => {
                Some(repo.as_str())
            }
            _ => None,
        }
    }
}

/// Why a webhook delivery was not acted on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookRejection {
    #[error("unsupported event '{0}'")]
    UnsupportedEvent(String),
    #[error("action '{action}' is not handled for '{event}'")]
    IgnoredAction { event: String, action: String },
    #[error("payload is missing an action")]
    MissingAction,
    #[error("payload does not match the {0} shape")]
    Malformed(&'static str),
}
