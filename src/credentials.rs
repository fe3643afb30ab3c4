//! Token lookup for configured sources.
//!
//! Tokens are handed over already decrypted. [`EnvCredentials`] reads them
//! from the environment variables named in the source config;
//! [`StaticCredentials`] holds them in memory for tests and embedding.

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::Source;

/// A bearer token for one source.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Token for `source`, or `None` when none is configured.
    async fn credentials(&self, source: &Source) -> Result<Option<Credentials>>;

    /// Shared secret used to sign webhook deliveries, if any.
    async fn webhook_secret(&self, source: &Source) -> Result<Option<String>>;
}

/// Reads tokens from the environment at call time.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl CredentialsProvider for EnvCredentials {
    async fn credentials(&self, source: &Source) -> Result<Option<Credentials>> {
        Ok(non_empty_env(&source.config.token_env).map(|token| Credentials { token }))
    }

    async fn webhook_secret(&self, source: &Source) -> Result<Option<String>> {
        Ok(source
            .config
            .webhook_secret_env
            .as_deref()
            .and_then(non_empty_env))
    }
}

/// In-memory tokens and secrets keyed by source id.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    tokens: HashMap<String, String>,
    secrets: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, source_id: &str, token: &str) -> Self {
        self.tokens.insert(source_id.to_string(), token.to_string());
        self
    }

    pub fn with_webhook_secret(mut self, source_id: &str, secret: &str) -> Self {
        self.secrets.insert(source_id.to_string(), secret.to_string());
        self
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn credentials(&self, source: &Source) -> Result<Option<Credentials>> {
        Ok(self.tokens.get(&source.id).map(|token| Credentials {
            token: token.clone(),
        }))
    }

    async fn webhook_secret(&self, source: &Source) -> Result<Option<String>> {
        Ok(self.secrets.get(&source.id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn source() -> Source {
        let config = parse_config(
            r#"
[db]
path = "x.sqlite"

[sources.gh]
type = "github"
token_env = "HUBSYNC_TEST_TOKEN_UNSET_9F2A"
"#,
        )
        .unwrap();
        config.source("gh").unwrap()
    }

    #[tokio::test]
    async fn env_credentials_missing_var_is_none() {
        let creds = EnvCredentials.credentials(&source()).await.unwrap();
        assert!(creds.is_none());
        assert!(EnvCredentials.webhook_secret(&source()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn static_credentials_by_source_id() {
        let provider = StaticCredentials::new()
            .with_token("gh", "t0k")
            .with_webhook_secret("gh", "s3cret");
        let creds = provider.credentials(&source()).await.unwrap().unwrap();
        assert_eq!(creds.token, "t0k");
        assert_eq!(format!("{:?}", creds), "Credentials { token: \"<redacted>\" }");
        assert_eq!(
            provider.webhook_secret(&source()).await.unwrap().as_deref(),
            Some("s3cret")
        );
    }
}
