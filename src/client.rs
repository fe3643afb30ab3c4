//! Thin GitHub REST v3 / GraphQL v4 client.
//!
//! The client normalizes every failure into [`ApiError`] and never retries.
//! Rate-limited responses are detected and logged so the gap is visible, but
//! callers treat them like any other failed call.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::GitHubConfig;
use crate::error::ApiError;

const API_VERSION: &str = "2022-11-28";

/// Method, query string and JSON body for a REST call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    graphql_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("hubsync/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create GitHub HTTP client: {}", e))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            graphql_url: config.graphql_url.clone(),
        })
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.api_url, endpoint)
        } else {
            format!("{}/{}", self.api_url, endpoint)
        }
    }

    /// Call a REST endpoint and decode the JSON response.
    ///
    /// `endpoint` is relative to the configured API URL unless it is absolute.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        token: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let url = self.url_for(endpoint);
        debug!(method = %options.method, %url, "GitHub REST request");

        let mut request = self
            .http
            .request(options.method, &url)
            .bearer_auth(token.trim());
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::with_cause(format!("request to {} failed", endpoint), e))?;
        decode_response(endpoint, response).await
    }

    /// Run a GraphQL query and decode its `data` member.
    ///
    /// A non-empty `errors` array is an error even when `data` is present.
    /// A `NOT_FOUND` error is reported with status 404.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        token: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ApiError> {
        debug!(url = %self.graphql_url, "GitHub GraphQL request");
        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(token.trim())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| ApiError::with_cause("GraphQL request failed", e))?;

        let envelope: GraphQlResponse<T> = decode_response("graphql", response).await?;
        if !envelope.errors.is_empty() {
            let not_found = envelope
                .errors
                .iter()
                .any(|e| e.kind.as_deref() == Some("NOT_FOUND"));
            let message = envelope
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ApiError::new(not_found.then_some(404), message));
        }
        envelope
            .data
            .ok_or_else(|| ApiError::new(None, "GraphQL response had no data"))
    }
}

async fn decode_response<T: DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<T, ApiError> {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::with_cause(format!("reading response from {} failed", endpoint), e))?;

    if !status.is_success() {
        let message = serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| String::from_utf8_lossy(&bytes).trim().to_string());
        let mut err = ApiError::new(Some(status.as_u16()), message);
        err.rate_limited = is_rate_limited(status.as_u16(), &headers);
        if err.is_rate_limited() {
            match rate_limit_reset(&headers) {
                Some(reset) => warn!(endpoint, %reset, "GitHub rate limit hit; not retrying"),
                None => warn!(endpoint, "GitHub rate limit hit; not retrying"),
            }
        }
        return Err(err);
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        let mut err = ApiError::with_cause(format!("could not decode response from {}", endpoint), e);
        err.status = Some(status.as_u16());
        err
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_rate_limited(status: u16, headers: &HeaderMap) -> bool {
    status == 429 || (status == 403 && header_str(headers, "x-ratelimit-remaining") == Some("0"))
}

fn rate_limit_reset(headers: &HeaderMap) -> Option<chrono::DateTime<chrono::Utc>> {
    header_str(headers, "x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> GitHubClient {
        GitHubClient::new(&GitHubConfig {
            api_url: api_url.to_string(),
            ..GitHubConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn endpoints_join_base_url() {
        let c = client("https://ghe.example.com/api/v3/");
        assert_eq!(
            c.url_for("/repos/a/b"),
            "https://ghe.example.com/api/v3/repos/a/b"
        );
        assert_eq!(c.url_for("user"), "https://ghe.example.com/api/v3/user");
        assert_eq!(
            c.url_for("https://api.github.com/x"),
            "https://api.github.com/x"
        );
    }

    #[test]
    fn rate_limit_detection() {
        let mut headers = HeaderMap::new();
        assert!(is_rate_limited(429, &headers));
        assert!(!is_rate_limited(403, &headers));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));
        assert!(is_rate_limited(403, &headers));
        assert_eq!(
            rate_limit_reset(&headers).map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn request_options_builder() {
        let opts = RequestOptions::get().query("per_page", 50).query("page", 2);
        assert_eq!(opts.method, Method::GET);
        assert_eq!(opts.query.len(), 2);
        assert_eq!(opts.query[1], ("page".to_string(), "2".to_string()));
    }
}
