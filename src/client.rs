use std::collections::BTreeMap;
use std::fmt;

use reqwest::{header, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{
    wire::{AddAssignees, AddLabels, ApiErrorBody},
    ApiErrorResponse, CreatedIssue, GithubApiError, NewIssue, Result, RetryConfig,
};

/// Default public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

// GitHub rejects requests without a User-Agent header.
const USER_AGENT: &str = concat!("github-issues-http/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
/// HTTP client for the GitHub Issues REST endpoints used by report workflows.
///
/// Operations are single-shot; wrap them in
/// [`execute_with_retry`](crate::execute_with_retry) (or use
/// [`create_issues`](crate::create_issues)) for rate-limit-aware retry.
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    authorization: String,
    retry: RetryConfig,
}

impl fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubClient")
            .field("base_url", &self.base_url)
            .field("authorization", &"<redacted>")
            .field("retry", &self.retry)
            .finish()
    }
}

impl GithubClient {
    /// Creates a client from an API base URL and an access token.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added
    /// automatically.
    pub fn new(base_url: impl Into<String>, token: impl AsRef<str>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            authorization: normalize_bearer_authorization(token.as_ref()),
            retry: RetryConfig::default(),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `GITHUB_TOKEN` — access token (Bearer prefix optional)
    /// - `GITHUB_API_URL` — API endpoint, defaults to the public
    ///   [`DEFAULT_API_URL`] when unset
    ///
    /// Returns an error if the token is missing or empty.
    pub fn from_env() -> std::result::Result<Self, String> {
        let token = std::env::var("GITHUB_TOKEN")
            .map_err(|_| "missing GITHUB_TOKEN environment variable".to_owned())?;
        if token.trim().is_empty() {
            return Err("GITHUB_TOKEN is set but empty".to_owned());
        }
        let base_url =
            std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        Ok(Self::new(base_url, token))
    }

    /// Applies retry tuning used by workflows built on this client.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Retry tuning in effect for this client.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Opens an issue and returns its number and URL.
    pub async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<CreatedIssue> {
        let url = format!("{}/repos/{owner}/{repo}/issues", self.base_url);
        let response = self.post(&url, issue).await?;
        Self::decode_json(response).await
    }

    /// Adds labels to an existing issue.
    pub async fn add_labels(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        labels: &[String],
    ) -> Result<()> {
        let url = format!(
            "{}/repos/{owner}/{repo}/issues/{issue_number}/labels",
            self.base_url
        );
        let payload = AddLabels {
            labels: labels.to_vec(),
        };
        self.post(&url, &payload).await?;
        Ok(())
    }

    /// Assigns users to an existing issue.
    pub async fn add_assignees(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        assignees: &[String],
    ) -> Result<()> {
        let url = format!(
            "{}/repos/{owner}/{repo}/issues/{issue_number}/assignees",
            self.base_url
        );
        let payload = AddAssignees {
            assignees: assignees.to_vec(),
        };
        self.post(&url, &payload).await?;
        Ok(())
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<Response> {
        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, &self.authorization)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, USER_AGENT)
            .json(body)
            .send()
            .await
            .map_err(GithubApiError::Transport)?;

        if response.status().is_success() {
            return Ok(response);
        }
        Err(GithubApiError::Api(Self::shape_error(response).await))
    }

    /// Collapses a non-success response into the shape the retry classifier
    /// reads: status, lowercase header map, and the error-body message.
    async fn shape_error(response: Response) -> ApiErrorResponse {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect::<BTreeMap<_, _>>();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.message)
            .unwrap_or(body);

        ApiErrorResponse {
            status,
            headers,
            message,
        }
    }

    async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await.map_err(GithubApiError::Transport)?;
        serde_json::from_str(&body).map_err(|err| {
            GithubApiError::Decode(format!("invalid response JSON: {err}; body: {body}"))
        })
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
