use std::collections::BTreeMap;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum GithubApiError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code returned by the GitHub API.
    #[error("api error {}: {}", .0.status, .0.message)]
    Api(ApiErrorResponse),
    /// Response decoding or protocol-shape validation error.
    #[error("decode error: {0}")]
    Decode(String),
}

impl GithubApiError {
    /// The HTTP failure response attached to this error, when one exists.
    ///
    /// Transport and decode failures carry no response.
    pub fn response(&self) -> Option<&ApiErrorResponse> {
        match self {
            Self::Api(response) => Some(response),
            _ => None,
        }
    }
}

/// HTTP failure response as seen by the retry classifier.
///
/// Header names are lowercase; `reqwest` normalizes them at the transport
/// boundary. `message` is the `message` field of the GitHub error body, or
/// the raw body text when the body is not JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiErrorResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub message: String,
}

impl ApiErrorResponse {
    /// Looks up a header by its lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// `retry-after` header parsed as whole seconds.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.header("retry-after")?.trim().parse().ok()
    }

    /// Raw `x-ratelimit-remaining` header value.
    pub fn rate_limit_remaining(&self) -> Option<&str> {
        self.header("x-ratelimit-remaining")
    }

    /// `x-ratelimit-reset` header parsed as a unix timestamp.
    pub fn rate_limit_reset(&self) -> Option<u64> {
        self.header("x-ratelimit-reset")?.trim().parse().ok()
    }
}
