//! `github-issues-http` is an async HTTP client for the GitHub Issues REST
//! API with rate-limit-aware retry.
//!
//! The crate wraps the issue endpoints a secret-scanning report needs:
//! - [`GithubClient::create_issue`]
//! - [`GithubClient::add_labels`]
//! - [`GithubClient::add_assignees`]
//!
//! Any failed call is classified once into a [`RetryDecision`] — wait out a
//! rate limit, back off a server error, or give up on a client error — and
//! [`execute_with_retry`] drives that decision loop around an arbitrary
//! operation. [`create_issues`] runs the full per-committer report workflow
//! on top.

mod client;
mod error;
mod findings;
mod report;
mod retry;
mod wire;
mod workflow;

pub use client::{GithubClient, DEFAULT_API_URL};
pub use error::{ApiErrorResponse, GithubApiError};
pub use findings::{
    CommitFindings, Finding, FindingsPerCommitter, GitLocation, SourceData, SourceMetadata,
};
pub use retry::{
    classify, execute_with_retry, AbortReason, RetryConfig, RetryDecision, Sleeper, TokioSleeper,
    MAX_WAITING_TIME,
};
pub use wire::{CreatedIssue, NewIssue};
pub use workflow::{create_issues, ReportContext, REPORT_LABEL};

pub type Result<T> = std::result::Result<T, GithubApiError>;
