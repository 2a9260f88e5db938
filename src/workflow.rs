//! Per-committer issue reporting batch.
//!
//! Each remote call goes through the retry engine with the client's
//! [`RetryConfig`](crate::RetryConfig). One committer failing does not stop
//! the batch, unless the failure means the API asked for a wait beyond the
//! ceiling — at that point every further call would hit the same wall, so the
//! whole run fails.

use tracing::{error, info};

use crate::{
    findings::{CommitFindings, FindingsPerCommitter},
    report,
    retry::{classify, execute_with_retry, AbortReason, RetryDecision},
    GithubClient, NewIssue, Result,
};

/// Label attached to every report issue.
pub const REPORT_LABEL: &str = "leaked-secrets";

/// Repository and run coordinates threaded into the rendered report.
#[derive(Clone, Debug)]
pub struct ReportContext {
    /// Base server URL, e.g. `https://github.com`.
    pub server_url: String,
    /// Owner of the repository that was scanned.
    pub scanned_repository_owner: String,
    /// Name of the repository that was scanned.
    pub scanned_repository_name: String,
    /// `owner/name` of the repository hosting the scanning workflow.
    pub secrets_finder_repository: String,
    /// Identifier of the workflow run that produced the findings.
    pub run_id: String,
}

/// Creates, labels, and assigns one report issue per committer.
///
/// Failures are logged and the remaining committers are still processed,
/// except when the final error classifies as
/// [`AbortReason::ExcessiveWait`] — that error fails the whole batch.
pub async fn create_issues(
    client: &GithubClient,
    context: &ReportContext,
    findings: &FindingsPerCommitter,
) -> Result<()> {
    for (committer, commits) in findings {
        if let Err(err) = report_committer(client, context, committer, commits).await {
            error!(committer, error = %err, "failed to process committer");
            if classify(client.retry_config(), &err)
                == RetryDecision::Abort(AbortReason::ExcessiveWait)
            {
                return Err(err);
            }
        }
    }
    Ok(())
}

async fn report_committer(
    client: &GithubClient,
    context: &ReportContext,
    committer: &str,
    commits: &CommitFindings,
) -> Result<()> {
    info!(committer, "creating issue for committer");

    let retry = client.retry_config();
    let owner = context.scanned_repository_owner.as_str();
    let repo = context.scanned_repository_name.as_str();

    let total_secrets: usize = commits.values().map(Vec::len).sum();
    let issue = NewIssue {
        title: report::issue_title(total_secrets, commits.len()),
        body: report::issue_body(context, committer, commits),
    };

    let created =
        execute_with_retry(retry, || client.create_issue(owner, repo, &issue)).await?;
    if let Some(url) = created.html_url.as_deref() {
        info!(committer, url, "new issue created in repository");
    }

    info!(issue = created.number, "adding label to issue");
    let labels = [REPORT_LABEL.to_owned()];
    execute_with_retry(retry, || {
        client.add_labels(owner, repo, created.number, &labels)
    })
    .await?;

    info!(issue = created.number, committer, "assigning issue to committer");
    let assignees = [committer.to_owned()];
    execute_with_retry(retry, || {
        client.add_assignees(owner, repo, created.number, &assignees)
    })
    .await?;

    Ok(())
}
