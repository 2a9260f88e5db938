//! Markdown rendering for secret-scanning report issues.
//!
//! The output mirrors what reviewers see in the tracking issue: a warning
//! header with secret/commit counts, one section per offending commit, and a
//! fixed remediation procedure.

use reqwest::Url;

use crate::{
    findings::{CommitFindings, Finding, GitLocation},
    ReportContext,
};

const DEFAULT_VALUE: &str = "N/A";

/// Issue title, e.g. `⚠️ Secrets pushed to main branch (2 commits affected)`.
pub(crate) fn issue_title(total_secrets: usize, commits_affected: usize) -> String {
    format!(
        "⚠️ Secret{} pushed to main branch ({} commit{} affected)",
        plural(total_secrets),
        commits_affected,
        plural(commits_affected)
    )
}

/// Full issue body for one committer's findings.
pub(crate) fn issue_body(
    context: &ReportContext,
    committer: &str,
    commits: &CommitFindings,
) -> String {
    let commits_affected = commits.len();
    let total_secrets: usize = commits.values().map(Vec::len).sum();

    let findings_per_commit = commits
        .iter()
        .map(|(sha, findings)| {
            let rendered = findings
                .iter()
                .enumerate()
                .map(|(index, finding)| render_finding(context, committer, sha, index, finding))
                .collect::<String>();
            format!("**COMMIT {}**\n{rendered}", short_sha(sha))
        })
        .collect::<Vec<_>>()
        .join("<br />\n\n");

    format!(
        "# ⚠️ WARNING: SECRET{header_plural} PUSHED TO MAIN BRANCH\n\
         ### {total_secrets} secret{secret_verb} been found in {commits_affected} commit{commit_plural}.\n\
         \n\
         <br/><br/>\n\
         \n\
         ## FINDINGS\n\
         {findings_per_commit}\n\
         \n\
         Please note that the detector considers all secrets found in the commit{commit_plural}, even if they have been pushed earlier.\n\
         \n\
         <br/>\n\
         \n\
         You can find more information in the workflow run that generated this report:\\\n\
         {server_url}/{secrets_finder_repository}/actions/runs/{run_id}\n\
         \n\
         <br/><br/>\n\
         \n\
         ## REMEDIATION PROCEDURE\n\
         - You **MUST** rotate the credentials that were stored in plain text. Assume they have already been compromised.\n\
         - You **MUST** move the new credentials to an approved secrets management service and pattern.\n\
         - You **SHOULD** clear the plaintext secrets from Git history.\n\
         \n\
         <br/><br/>\n\
         \n\
         To clean-up your Git history, you can use the following guidance:\n\
         - [Removing Sensitive Data - GitHub](https://docs.github.com/en/authentication/keeping-your-account-and-data-secure/removing-sensitive-data-from-a-repository)\n\
         \n\
         <br/><br/>\n\
         \n\
         You can also find more information about how to rotate your secrets here:\n\
         https://howtorotate.com/docs/introduction/getting-started/",
        header_plural = if total_secrets > 1 { "S" } else { "" },
        secret_verb = if total_secrets > 1 { "s have" } else { " has" },
        commit_plural = plural(commits_affected),
        server_url = context.server_url,
        secrets_finder_repository = context.secrets_finder_repository,
        run_id = context.run_id,
    )
}

fn render_finding(
    context: &ReportContext,
    committer: &str,
    sha: &str,
    index: usize,
    finding: &Finding,
) -> String {
    let detector = finding.detector_name.as_deref().unwrap_or(DEFAULT_VALUE);
    let author = if committer.is_empty() {
        DEFAULT_VALUE.to_owned()
    } else {
        format!("[{committer}]({}/{committer})", context.server_url)
    };
    let file = finding
        .git_location()
        .and_then(|git| file_link(context, sha, git))
        .unwrap_or_else(|| DEFAULT_VALUE.to_owned());

    format!(
        "> **FINDING {number}**\n\
         > &nbsp;&nbsp; **Type**\n&nbsp;&nbsp; {detector}\n\
         > &nbsp;&nbsp;\n\
         > &nbsp;&nbsp; **Author**\n&nbsp;&nbsp; {author}\n\
         > &nbsp;&nbsp;\n\
         > &nbsp;&nbsp; **File**\n&nbsp;&nbsp; {file}\n\n",
        number = index + 1
    )
}

/// Markdown link to the file at the offending commit, path percent-encoded.
fn file_link(context: &ReportContext, sha: &str, git: &GitLocation) -> Option<String> {
    let file = git.file.as_deref()?;
    let mut url = Url::parse(&context.server_url).ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push(&context.scanned_repository_owner)
        .push(&context.scanned_repository_name)
        .push("blob")
        .push(sha)
        .extend(file.split('/'));
    url.set_query(Some("plain=1"));
    if let Some(line) = git.line {
        url.set_fragment(Some(&format!("L{line}")));
    }
    Some(format!("[{file}]({url})"))
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

fn plural(count: usize) -> &'static str {
    if count > 1 {
        "s"
    } else {
        ""
    }
}
