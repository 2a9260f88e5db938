use serde::{Deserialize, Serialize};

/// Payload for `POST /repos/{owner}/{repo}/issues`.
#[derive(Clone, Debug, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
}

/// Issue coordinates returned by a successful create call.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CreatedIssue {
    pub number: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddLabels {
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddAssignees {
    pub assignees: Vec<String>,
}

/// Error body shape shared by all GitHub REST endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
