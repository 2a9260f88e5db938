use std::collections::BTreeMap;

use serde::Deserialize;

/// Findings grouped by commit SHA.
pub type CommitFindings = BTreeMap<String, Vec<Finding>>;

/// Findings grouped by committer login, then by commit SHA.
///
/// `BTreeMap` keeps the batch loop and the rendered report deterministic.
pub type FindingsPerCommitter = BTreeMap<String, CommitFindings>;

/// Single secret-scanning finding, in the shape the scanner emits.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Finding {
    #[serde(default, rename = "DetectorName")]
    pub detector_name: Option<String>,
    #[serde(default, rename = "SourceMetadata")]
    pub source_metadata: Option<SourceMetadata>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct SourceMetadata {
    #[serde(default, rename = "Data")]
    pub data: Option<SourceData>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct SourceData {
    #[serde(default, rename = "Git")]
    pub git: Option<GitLocation>,
}

/// Where in the repository a finding was detected.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct GitLocation {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u64>,
}

impl Finding {
    /// Git location of the finding, when the scanner recorded one.
    pub fn git_location(&self) -> Option<&GitLocation> {
        self.source_metadata.as_ref()?.data.as_ref()?.git.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::Finding;

    #[test]
    fn deserializes_scanner_output_shape() {
        let finding: Finding = serde_json::from_str(
            r#"{
                "DetectorName": "AWS",
                "SourceMetadata": {
                    "Data": {
                        "Git": { "file": "config/prod.env", "line": 12 }
                    }
                }
            }"#,
        )
        .expect("must deserialize");

        assert_eq!(finding.detector_name.as_deref(), Some("AWS"));
        let git = finding.git_location().expect("must have a git location");
        assert_eq!(git.file.as_deref(), Some("config/prod.env"));
        assert_eq!(git.line, Some(12));
    }

    #[test]
    fn tolerates_missing_metadata() {
        let finding: Finding = serde_json::from_str(r#"{ "DetectorName": "Slack" }"#)
            .expect("must deserialize");
        assert!(finding.git_location().is_none());
    }
}
