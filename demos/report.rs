use github_issues_http::{create_issues, FindingsPerCommitter, GithubClient, ReportContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "github_issues_http=debug".into()),
        )
        .init();

    let client = GithubClient::from_env().map_err(anyhow::Error::msg)?;

    let context = ReportContext {
        server_url: std::env::var("GITHUB_SERVER_URL")
            .unwrap_or_else(|_| "https://github.com".to_owned()),
        scanned_repository_owner: std::env::var("SCANNED_REPOSITORY_OWNER")?,
        scanned_repository_name: std::env::var("SCANNED_REPOSITORY_NAME")?,
        secrets_finder_repository: std::env::var("SECRETS_FINDER_REPOSITORY")?,
        run_id: std::env::var("GITHUB_RUN_ID")?,
    };

    let findings_json = std::env::var("FINDINGS_PER_COMMITTER")?;
    let findings: FindingsPerCommitter = serde_json::from_str(&findings_json)?;

    create_issues(&client, &context, &findings).await?;

    Ok(())
}
