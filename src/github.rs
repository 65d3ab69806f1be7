//! GitHub repository service.
//!
//! Thin REST client covering exactly what the publish pipeline needs:
//! get-or-create a repository, create-or-update files, turn on Pages,
//! resolve the latest commit, and fetch a single file.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const API_TIMEOUT_SECS: u64 = 60;

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// A repository the pipeline publishes into.
#[derive(Debug, Clone)]
pub struct RepoHandle {
    pub name: String,
    /// Browser URL, reported back to the evaluation server.
    pub html_url: String,
}

/// Seam over the hosting repository API so the orchestrator can be tested
/// against a recording double.
#[async_trait]
pub trait RepoService: Send + Sync {
    /// Fetch the repository for a task, creating it when absent. Safe to
    /// call when the repository already exists.
    async fn get_or_create(&self, task: &str, description: &str) -> anyhow::Result<RepoHandle>;

    /// Create-or-update a UTF-8 file as a new commit.
    async fn upsert_text_file(
        &self,
        repo: &RepoHandle,
        path: &str,
        content: &str,
        message: &str,
    ) -> anyhow::Result<()>;

    /// Create-or-update a binary file as a new commit.
    async fn upsert_binary_file(
        &self,
        repo: &RepoHandle,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> anyhow::Result<()>;

    /// Enable static hosting for the repository. Returns whether hosting
    /// is active after the call.
    async fn enable_static_hosting(&self, task: &str) -> anyhow::Result<bool>;

    /// SHA of the most recent commit on the default branch.
    async fn latest_commit_sha(&self, task: &str) -> anyhow::Result<String>;

    /// Fetch a repository file as UTF-8 text.
    async fn get_file(&self, task: &str, path: &str) -> anyhow::Result<String>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct RepoInfo {
    name: String,
    html_url: String,
}

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    auto_init: bool,
}

#[derive(Deserialize)]
struct BlobSha {
    sha: String,
}

#[derive(Serialize)]
struct PutFileRequest<'a> {
    message: &'a str,
    /// Base64 of the file bytes, per the contents API.
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Deserialize)]
struct FileContent {
    content: String,
    encoding: String,
}

#[derive(Deserialize)]
struct CommitInfo {
    sha: String,
}

#[derive(Serialize)]
struct PagesSource<'a> {
    branch: &'a str,
    path: &'a str,
}

#[derive(Serialize)]
struct EnablePagesRequest<'a> {
    source: PagesSource<'a>,
}

// ============================================================================
// Client
// ============================================================================

/// GitHub REST client bound to one account.
pub struct GithubClient {
    client: reqwest::Client,
    api_base: String,
    username: String,
    token: String,
}

impl GithubClient {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_api_base(DEFAULT_API_BASE, username, token)
    }

    /// Point the client at a different API origin (test servers).
    pub fn with_api_base(
        api_base: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            username: username.into(),
            token: token.into(),
        })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "pagesmith")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    fn repo_url(&self, repo: &str, suffix: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_base, self.username, repo, suffix)
    }

    /// Current blob SHA for a path, or None when the file does not exist.
    async fn existing_sha(&self, repo: &str, path: &str) -> anyhow::Result<Option<String>> {
        let url = self.repo_url(repo, &format!("/contents/{}", path));
        let resp = self.request(reqwest::Method::GET, url).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_success() {
            let blob: BlobSha = resp.json().await?;
            return Ok(Some(blob.sha));
        }

        let body = resp.text().await.unwrap_or_default();
        Err(anyhow::anyhow!(
            "GitHub API error ({}) looking up {}: {}",
            status,
            path,
            short_body(&body)
        ))
    }

    async fn upsert_bytes(
        &self,
        repo: &RepoHandle,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> anyhow::Result<()> {
        let sha = self.existing_sha(&repo.name, path).await?;
        let request = PutFileRequest {
            message,
            content: STANDARD.encode(bytes),
            sha,
        };

        let url = self.repo_url(&repo.name, &format!("/contents/{}", path));
        let resp = self
            .request(reqwest::Method::PUT, url)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow::anyhow!(
            "GitHub API error ({}) committing {}: {}",
            status,
            path,
            short_body(&body)
        ))
    }
}

#[async_trait]
impl RepoService for GithubClient {
    async fn get_or_create(&self, task: &str, description: &str) -> anyhow::Result<RepoHandle> {
        let url = self.repo_url(task, "");
        let resp = self.request(reqwest::Method::GET, url).send().await?;

        if resp.status().is_success() {
            let info: RepoInfo = resp.json().await?;
            return Ok(RepoHandle {
                name: info.name,
                html_url: info.html_url,
            });
        }

        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "GitHub API error ({}) fetching repo {}: {}",
                status,
                task,
                short_body(&body)
            ));
        }

        // auto_init gives the new repository a default branch to commit onto.
        let request = CreateRepoRequest {
            name: task,
            description,
            auto_init: true,
        };
        let resp = self
            .request(reqwest::Method::POST, format!("{}/user/repos", self.api_base))
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "GitHub API error ({}) creating repo {}: {}",
                status,
                task,
                short_body(&body)
            ));
        }

        let info: RepoInfo = resp.json().await?;
        Ok(RepoHandle {
            name: info.name,
            html_url: info.html_url,
        })
    }

    async fn upsert_text_file(
        &self,
        repo: &RepoHandle,
        path: &str,
        content: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        self.upsert_bytes(repo, path, content.as_bytes(), message).await
    }

    async fn upsert_binary_file(
        &self,
        repo: &RepoHandle,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> anyhow::Result<()> {
        self.upsert_bytes(repo, path, content, message).await
    }

    async fn enable_static_hosting(&self, task: &str) -> anyhow::Result<bool> {
        let request = EnablePagesRequest {
            source: PagesSource {
                branch: "main",
                path: "/",
            },
        };

        let url = self.repo_url(task, "/pages");
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        // 409 means Pages is already configured, which is just as active.
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            return Ok(true);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(anyhow::anyhow!(
            "GitHub API error ({}) enabling Pages for {}: {}",
            status,
            task,
            short_body(&body)
        ))
    }

    async fn latest_commit_sha(&self, task: &str) -> anyhow::Result<String> {
        let url = self.repo_url(task, "/commits?per_page=1");
        let resp = self.request(reqwest::Method::GET, url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "GitHub API error ({}) listing commits for {}: {}",
                status,
                task,
                short_body(&body)
            ));
        }

        let commits: Vec<CommitInfo> = resp.json().await?;
        commits
            .into_iter()
            .next()
            .map(|c| c.sha)
            .ok_or_else(|| anyhow::anyhow!("Repository {} has no commits", task))
    }

    async fn get_file(&self, task: &str, path: &str) -> anyhow::Result<String> {
        let url = self.repo_url(task, &format!("/contents/{}", path));
        let resp = self.request(reqwest::Method::GET, url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "GitHub API error ({}) fetching {} from {}: {}",
                status,
                path,
                task,
                short_body(&body)
            ));
        }

        let file: FileContent = resp.json().await?;
        if file.encoding != "base64" {
            return Err(anyhow::anyhow!("Unexpected contents encoding: {}", file.encoding));
        }

        // The contents API wraps base64 at 60 columns.
        let compact: String = file.content.split_whitespace().collect();
        let bytes = STANDARD.decode(compact)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Truncate an API error body for inclusion in an error message.
fn short_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() > MAX_ERROR_BODY_LEN {
        let cut: String = trimmed.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{}... (truncated)", cut)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_info() {
        let json = r#"{"name": "demo-app", "html_url": "https://github.com/u/demo-app", "private": false}"#;
        let info: RepoInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.name, "demo-app");
        assert_eq!(info.html_url, "https://github.com/u/demo-app");
    }

    #[test]
    fn test_put_request_omits_sha_on_create() {
        let request = PutFileRequest {
            message: "Add index.html",
            content: STANDARD.encode("<html></html>"),
            sha: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("\"sha\""));

        let update = PutFileRequest {
            sha: Some("abc123".to_string()),
            ..request
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"sha\":\"abc123\""));
    }

    #[test]
    fn test_parse_wrapped_contents() {
        let encoded = STANDARD.encode("# Demo\nA readme.\n");
        // Simulate the API's 60-column wrapping
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        let json = serde_json::json!({"content": wrapped, "encoding": "base64"});

        let file: FileContent = serde_json::from_value(json).unwrap();
        let compact: String = file.content.split_whitespace().collect();
        let decoded = STANDARD.decode(compact).unwrap();
        assert_eq!(decoded, b"# Demo\nA readme.\n");
    }

    #[test]
    fn test_short_body_truncates() {
        let long = "x".repeat(500);
        let short = short_body(&long);
        assert!(short.len() < 230);
        assert!(short.ends_with("(truncated)"));

        assert_eq!(short_body("  brief  "), "brief");
    }

    #[test]
    fn test_repo_url_shape() {
        let client = GithubClient::with_api_base("https://api.github.com/", "octocat", "t").unwrap();
        assert_eq!(
            client.repo_url("demo", "/contents/index.html"),
            "https://api.github.com/repos/octocat/demo/contents/index.html"
        );
    }
}
