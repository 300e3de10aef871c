//! Minimal GitHub REST client

use ano_core::{AnonError, ByteStream};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::ProgressFn;

const API_VERSION: &str = "2022-11-28";

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("HTTP {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitHubError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GitHubError::Status { status, .. } => Some(*status),
            GitHubError::Http(e) => e.status(),
            GitHubError::Io(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Wrap as a source failure carrying `context`
    pub fn into_source_error(self, context: impl Into<String>) -> AnonError {
        AnonError::source_unavailable(context, self)
    }
}

/// `git/trees` response
#[derive(Debug, Clone, Deserialize)]
pub struct GitTree {
    pub sha: String,
    #[serde(default)]
    pub tree: Vec<GitTreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitTreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl GitTreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }

    pub fn is_tree(&self) -> bool {
        self.kind == "tree"
    }
}

#[derive(Debug, Deserialize)]
struct Branch {
    commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    sha: String,
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ano/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn get(&self, path: &str, accept: &str) -> RequestBuilder {
        let mut request = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {}", token));
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, GitHubError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GitHubError::Status {
                status,
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }

    /// Commit sha at the head of a branch
    pub async fn branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String, GitHubError> {
        let path = format!("/repos/{}/{}/branches/{}", owner, repo, branch);
        let branch: Branch = self
            .send(self.get(&path, "application/vnd.github+json"))
            .await?
            .json()
            .await?;
        Ok(branch.commit.sha)
    }

    pub async fn tree(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        recursive: bool,
    ) -> Result<GitTree, GitHubError> {
        let mut path = format!("/repos/{}/{}/git/trees/{}", owner, repo, sha);
        if recursive {
            path.push_str("?recursive=1");
        }
        let tree = self
            .send(self.get(&path, "application/vnd.github+json"))
            .await?
            .json()
            .await?;
        Ok(tree)
    }

    /// Raw content of a blob, as a stream
    pub async fn blob(&self, owner: &str, repo: &str, sha: &str) -> Result<ByteStream, GitHubError> {
        let path = format!("/repos/{}/{}/git/blobs/{}", owner, repo, sha);
        let response = self
            .send(self.get(&path, "application/vnd.github.raw+json"))
            .await?;
        let context = format!("blob {}", sha);
        Ok(response
            .bytes_stream()
            .map_err(move |e| AnonError::source_unavailable(context.clone(), e))
            .boxed())
    }

    /// Download the repository tarball at `reference` into `dest`.
    /// Returns the number of bytes written.
    pub async fn tarball(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
        dest: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<u64, GitHubError> {
        let path = format!("/repos/{}/{}/tarball/{}", owner, repo, reference);
        let response = self.send(self.get(&path, "application/vnd.github+json")).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();
        let mut transferred = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            transferred += chunk.len() as u64;
            if let Some(progress) = progress {
                progress(&format!("Repository download: {}", human_size(transferred)));
            }
        }
        file.flush().await?;
        Ok(transferred)
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(2048), "2.0KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0MiB");
    }

    #[test]
    fn test_tree_deserialize() {
        let json = r#"{
            "sha": "abc",
            "tree": [
                {"path": "README.md", "type": "blob", "sha": "b1", "size": 12},
                {"path": "src", "type": "tree", "sha": "t1"},
                {"path": "vendor/lib", "type": "commit", "sha": "c1"}
            ],
            "truncated": false
        }"#;
        let tree: GitTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.tree.len(), 3);
        assert!(tree.tree[0].is_blob());
        assert!(tree.tree[1].is_tree());
        assert_eq!(tree.tree[1].size, None);
        assert!(!tree.tree[2].is_blob() && !tree.tree[2].is_tree());
    }

    #[test]
    fn test_client_trims_api_url() {
        let client = GitHubClient::new("http://localhost:1234/", Some(String::new())).unwrap();
        assert_eq!(client.api_url, "http://localhost:1234");
        assert!(client.token.is_none());
    }
}
