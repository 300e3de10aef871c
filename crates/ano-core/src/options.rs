//! Repository anonymization options

use serde::{Deserialize, Serialize};

/// How the original content of a repository is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Bulk-download the repository once, then read from the local cache
    GithubDownload,
    /// Fetch single files from the remote on demand, caching them locally
    GithubStream,
    /// Content already extracted into the local cache
    Archive,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::GithubDownload => "github_download",
            SourceKind::GithubStream => "github_stream",
            SourceKind::Archive => "archive",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = crate::AnonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github_download" | "GitHubDownload" => Ok(SourceKind::GithubDownload),
            "github_stream" | "GitHubStream" => Ok(SourceKind::GithubStream),
            "archive" | "zip" | "Zip" => Ok(SourceKind::Archive),
            other => Err(crate::AnonError::UnsupportedSource(other.to_string())),
        }
    }
}

/// Per-repository anonymization options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryOptions {
    /// Ordered terms; the order decides the mask suffix
    #[serde(default)]
    pub terms: Vec<String>,

    /// Keep images (markdown images and image files)
    #[serde(default = "default_true")]
    pub image: bool,

    /// Keep links in text content
    #[serde(default = "default_true")]
    pub link: bool,

    /// Serve PDF files
    #[serde(default = "default_true")]
    pub pdf: bool,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            terms: Vec::new(),
            image: true,
            link: true,
            pdf: true,
        }
    }
}

fn default_true() -> bool {
    true
}
