//! Source backends for anonymized repositories
//!
//! Three backends share one capability interface:
//! - [`GitHubDownload`]: bulk-download the tarball once per commit, then read the cache
//! - [`GitHubStream`]: fetch single blobs on demand, caching them as they pass
//! - [`ArchiveSource`]: content already extracted into the cache

pub mod archive;
pub mod download;
pub mod github;
pub mod stream;
pub mod tee;

pub use archive::ArchiveSource;
pub use download::GitHubDownload;
pub use github::{GitHubClient, GitHubError, GitTree, GitTreeEntry};
pub use stream::GitHubStream;
pub use tee::tee;

use ano_config::{Config, RepositoryConfig};
use ano_core::{AnonError, ByteStream, FileRecord, Result, SourceKind, Tree};
use ano_storage::{CacheEntry, ContentCache};
use async_trait::async_trait;

/// Progress reporting callback
pub type ProgressFn = dyn Fn(&str) + Send + Sync;

/// Capability interface of every backend
#[async_trait]
pub trait SourceBackend: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Commit the next snapshot should be built from
    async fn head_commit(&self) -> Result<String>;

    /// Full tree of the repository at `commit`
    async fn get_tree(&self, commit: &str, progress: Option<&ProgressFn>) -> Result<Tree>;

    /// Original content of a file of the snapshot at `commit`
    async fn get_file_content(&self, commit: &str, file: &FileRecord) -> Result<ByteStream>;

    /// Drop cached content of every commit but `commit`. Called once the
    /// snapshot at `commit` is in service.
    async fn prune(&self, _commit: &str) -> Result<()> {
        Ok(())
    }
}

/// GitHub coordinates shared by the remote backends
#[derive(Debug, Clone)]
pub struct GitHubRepo {
    pub repo_id: String,
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub commit: Option<String>,
}

impl GitHubRepo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Pinned commit, else the branch head
    pub async fn head_commit(&self, client: &GitHubClient) -> Result<String> {
        if let Some(commit) = &self.commit {
            return Ok(commit.clone());
        }
        client
            .branch_head(&self.owner, &self.name, &self.branch)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AnonError::RepoNotFound(self.full_name())
                } else {
                    e.into_source_error(format!("branch {} of {}", self.branch, self.full_name()))
                }
            })
    }
}

/// Closed set of backends, dispatched by tag
pub enum Source {
    GithubDownload(GitHubDownload),
    GithubStream(GitHubStream),
    Archive(ArchiveSource),
}

impl Source {
    pub fn from_config(
        repo_id: &str,
        repo: &RepositoryConfig,
        config: &Config,
        cache: ContentCache,
    ) -> Result<Self> {
        Ok(match repo.source {
            SourceKind::Archive => {
                Source::Archive(ArchiveSource::new(repo_id, repo.commit.clone(), cache))
            }
            SourceKind::GithubDownload => {
                let (github, client) = github_parts(repo_id, repo, config)?;
                Source::GithubDownload(GitHubDownload::new(github, client, cache))
            }
            SourceKind::GithubStream => {
                let (github, client) = github_parts(repo_id, repo, config)?;
                Source::GithubStream(GitHubStream::new(
                    github,
                    client,
                    cache,
                    config.max_file_folder,
                ))
            }
        })
    }

    fn backend(&self) -> &dyn SourceBackend {
        match self {
            Source::GithubDownload(source) => source,
            Source::GithubStream(source) => source,
            Source::Archive(source) => source,
        }
    }
}

#[async_trait]
impl SourceBackend for Source {
    fn kind(&self) -> SourceKind {
        self.backend().kind()
    }

    async fn head_commit(&self) -> Result<String> {
        self.backend().head_commit().await
    }

    async fn get_tree(&self, commit: &str, progress: Option<&ProgressFn>) -> Result<Tree> {
        self.backend().get_tree(commit, progress).await
    }

    async fn get_file_content(&self, commit: &str, file: &FileRecord) -> Result<ByteStream> {
        self.backend().get_file_content(commit, file).await
    }

    async fn prune(&self, commit: &str) -> Result<()> {
        self.backend().prune(commit).await
    }
}

fn github_parts(
    repo_id: &str,
    repo: &RepositoryConfig,
    config: &Config,
) -> Result<(GitHubRepo, GitHubClient)> {
    let (owner, name) = repo.owner_and_name().ok_or_else(|| {
        AnonError::UnsupportedSource(format!(
            "{} needs owner/name, got '{}'",
            repo.source.as_str(),
            repo.repository
        ))
    })?;
    let github = GitHubRepo {
        repo_id: repo_id.to_string(),
        owner: owner.to_string(),
        name: name.to_string(),
        branch: repo.branch.clone(),
        commit: repo.commit.clone(),
    };
    let client = GitHubClient::new(&config.github_api_url, config.token_for(repo))
        .map_err(|e| e.into_source_error("github client"))?;
    Ok((github, client))
}

/// Serve from the cache if present. `Ok(None)` means not cached.
pub(crate) async fn read_cached(
    cache: &ContentCache,
    repo_id: &str,
    file: &FileRecord,
) -> Result<Option<ByteStream>> {
    let path = file.full_path();
    match cache.exists(repo_id, &path).await? {
        CacheEntry::File => Ok(Some(cache.read(repo_id, &path).await?)),
        CacheEntry::Folder => Err(AnonError::FolderNotSupported(path)),
        CacheEntry::NotFound => Ok(None),
    }
}
