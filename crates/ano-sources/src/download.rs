use crate::{GitHubClient, GitHubRepo, ProgressFn, SourceBackend, read_cached};
use ano_core::{AnonError, ByteStream, FileRecord, Result, SourceKind, Tree};
use ano_storage::ContentCache;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Downloads the whole repository once per commit and serves every file
/// from the local cache afterwards. Each commit is extracted into its own
/// cache version, so a refresh never disturbs the content being served.
pub struct GitHubDownload {
    repo: GitHubRepo,
    client: GitHubClient,
    cache: ContentCache,
    download_lock: Mutex<()>,
}

impl GitHubDownload {
    pub fn new(repo: GitHubRepo, client: GitHubClient, cache: ContentCache) -> Self {
        Self {
            repo,
            client,
            cache,
            download_lock: Mutex::new(()),
        }
    }

    fn version(&self, commit: &str) -> String {
        ContentCache::version_key(&self.repo.repo_id, commit)
    }

    async fn is_downloaded(&self, version: &str) -> Result<bool> {
        let dir = self.cache.original_dir(version)?;
        Ok(tokio::fs::try_exists(&dir).await?)
    }

    /// Download and extract the tarball of `commit` unless another task
    /// already did.
    #[tracing::instrument(skip(self, progress), fields(repo_id = %self.repo.repo_id))]
    async fn ensure_downloaded(&self, commit: &str, progress: Option<&ProgressFn>) -> Result<()> {
        let _guard = self.download_lock.lock().await;
        let version = self.version(commit);
        if self.is_downloaded(&version).await? {
            return Ok(());
        }

        let archive = self.cache.root().join(format!(
            ".download-{}-{}.tar.gz",
            self.repo.repo_id,
            uuid::Uuid::new_v4()
        ));
        let result = self.download_into(commit, &version, &archive, progress).await;
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            tracing::debug!("Could not remove {}: {}", archive.display(), e);
        }
        result
    }

    async fn download_into(
        &self,
        commit: &str,
        version: &str,
        archive: &std::path::Path,
        progress: Option<&ProgressFn>,
    ) -> Result<()> {
        let bytes = self
            .client
            .tarball(&self.repo.owner, &self.repo.name, commit, archive, progress)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AnonError::RepoNotFound(self.repo.full_name())
                } else {
                    e.into_source_error(format!("tarball of {}", self.repo.full_name()))
                }
            })?;
        // Extraction goes through a staging directory, `original/` appears whole
        let files = self
            .cache
            .extract_tar_gz(version, archive, true)
            .await
            .map_err(|e| AnonError::source_unavailable(format!("extract {}", self.repo.full_name()), e))?;
        tracing::info!(
            "Downloaded {} at {} ({} bytes, {} files)",
            self.repo.full_name(),
            commit,
            bytes,
            files
        );
        Ok(())
    }
}

#[async_trait]
impl SourceBackend for GitHubDownload {
    fn kind(&self) -> SourceKind {
        SourceKind::GithubDownload
    }

    async fn head_commit(&self) -> Result<String> {
        self.repo.head_commit(&self.client).await
    }

    async fn get_tree(&self, commit: &str, progress: Option<&ProgressFn>) -> Result<Tree> {
        self.ensure_downloaded(commit, progress).await?;
        let tree = self.cache.scan(&self.version(commit)).await?;
        if let Some(progress) = progress {
            progress(&format!("List file: {}", tree.file_count()));
        }
        Ok(tree)
    }

    async fn get_file_content(&self, commit: &str, file: &FileRecord) -> Result<ByteStream> {
        let version = self.version(commit);
        if !self.is_downloaded(&version).await? {
            // Cache not ready: fetch the commit being served, then read
            self.ensure_downloaded(commit, None).await?;
        }
        read_cached(&self.cache, &version, file)
            .await?
            .ok_or_else(|| AnonError::FileNotFound(file.full_path()))
    }

    async fn prune(&self, commit: &str) -> Result<()> {
        let removed = self
            .cache
            .prune_versions(&self.repo.repo_id, &self.version(commit))
            .await?;
        tracing::debug!("Pruned {} cached versions", removed);
        Ok(())
    }
}
