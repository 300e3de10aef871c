use crate::{ProgressFn, SourceBackend, read_cached};
use ano_core::{AnonError, ByteStream, FileRecord, Result, SourceKind, Tree};
use ano_storage::ContentCache;
use async_trait::async_trait;

/// Commit reported for archives without a pinned one
const ARCHIVE_COMMIT: &str = "archive";

/// Repository whose content was extracted into the cache beforehand.
/// Never reaches out to a remote.
pub struct ArchiveSource {
    repo_id: String,
    commit: Option<String>,
    cache: ContentCache,
}

impl ArchiveSource {
    pub fn new(repo_id: &str, commit: Option<String>, cache: ContentCache) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            commit,
            cache,
        }
    }
}

#[async_trait]
impl SourceBackend for ArchiveSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Archive
    }

    async fn head_commit(&self) -> Result<String> {
        Ok(self
            .commit
            .clone()
            .unwrap_or_else(|| ARCHIVE_COMMIT.to_string()))
    }

    #[tracing::instrument(skip(self, progress), fields(repo_id = %self.repo_id))]
    async fn get_tree(&self, _commit: &str, progress: Option<&ProgressFn>) -> Result<Tree> {
        let tree = self.cache.scan(&self.repo_id).await?;
        if let Some(progress) = progress {
            progress(&format!("List file: {}", tree.file_count()));
        }
        Ok(tree)
    }

    async fn get_file_content(&self, _commit: &str, file: &FileRecord) -> Result<ByteStream> {
        read_cached(&self.cache, &self.repo_id, file)
            .await?
            .ok_or_else(|| AnonError::FileNotFound(file.full_path()))
    }
}
