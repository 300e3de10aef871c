use crate::file::{AnonymizedFile, FileContent};
use crate::tree_builder::anonymize_tree;
use ano_config::{Config, RepositoryConfig};
use ano_core::{AnonError, FileRecord, RepositoryOptions, Result, Snapshot, SourceKind, Tree};
use ano_redact::{
    AnonymizeStream, AnonymizerOptions, ChunkTransformer, ContentAnonymizer, MaskPattern, SelfLink,
    TermSet, TextClassifier,
};
use ano_sources::{ProgressFn, Source, SourceBackend};
use ano_storage::{ContentCache, FileIndex};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const PDF_EXTENSIONS: &[&str] = &["pdf"];

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "ico", "bmp", "tiff", "tif", "webp", "avif", "heif", "heic",
];

/// Options of an anonymized listing
#[derive(Debug, Clone, Default)]
pub struct FilesOptions {
    /// Expose a short identifier derived from each content hash
    pub include_sha: bool,
    /// Anonymized sub-path to list; the whole tree when empty
    pub path: Option<String>,
}

/// Result of [`Repository::refresh`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub commit: String,
    pub files: usize,
    /// False when the current snapshot was kept
    pub changed: bool,
}

/// One anonymized repository: its source, its redaction rules and the
/// snapshot currently served.
pub struct Repository {
    id: String,
    options: RepositoryOptions,
    source: Source,
    index: FileIndex,
    classifier: Arc<TextClassifier>,
    anonymizer: Arc<ContentAnonymizer>,
    mask: MaskPattern,
    max_file_size: u64,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    refresh_lock: Mutex<()>,
}

impl Repository {
    pub fn from_config(
        id: &str,
        repo: &RepositoryConfig,
        config: &Config,
        index: FileIndex,
        cache: ContentCache,
    ) -> Result<Self> {
        let source = Source::from_config(id, repo, config, cache)?;
        let self_link = match repo.source {
            SourceKind::Archive => None,
            SourceKind::GithubDownload | SourceKind::GithubStream => Some(SelfLink {
                repository: repo.repository.clone(),
                branch: repo.branch.clone(),
                app_hostname: config.app_hostname.clone(),
                repo_id: id.to_string(),
            }),
        };
        let anonymizer = ContentAnonymizer::new(&AnonymizerOptions {
            mask: config.anonymization_mask.clone(),
            terms: repo.options.terms.clone(),
            redact_images: !repo.options.image,
            redact_links: !repo.options.link,
            self_link,
        });

        Ok(Self {
            id: id.to_string(),
            options: repo.options.clone(),
            source,
            index,
            classifier: Arc::new(TextClassifier::new(&config.additional_extensions)),
            anonymizer: Arc::new(anonymizer),
            mask: MaskPattern::new(&config.anonymization_mask),
            max_file_size: config.max_file_size,
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn terms(&self) -> &TermSet {
        self.anonymizer.terms()
    }

    pub fn mask(&self) -> &MaskPattern {
        &self.mask
    }

    pub fn classifier(&self) -> &TextClassifier {
        &self.classifier
    }

    /// Handle on a file addressed by its anonymized path
    pub fn file(&self, anonymized_path: impl Into<String>) -> AnonymizedFile<'_> {
        AnonymizedFile::new(self, anonymized_path)
    }

    /// Snapshot currently served. Loaded from the index on first use and
    /// materialized from the source when the index has none.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        if let Some(snapshot) = self.index.load_snapshot(&self.id).await? {
            let snapshot = Arc::new(snapshot);
            let mut current = self.snapshot.write().await;
            return Ok(Arc::clone(current.get_or_insert(snapshot)));
        }
        self.refresh(false, None).await?;
        self.snapshot
            .read()
            .await
            .clone()
            .ok_or_else(|| AnonError::RepoNotFound(self.id.clone()))
    }

    /// Original tree of the current snapshot
    pub async fn files(&self) -> Result<Tree> {
        Ok(self.snapshot().await?.tree.clone())
    }

    /// Anonymized tree of the current snapshot
    pub async fn anonymized_files(&self, options: &FilesOptions) -> Result<Tree> {
        let snapshot = self.snapshot().await?;
        let tree = anonymize_tree(&snapshot.tree, self.terms(), options.include_sha);
        let path = options.path.as_deref().unwrap_or_default();
        tree.subtree(path)
            .cloned()
            .ok_or_else(|| AnonError::FileNotFound(path.to_string()))
    }

    /// Rebuild the snapshot when the source moved to another commit, when
    /// nothing is materialized yet, or when `force` is set.
    ///
    /// The new snapshot is persisted first and only then swapped in, so
    /// readers see either the old or the new one. Content of the old
    /// commit stays readable until the swap; a failed build leaves the
    /// old snapshot fully in service.
    #[tracing::instrument(skip(self, progress), fields(repo_id = %self.id))]
    pub async fn refresh(&self, force: bool, progress: Option<&ProgressFn>) -> Result<RefreshOutcome> {
        let _guard = self.refresh_lock.lock().await;

        let current = match self.snapshot.read().await.clone() {
            Some(snapshot) => Some(snapshot),
            None => self.index.load_snapshot(&self.id).await?.map(Arc::new),
        };
        let commit = self.source.head_commit().await?;

        if !force
            && let Some(current) = &current
            && current.commit == commit
        {
            tracing::debug!("Snapshot of {} is up to date", commit);
            *self.snapshot.write().await = Some(Arc::clone(current));
            return Ok(RefreshOutcome {
                commit,
                files: current.tree.file_count(),
                changed: false,
            });
        }

        let tree = self.source.get_tree(&commit, progress).await?;
        let snapshot = Arc::new(Snapshot::new(&self.id, &commit, tree));
        self.index.replace_snapshot(&snapshot).await?;

        let files = snapshot.tree.file_count();
        *self.snapshot.write().await = Some(snapshot);
        tracing::info!("Materialized {} files at {}", files, commit);

        if let Some(previous) = current
            && previous.commit != commit
            && let Err(e) = self.source.prune(&commit).await
        {
            tracing::warn!("Could not prune content of {}: {}", previous.commit, e);
        }
        Ok(RefreshOutcome {
            commit,
            files,
            changed: true,
        })
    }

    /// Whether the repository options allow serving `path`
    pub fn is_file_supported(&self, path: &str) -> bool {
        let Some(ext) = extension(path) else {
            return true;
        };
        if !self.options.pdf && PDF_EXTENSIONS.contains(&ext.as_str()) {
            return false;
        }
        if !self.options.image && IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return false;
        }
        true
    }

    /// Open the redacted content of a resolved record. Every gate is
    /// checked before the source is touched.
    pub(crate) async fn open(
        &self,
        commit: &str,
        record: &FileRecord,
        anonymized_path: &str,
    ) -> Result<FileContent> {
        let Some(size) = record.size else {
            return Err(AnonError::FolderNotSupported(anonymized_path.to_string()));
        };
        if size > self.max_file_size {
            return Err(AnonError::FileTooBig {
                path: anonymized_path.to_string(),
                size,
                max: self.max_file_size,
            });
        }
        if !self.is_file_supported(anonymized_path) {
            return Err(AnonError::FileNotSupported(anonymized_path.to_string()));
        }

        let stream = self.source.get_file_content(commit, record).await?;
        let transformer = ChunkTransformer::new(
            anonymized_path,
            Arc::clone(&self.classifier),
            Arc::clone(&self.anonymizer),
        );
        Ok(FileContent::new(size, AnonymizeStream::new(stream, transformer)))
    }
}

/// Lowercased extension of the leaf name, if it has one
pub(crate) fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() && !name[1..].contains('.') {
        // dotfile such as ".gitignore"
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(extension("docs/Paper.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension("a/b.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension("Makefile"), None);
        assert_eq!(extension(".gitignore"), None);
    }
}
