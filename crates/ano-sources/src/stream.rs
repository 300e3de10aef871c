use crate::github::GitTreeEntry;
use crate::{GitHubClient, GitHubError, GitHubRepo, ProgressFn, SourceBackend, read_cached, tee};
use ano_core::{AnonError, ByteStream, FileEntry, FileRecord, Result, SourceKind, Tree, join_path};
use ano_storage::ContentCache;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fetches the tree from the GitHub API and single blobs on demand. Each
/// fetched blob is written to the cache version of its commit while it is
/// streamed to the caller.
pub struct GitHubStream {
    repo: GitHubRepo,
    client: GitHubClient,
    cache: ContentCache,
    max_file_folder: usize,
}

/// Entry listed under a directory prefix
type Listed = (String, GitTreeEntry);

impl GitHubStream {
    pub fn new(repo: GitHubRepo, client: GitHubClient, cache: ContentCache, max_file_folder: usize) -> Self {
        Self {
            repo,
            client,
            cache,
            max_file_folder: max_file_folder.max(1),
        }
    }

    fn tree_error(&self, e: GitHubError, sha: &str) -> AnonError {
        e.into_source_error(format!("tree {} of {}", sha, self.repo.full_name()))
    }

    /// One subtree, recursively. Falls back to a folder-by-folder walk
    /// when GitHub truncates the recursive listing.
    async fn walk_subtree(&self, prefix: String, sha: String, listed: &Counter<'_>) -> Result<Vec<Listed>> {
        let tree = self
            .client
            .tree(&self.repo.owner, &self.repo.name, &sha, true)
            .await
            .map_err(|e| self.tree_error(e, &sha))?;
        listed.add(tree.tree.len());

        if tree.truncated {
            tracing::warn!("Tree of {} is truncated, listing folder by folder", prefix);
            return self.walk_folders(prefix, sha, listed).await;
        }
        Ok(tree
            .tree
            .into_iter()
            .map(|entry| (prefix.clone(), entry))
            .collect())
    }

    async fn walk_folders(&self, prefix: String, sha: String, listed: &Counter<'_>) -> Result<Vec<Listed>> {
        let mut out = Vec::new();
        let mut pending = vec![(prefix, sha)];
        while let Some((dir, sha)) = pending.pop() {
            let tree = self
                .client
                .tree(&self.repo.owner, &self.repo.name, &sha, false)
                .await
                .map_err(|e| self.tree_error(e, &sha))?;
            let mut entries = tree.tree;
            if entries.len() > self.max_file_folder {
                tracing::warn!(
                    "{} has {} entries, keeping the first {}",
                    dir,
                    entries.len(),
                    self.max_file_folder
                );
                entries.truncate(self.max_file_folder);
            }
            listed.add(entries.len());
            for entry in entries {
                if entry.is_tree() {
                    pending.push((join_path(&dir, &entry.path), entry.sha.clone()));
                }
                out.push((dir.clone(), entry));
            }
        }
        Ok(out)
    }
}

struct Counter<'a> {
    count: AtomicUsize,
    progress: Option<&'a ProgressFn>,
}

impl Counter<'_> {
    fn add(&self, n: usize) {
        let total = self.count.fetch_add(n, Ordering::Relaxed) + n;
        if let Some(progress) = self.progress {
            progress(&format!("List file: {}", total));
        }
    }
}

fn insert(tree: &mut Tree, dir: &str, entry: &GitTreeEntry) {
    let path = join_path(dir, &entry.path);
    if entry.is_tree() {
        tree.insert_dir(&path);
    } else if entry.is_blob() {
        tree.insert_file(
            &path,
            FileEntry {
                size: entry.size.unwrap_or(0),
                sha: Some(entry.sha.clone()),
            },
        );
    }
    // Submodules ("commit" entries) have no content to serve
}

#[async_trait]
impl SourceBackend for GitHubStream {
    fn kind(&self) -> SourceKind {
        SourceKind::GithubStream
    }

    async fn head_commit(&self) -> Result<String> {
        self.repo.head_commit(&self.client).await
    }

    #[tracing::instrument(skip(self, progress), fields(repo_id = %self.repo.repo_id))]
    async fn get_tree(&self, commit: &str, progress: Option<&ProgressFn>) -> Result<Tree> {
        let listed = Counter {
            count: AtomicUsize::new(0),
            progress,
        };
        let root = match self
            .client
            .tree(&self.repo.owner, &self.repo.name, commit, false)
            .await
        {
            Ok(root) => root,
            Err(e) if matches!(e.status(), Some(StatusCode::CONFLICT | StatusCode::NOT_FOUND)) => {
                tracing::info!("{} is empty", self.repo.full_name());
                return Ok(Tree::new());
            }
            Err(e) => return Err(self.tree_error(e, commit)),
        };
        listed.add(root.tree.len());

        let mut tree = Tree::new();
        let mut subtrees = Vec::new();
        for entry in &root.tree {
            insert(&mut tree, "", entry);
            if entry.is_tree() {
                subtrees.push(self.walk_subtree(entry.path.clone(), entry.sha.clone(), &listed));
            }
        }
        for listing in try_join_all(subtrees).await? {
            for (dir, entry) in &listing {
                insert(&mut tree, dir, entry);
            }
        }
        tracing::debug!("Listed {} files", tree.file_count());
        Ok(tree)
    }

    #[tracing::instrument(skip(self, file), fields(repo_id = %self.repo.repo_id, path = %file.full_path()))]
    async fn get_file_content(&self, commit: &str, file: &FileRecord) -> Result<ByteStream> {
        let version = ContentCache::version_key(&self.repo.repo_id, commit);
        if let Some(stream) = read_cached(&self.cache, &version, file).await? {
            return Ok(stream);
        }

        let path = file.full_path();
        let sha = file
            .sha
            .as_deref()
            .ok_or_else(|| AnonError::FileNotFound(path.clone()))?;
        let remote = self
            .client
            .blob(&self.repo.owner, &self.repo.name, sha)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AnonError::FileNotFound(path.clone())
                } else {
                    e.into_source_error(format!("blob {} of {}", sha, self.repo.full_name()))
                }
            })?;

        let (to_cache, to_caller) = tee(remote);
        let cache = self.cache.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.write(&version, &path, to_cache).await {
                tracing::warn!("Failed to cache {}/{}: {}", version, path, e);
            }
        });
        Ok(to_caller)
    }

    async fn prune(&self, commit: &str) -> Result<()> {
        let keep = ContentCache::version_key(&self.repo.repo_id, commit);
        self.cache.prune_versions(&self.repo.repo_id, &keep).await?;
        Ok(())
    }
}
