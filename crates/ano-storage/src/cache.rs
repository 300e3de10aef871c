//! On-disk content cache
//!
//! Layout: `{root}/{repo_id}/original/{path}`. Writes go to a temporary
//! sibling first and are renamed into place, so readers never observe a
//! partially written file.

use crate::{Result, StorageError};
use ano_core::{AnonError, ByteStream, FileEntry, Tree};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const TMP_SUFFIX: &str = ".ano-tmp";
/// Joins a repository id and a commit in a version key
const VERSION_SEPARATOR: char = '@';

/// What a cache path points to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntry {
    File,
    Folder,
    NotFound,
}

/// Local cache of original repository content
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
    chunk_size: usize,
}

impl ContentCache {
    pub fn new(root: PathBuf, chunk_size: usize) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the original files of a repository
    pub fn original_dir(&self, repo_id: &str) -> Result<PathBuf> {
        Ok(self.repo_dir(repo_id)?.join("original"))
    }

    fn repo_dir(&self, repo_id: &str) -> Result<PathBuf> {
        let safe = !repo_id.is_empty()
            && Path::new(repo_id)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            && !repo_id.contains('/');
        if !safe {
            return Err(StorageError::InvalidPath(repo_id.to_string()));
        }
        Ok(self.root.join(repo_id))
    }

    fn file_path(&self, repo_id: &str, path: &str) -> Result<PathBuf> {
        let relative =
            safe_relative(Path::new(path), false).ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;
        if relative.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.original_dir(repo_id)?.join(relative))
    }

    pub async fn exists(&self, repo_id: &str, path: &str) -> Result<CacheEntry> {
        let target = self.file_path(repo_id, path)?;
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => Ok(CacheEntry::Folder),
            Ok(_) => Ok(CacheEntry::File),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheEntry::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Stream a cached file in chunks of the configured size.
    pub async fn read(&self, repo_id: &str, path: &str) -> Result<ByteStream> {
        let target = self.file_path(repo_id, path)?;
        let file = match tokio::fs::File::open(&target).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if file.metadata().await?.is_dir() {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let chunk_size = self.chunk_size;
        let stream = futures_util::stream::try_unfold(file, move |mut file| async move {
            let mut buf = vec![0u8; chunk_size];
            let n = file.read(&mut buf).await.map_err(AnonError::from)?;
            if n == 0 {
                Ok::<_, AnonError>(None)
            } else {
                buf.truncate(n);
                Ok(Some((Bytes::from(buf), file)))
            }
        });
        Ok(stream.boxed())
    }

    /// Write a stream to the cache atomically. On any error the temporary
    /// file is removed and nothing becomes visible.
    pub async fn write<S>(&self, repo_id: &str, path: &str, mut content: S) -> ano_core::Result<u64>
    where
        S: Stream<Item = ano_core::Result<Bytes>> + Unpin,
    {
        let target = self.file_path(repo_id, path)?;
        let tmp = tmp_path(&target);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let written: ano_core::Result<u64> = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            let mut total = 0u64;
            while let Some(chunk) = content.try_next().await? {
                file.write_all(&chunk).await?;
                total += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, AnonError>(total)
        }
        .await;

        match written {
            Ok(total) => {
                tokio::fs::rename(&tmp, &target).await?;
                tracing::debug!("Cached {} ({} bytes)", path, total);
                Ok(total)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&tmp).await {
                    tracing::debug!("Could not remove {}: {}", tmp.display(), rm);
                }
                Err(e)
            }
        }
    }

    pub async fn write_bytes(&self, repo_id: &str, path: &str, content: Bytes) -> ano_core::Result<u64> {
        self.write(repo_id, path, futures_util::stream::iter([Ok(content)]))
            .await
    }

    /// Walk the cached original content into a tree. File sha values are
    /// blake3 hashes of the content.
    pub async fn scan(&self, repo_id: &str) -> Result<Tree> {
        let dir = self.original_dir(repo_id)?;
        tokio::task::spawn_blocking(move || scan_dir(&dir))
            .await
            .map_err(|e| StorageError::Other(anyhow::anyhow!("scan task failed: {}", e)))?
    }

    /// Cache key of one commit of a repository. Each commit gets its own
    /// directory so a new commit can be extracted while the old one is read.
    pub fn version_key(repo_id: &str, commit: &str) -> String {
        let commit: String = commit
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        format!("{}{}{}", repo_id, VERSION_SEPARATOR, commit)
    }

    /// Remove every cached version of `repo_id` except `keep`.
    /// Returns the number of versions removed.
    pub async fn prune_versions(&self, repo_id: &str, keep: &str) -> Result<usize> {
        let prefix = format!("{}{}", repo_id, VERSION_SEPARATOR);
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name != keep {
                self.rm(&name).await?;
                tracing::debug!("Pruned cached version {}", name);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove a repository's cached content.
    pub async fn rm(&self, repo_id: &str) -> Result<()> {
        let dir = self.repo_dir(repo_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a repository's cached content with a `.tar.gz` archive.
    ///
    /// With `strip_root` the first path component of every entry is
    /// dropped (GitHub tarballs wrap everything in `owner-repo-sha/`).
    /// Returns the number of files extracted.
    pub async fn extract_tar_gz(&self, repo_id: &str, archive: &Path, strip_root: bool) -> Result<usize> {
        let repo_dir = self.repo_dir(repo_id)?;
        let original = self.original_dir(repo_id)?;
        let archive = archive.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<usize> {
            std::fs::create_dir_all(&repo_dir)?;
            let staging = repo_dir.join(format!(".staging-{}", uuid::Uuid::new_v4()));
            let count = match unpack_tar_gz(&archive, &staging, strip_root) {
                Ok(count) => count,
                Err(e) => {
                    let _ = std::fs::remove_dir_all(&staging);
                    return Err(e);
                }
            };
            swap_dir(&staging, &original)?;
            Ok(count)
        })
        .await
        .map_err(|e| StorageError::Other(anyhow::anyhow!("extract task failed: {}", e)))?
    }

    /// Replace a repository's cached content with a copy of a local
    /// directory. Returns the number of files copied.
    pub async fn import_dir(&self, repo_id: &str, source: &Path) -> Result<usize> {
        let repo_dir = self.repo_dir(repo_id)?;
        let original = self.original_dir(repo_id)?;
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<usize> {
            std::fs::create_dir_all(&repo_dir)?;
            let staging = repo_dir.join(format!(".staging-{}", uuid::Uuid::new_v4()));
            let count = match copy_dir(&source, &staging) {
                Ok(count) => count,
                Err(e) => {
                    let _ = std::fs::remove_dir_all(&staging);
                    return Err(e);
                }
            };
            swap_dir(&staging, &original)?;
            Ok(count)
        })
        .await
        .map_err(|e| StorageError::Other(anyhow::anyhow!("import task failed: {}", e)))?
    }
}

fn tmp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}{}", name, uuid::Uuid::new_v4(), TMP_SUFFIX))
}

/// Relative path with `..`, root and prefix components rejected.
fn safe_relative(path: &Path, strip_root: bool) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut stripped = !strip_root;
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if stripped {
                    out.push(part);
                } else {
                    stripped = true;
                }
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn swap_dir(staging: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        std::fs::remove_dir_all(target)?;
    }
    std::fs::rename(staging, target)?;
    Ok(())
}

fn unpack_tar_gz(archive: &Path, dest: &Path, strip_root: bool) -> Result<usize> {
    let file = std::fs::File::open(archive)?;
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    std::fs::create_dir_all(dest)?;

    let mut count = 0;
    let entries = tar
        .entries()
        .map_err(|e| StorageError::Archive(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| StorageError::Archive(e.to_string()))?;
        let kind = entry.header().entry_type();
        if !kind.is_file() && !kind.is_dir() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| StorageError::Archive(e.to_string()))?
            .into_owned();
        let Some(relative) = safe_relative(&path, strip_root) else {
            tracing::warn!("Skipping unsafe archive entry {}", path.display());
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(&relative);
        if kind.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            entry.unpack(&target)?;
            count += 1;
        }
    }
    Ok(count)
}

fn copy_dir(source: &Path, dest: &Path) -> Result<usize> {
    std::fs::create_dir_all(dest)?;
    let mut count = 0;
    for entry in walkdir::WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| StorageError::Other(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| StorageError::Other(e.into()))?;
        if relative.as_os_str().is_empty() || is_git_dir(relative) {
            continue;
        }
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
            count += 1;
        }
    }
    Ok(count)
}

fn is_git_dir(relative: &Path) -> bool {
    matches!(relative.components().next(), Some(Component::Normal(first)) if first == ".git")
}

fn scan_dir(dir: &Path) -> Result<Tree> {
    let mut tree = Tree::new();
    if !dir.exists() {
        return Ok(tree);
    }
    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| StorageError::Other(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| StorageError::Other(e.into()))?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            tree.insert_dir(&path);
        } else if entry.file_type().is_file() {
            if path.ends_with(TMP_SUFFIX) {
                continue;
            }
            let mut hasher = blake3::Hasher::new();
            hasher.update_reader(std::fs::File::open(entry.path())?)?;
            tree.insert_file(
                &path,
                FileEntry {
                    size: entry.metadata().map_err(|e| StorageError::Other(e.into()))?.len(),
                    sha: Some(hasher.finalize().to_hex().to_string()),
                },
            );
        }
    }
    Ok(tree)
}
